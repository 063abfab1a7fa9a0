use crate::error::{RecordViewError, Result};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Extraction function from a record to one of its field values.
pub type AccessorFn<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// A named, labelled field accessor. Also serves as an export column.
pub struct Field<T> {
    pub name: String,
    pub label: String,
    accessor: AccessorFn<T>,
}

impl<T> Field<T> {
    pub fn new<F>(name: impl Into<String>, label: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        Field {
            name: name.into(),
            label: label.into(),
            accessor: Arc::new(accessor),
        }
    }

    /// Same accessor under a different column label
    pub fn relabeled(&self, label: impl Into<String>) -> Self {
        Field {
            name: self.name.clone(),
            label: label.into(),
            accessor: Arc::clone(&self.accessor),
        }
    }

    pub fn value(&self, record: &T) -> Value {
        (self.accessor)(record)
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Field {
            name: self.name.clone(),
            label: self.label.clone(),
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Ordered registry of field accessors for one record type.
///
/// Registration order is the default column order for exports.
pub struct FieldAccessors<T> {
    fields: Vec<Field<T>>,
    index: HashMap<String, usize>,
}

impl<T> FieldAccessors<T> {
    pub fn new() -> Self {
        FieldAccessors {
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a field whose label is its name
    pub fn with_field<F>(self, name: &str, accessor: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.with_labeled_field(name, name, accessor)
    }

    pub fn with_labeled_field<F>(mut self, name: &str, label: &str, accessor: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.insert(Field::new(name, label, accessor));
        self
    }

    /// Add a field. A field with the same name is replaced in its original position.
    pub fn insert(&mut self, field: Field<T>) {
        match self.index.get(&field.name) {
            Some(&pos) => self.fields[pos] = field,
            None => {
                self.index.insert(field.name.clone(), self.fields.len());
                self.fields.push(field);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field<T>> {
        self.index.get(name).map(|&pos| &self.fields[pos])
    }

    /// Look up a field, failing with `UnknownField` if it was never registered.
    pub fn require(&self, name: &str) -> Result<&Field<T>> {
        self.get(name)
            .ok_or_else(|| RecordViewError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn value(&self, name: &str, record: &T) -> Option<Value> {
        self.get(name).map(|field| field.value(record))
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve export columns by name, in the order given.
    pub fn columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Field<T>>> {
        names
            .iter()
            .map(|name| self.require(name.as_ref()).cloned())
            .collect()
    }
}

impl<T> Default for FieldAccessors<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FieldAccessors<T> {
    fn clone(&self) -> Self {
        FieldAccessors {
            fields: self.fields.clone(),
            index: self.index.clone(),
        }
    }
}

impl<T> fmt::Debug for FieldAccessors<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fields.iter()).finish()
    }
}
