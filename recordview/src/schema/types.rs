use crate::accessor::{Field, FieldAccessors};
use crate::filter::FilterRule;
use crate::sort::SortSpec;
use crate::value::{self, Value};
use serde::{Deserialize, Serialize};

/// A record view described in YAML, for records held as JSON values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDefinition {
    #[serde(default)]
    pub name: Option<String>,
    /// Column whose value identifies a record for selection
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    /// Columns written on export; all columns when absent
    #[serde(default)]
    pub export_columns: Option<Vec<String>>,
}

/// One column: a field name, how to read it, and how to show it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub field: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Dotted path into the record (`patient.name`, `items.0.code`); defaults to `field`
    #[serde(default)]
    pub path: Option<String>,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

/// How a raw JSON value is coerced before filtering and sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Auto,
    String,
    Number,
    Boolean,
    Date,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_page_size() -> usize {
    10
}

impl ColumnDefinition {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.field)
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.field)
    }

    /// Build the accessor for this column
    pub fn to_field(&self) -> Field<serde_json::Value> {
        let segments: Vec<String> = self.path().split('.').map(str::to_string).collect();
        let field_type = self.field_type;
        Field::new(self.field.clone(), self.label(), move |record: &serde_json::Value| {
            lookup(record, &segments).map_or(Value::Null, |raw| field_type.coerce(raw))
        })
    }
}

impl FieldType {
    pub fn coerce(self, raw: &serde_json::Value) -> Value {
        if raw.is_null() {
            return Value::Null;
        }
        match self {
            FieldType::Auto => Value::from_json(raw),
            FieldType::String => match raw {
                serde_json::Value::String(s) => Value::Text(s.clone()),
                other => Value::Text(other.to_string()),
            },
            FieldType::Number => match raw {
                serde_json::Value::String(s) => parse_number(s),
                serde_json::Value::Number(_) => Value::from_json(raw),
                _ => Value::Null,
            },
            FieldType::Boolean => match raw {
                serde_json::Value::Bool(b) => Value::Bool(*b),
                serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => Value::Bool(true),
                    "false" | "no" | "0" => Value::Bool(false),
                    _ => Value::Null,
                },
                serde_json::Value::Number(n) => Value::Bool(n.as_f64() != Some(0.0)),
                _ => Value::Null,
            },
            FieldType::Date => match raw {
                serde_json::Value::String(s) => value::parse_timestamp(s).map_or(Value::Null, Value::Date),
                _ => Value::Null,
            },
        }
    }
}

fn parse_number(s: &str) -> Value {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    trimmed.parse::<f64>().map_or(Value::Null, Value::Float)
}

/// Follow a dotted path through objects and arrays
pub fn lookup<'a, S: AsRef<str>>(record: &'a serde_json::Value, segments: &[S]) -> Option<&'a serde_json::Value> {
    segments.iter().try_fold(record, |current, segment| {
        let segment = segment.as_ref();
        match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

impl ViewDefinition {
    /// Accessors for every column, in column order
    pub fn accessors(&self) -> FieldAccessors<serde_json::Value> {
        let mut accessors = FieldAccessors::new();
        for column in &self.columns {
            accessors.insert(column.to_field());
        }
        accessors
    }

    /// Names of the columns to export
    pub fn export_column_names(&self) -> Vec<String> {
        match &self.export_columns {
            Some(names) => names.clone(),
            None => self.columns.iter().map(|c| c.field.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_paths() {
        let record = json!({
            "patient": { "name": "Achieng Atieno" },
            "items": [{ "code": "LAB-01" }, { "code": "RX-22" }]
        });
        assert_eq!(lookup(&record, &["patient", "name"]), Some(&json!("Achieng Atieno")));
        assert_eq!(lookup(&record, &["items", "1", "code"]), Some(&json!("RX-22")));
        assert_eq!(lookup(&record, &["items", "x"]), None);
        assert_eq!(lookup(&record, &["missing"]), None);
    }

    #[test]
    fn test_coercion() {
        assert_eq!(FieldType::Number.coerce(&json!("1200")), Value::Int(1200));
        assert_eq!(FieldType::Number.coerce(&json!(" 99.5 ")), Value::Float(99.5));
        assert_eq!(FieldType::Number.coerce(&json!("n/a")), Value::Null);
        assert_eq!(FieldType::String.coerce(&json!(7)), Value::Text("7".into()));
        assert_eq!(FieldType::Boolean.coerce(&json!("Yes")), Value::Bool(true));
        assert_eq!(FieldType::Auto.coerce(&json!(null)), Value::Null);
        assert!(matches!(FieldType::Date.coerce(&json!("2024-05-01")), Value::Date(_)));
        assert_eq!(FieldType::Date.coerce(&json!("soon")), Value::Null);
    }

    #[test]
    fn test_column_accessor_uses_path_and_label() {
        let column = ColumnDefinition {
            field: "patient".into(),
            label: Some("Patient".into()),
            path: Some("patient.name".into()),
            field_type: FieldType::String,
        };
        let field = column.to_field();
        assert_eq!(field.label, "Patient");
        assert_eq!(
            field.value(&json!({ "patient": { "name": "Juma Mwangi" } })),
            Value::Text("Juma Mwangi".into())
        );
        assert_eq!(field.value(&json!({})), Value::Null);
    }
}
