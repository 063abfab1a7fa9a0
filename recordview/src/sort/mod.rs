use crate::accessor::FieldAccessors;
use crate::error::Result;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("Invalid sort direction '{other}' (expected asc or desc)")),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => f.write_str("asc"),
            SortDirection::Descending => f.write_str("desc"),
        }
    }
}

/// The single active sort key of a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        SortSpec {
            field: field.into(),
            direction,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    /// Column-header click: the same field flips direction, a new field
    /// starts ascending.
    pub fn toggled_for(current: Option<&SortSpec>, field: &str) -> SortSpec {
        match current {
            Some(spec) if spec.field == field => SortSpec::new(field, spec.direction.reversed()),
            _ => SortSpec::ascending(field),
        }
    }

    pub fn validate<T>(&self, accessors: &FieldAccessors<T>) -> Result<()> {
        accessors.require(&self.field).map(|_| ())
    }
}

/// Parses `field` or `field:asc` / `field:desc`
impl FromStr for SortSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (field, direction) = match s.rsplit_once(':') {
            Some((field, dir)) => (field, dir.parse()?),
            None => (s, SortDirection::Ascending),
        };
        if field.is_empty() {
            return Err(format!("Invalid sort spec '{s}': missing field name"));
        }
        Ok(SortSpec::new(field, direction))
    }
}

/// Order records by the spec's field. Equal keys keep their input order.
pub fn apply<'a, T>(
    records: Vec<&'a T>,
    spec: Option<&SortSpec>,
    accessors: &FieldAccessors<T>,
) -> Result<Vec<&'a T>> {
    let Some(spec) = spec else {
        return Ok(records);
    };
    let field = accessors.require(&spec.field)?;
    let mut keyed: Vec<(Value, &'a T)> = records.into_iter().map(|r| (field.value(r), r)).collect();
    keyed.sort_by(|(a, _), (b, _)| spec.direction.apply(a.sort_cmp(b)));
    Ok(keyed.into_iter().map(|(_, r)| r).collect())
}

/// Sort row indices into `records` in place. The spec must already be validated.
pub(crate) fn sort_rows<T>(
    rows: &mut Vec<usize>,
    records: &[T],
    spec: Option<&SortSpec>,
    accessors: &FieldAccessors<T>,
) -> Result<()> {
    let Some(spec) = spec else {
        return Ok(());
    };
    let field = accessors.require(&spec.field)?;
    let mut keyed: Vec<(Value, usize)> = rows
        .iter()
        .map(|&row| (field.value(&records[row]), row))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| spec.direction.apply(a.sort_cmp(b)));
    *rows = keyed.into_iter().map(|(_, row)| row).collect();
    Ok(())
}
