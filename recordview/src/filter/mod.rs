use crate::accessor::{Field, FieldAccessors};
use crate::error::{RecordViewError, Result};
use crate::value::{self, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single predicate over one field. Rules in a set are AND-ed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterRule {
    /// Field value equals the operand. The `all`/`any` sentinel disables the rule.
    Equals { field: String, value: Value },
    /// Field value equals one of the operands. An empty set, or one holding
    /// the sentinel, disables the rule.
    InSet { field: String, values: Vec<Value> },
    /// Case-insensitive substring search. Empty text disables the rule.
    Contains { field: String, text: String },
    /// Inclusive timestamp range; either bound may be open.
    DateInRange {
        field: String,
        #[serde(
            default,
            deserialize_with = "value::deserialize_start_bound",
            skip_serializing_if = "Option::is_none"
        )]
        start: Option<DateTime<Utc>>,
        #[serde(
            default,
            deserialize_with = "value::deserialize_end_bound",
            skip_serializing_if = "Option::is_none"
        )]
        end: Option<DateTime<Utc>>,
    },
}

impl FilterRule {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterRule::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn in_set<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        FilterRule::InSet {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        FilterRule::Contains {
            field: field.into(),
            text: text.into(),
        }
    }

    pub fn date_range(
        field: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        FilterRule::DateInRange {
            field: field.into(),
            start,
            end,
        }
    }

    /// The field this rule reads
    pub fn field(&self) -> &str {
        match self {
            FilterRule::Equals { field, .. }
            | FilterRule::InSet { field, .. }
            | FilterRule::Contains { field, .. }
            | FilterRule::DateInRange { field, .. } => field,
        }
    }

    /// Whether the rule's operand makes it match every record
    pub fn is_disabled(&self) -> bool {
        match self {
            FilterRule::Equals { value, .. } => value.is_sentinel(),
            FilterRule::InSet { values, .. } => {
                values.is_empty() || values.iter().any(Value::is_sentinel)
            }
            FilterRule::Contains { text, .. } => value::fold_for_search(text).is_empty(),
            FilterRule::DateInRange { start, end, .. } => start.is_none() && end.is_none(),
        }
    }

    /// Check the rule against the registered accessors.
    pub fn validate<T>(&self, accessors: &FieldAccessors<T>) -> Result<()> {
        accessors.require(self.field())?;
        if let FilterRule::DateInRange {
            field,
            start: Some(start),
            end: Some(end),
        } = self
        {
            if start > end {
                return Err(RecordViewError::InvalidRule {
                    field: field.clone(),
                    reason: format!("range start {start} is after end {end}"),
                });
            }
        }
        Ok(())
    }
}

/// Validate every rule in a set, stopping at the first error
pub fn validate_all<T>(rules: &[FilterRule], accessors: &FieldAccessors<T>) -> Result<()> {
    rules.iter().try_for_each(|rule| rule.validate(accessors))
}

enum Matcher<'r> {
    Equals(&'r Value),
    InSet(&'r [Value]),
    Contains(String),
    DateInRange(Option<DateTime<Utc>>, Option<DateTime<Utc>>),
}

impl Matcher<'_> {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Matcher::Equals(operand) => value.matches(operand),
            Matcher::InSet(operands) => operands.iter().any(|op| value.matches(op)),
            Matcher::Contains(needle) => value::fold_for_search(&value.to_string()).contains(needle),
            Matcher::DateInRange(start, end) => match value.to_timestamp() {
                Some(ts) => start.map_or(true, |s| s <= ts) && end.map_or(true, |e| ts <= e),
                None => false,
            },
        }
    }
}

/// A rule set resolved against its accessors, ready for the per-record loop.
///
/// Compilation is where unknown fields are caught; matching never fails.
pub(crate) struct CompiledFilter<'a, T> {
    rules: Vec<(&'a Field<T>, Matcher<'a>)>,
}

impl<'a, T> CompiledFilter<'a, T> {
    pub(crate) fn compile(rules: &'a [FilterRule], accessors: &'a FieldAccessors<T>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            rule.validate(accessors)?;
            if rule.is_disabled() {
                continue;
            }
            let field = accessors.require(rule.field())?;
            let matcher = match rule {
                FilterRule::Equals { value, .. } => Matcher::Equals(value),
                FilterRule::InSet { values, .. } => Matcher::InSet(values),
                FilterRule::Contains { text, .. } => Matcher::Contains(value::fold_for_search(text)),
                FilterRule::DateInRange { start, end, .. } => Matcher::DateInRange(*start, *end),
            };
            compiled.push((field, matcher));
        }
        Ok(CompiledFilter { rules: compiled })
    }

    pub(crate) fn matches(&self, record: &T) -> bool {
        self.rules
            .iter()
            .all(|(field, matcher)| matcher.matches(&field.value(record)))
    }
}

/// Keep the records that satisfy every rule, preserving input order.
pub fn apply<'a, T: 'a, I>(
    records: I,
    rules: &[FilterRule],
    accessors: &FieldAccessors<T>,
) -> Result<Vec<&'a T>>
where
    I: IntoIterator<Item = &'a T>,
{
    let filter = CompiledFilter::compile(rules, accessors)?;
    Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
}

/// Row indices into `records` that satisfy every rule, in ascending order.
pub(crate) fn matching_rows<T>(
    records: &[T],
    rules: &[FilterRule],
    accessors: &FieldAccessors<T>,
) -> Result<Vec<usize>> {
    let filter = CompiledFilter::compile(rules, accessors)?;
    Ok(records
        .iter()
        .enumerate()
        .filter(|(_, r)| filter.matches(r))
        .map(|(row, _)| row)
        .collect())
}
