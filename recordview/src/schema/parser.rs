use super::types::ViewDefinition;
use crate::error::{RecordViewError, Result};
use crate::filter;
use std::collections::HashSet;
use std::path::Path;

/// Parse a view definition YAML file
pub fn parse_view_definition(path: &Path) -> Result<ViewDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_view_definition_str(&content)
}

/// Parse a view definition YAML string and check it is self-consistent
pub fn parse_view_definition_str(content: &str) -> Result<ViewDefinition> {
    let definition: ViewDefinition = serde_yaml::from_str(content)?;
    check_definition(&definition)?;
    Ok(definition)
}

/// Every field referenced by the id, sort, filters and export list must be a column.
pub fn check_definition(definition: &ViewDefinition) -> Result<()> {
    if definition.columns.is_empty() {
        return Err(RecordViewError::Config("view defines no columns".into()));
    }
    if definition.page_size == 0 {
        return Err(RecordViewError::InvalidPageSize(0));
    }

    let mut seen = HashSet::new();
    for column in &definition.columns {
        if !seen.insert(column.field.as_str()) {
            return Err(RecordViewError::Config(format!(
                "duplicate column '{}'",
                column.field
            )));
        }
    }

    let accessors = definition.accessors();
    accessors.require(&definition.id_field)?;
    if let Some(sort) = &definition.sort {
        sort.validate(&accessors)?;
    }
    filter::validate_all(&definition.filters, &accessors)?;
    accessors.columns(&definition.export_column_names())?;
    Ok(())
}
