mod parser;
mod types;

pub use parser::{check_definition, parse_view_definition, parse_view_definition_str};
pub use types::{lookup, ColumnDefinition, FieldType, ViewDefinition};
