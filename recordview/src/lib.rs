pub mod accessor;
pub mod document;
pub mod error;
pub mod export;
pub mod filter;
pub mod pager;
pub mod schema;
pub mod selection;
pub mod sort;
pub mod store;
pub mod value;
pub mod view;

pub use accessor::{Field, FieldAccessors};
pub use error::{RecordViewError, Result};
pub use export::{CsvExporter, ExportRow};
pub use filter::FilterRule;
pub use pager::{Page, PageInfo, PageSpec};
pub use schema::ViewDefinition;
pub use selection::{RecordId, SelectionTracker};
pub use sort::{SortDirection, SortSpec};
pub use store::RecordStore;
pub use value::Value;
pub use view::{ExportScope, ViewController, ViewEvent, ViewState};
