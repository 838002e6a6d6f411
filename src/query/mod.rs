//! Query translation: identifiers, paging, SQL statements per dialect, document filters.
//! Identifiers are allow-listed and quoted; values are always bound as parameters.

pub mod builder;
pub mod document;
pub mod ident;
pub mod page;
pub mod params;
pub use builder::{ColumnMeta, QueryBuf, SqlFlavor};
pub use ident::{validate_collection, validate_field};
pub use page::{Page, PageRequest, SortDirection, SortSpec};
pub use params::BindValue;
