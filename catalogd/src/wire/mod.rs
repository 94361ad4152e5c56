pub mod cursor;
pub mod error;
pub mod record;
pub mod snapshot;
pub mod tables;

pub use snapshot::{decode_snapshot, Completeness, DecodedSnapshot};
pub use tables::Catalog;
