//! The metadata source: where cards and schemas live, and where migrated
//! cards are written back.

mod metabase;
mod traits;

pub use metabase::{card_from_json, catalog_from_json, definition_to_json, MetabaseClient};
pub use traits::MetadataSource;
