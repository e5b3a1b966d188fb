pub mod catalog;
pub mod memory;

pub use catalog::Catalog;
pub use memory::{Collection, RecordStore, apply_update, new_record};
