pub mod mutation;
pub mod pkg;
pub mod sync_metadata;
