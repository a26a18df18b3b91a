pub mod metadata;
pub mod mutation;
pub mod pkg;

pub use metadata::SyncMetadataStore;
pub use mutation::MutationRepository;
pub use pkg::PkgRepository;
