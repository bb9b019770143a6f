pub mod config;
pub mod metadata;

pub use config::ChainId;
pub use metadata::{
    init_metadata, ChainMetadata, FileMetadataStore, MemoryMetadataStore, MetadataError,
    MetadataStore,
};
