//! Embedding model and versioned artifact registry.

pub mod network;
pub mod registry;

pub use network::{Architecture, TwinNetwork, EMBEDDING_DIM};
pub use registry::{ModelArtifact, ModelRegistry, VersionInfo};
