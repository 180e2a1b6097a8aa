//! Host-facing data: comparison nodes, scene documents and their storage

pub mod node;
pub mod scene;
pub mod storage;

pub use node::DoseComparisonNode;
pub use scene::{Scene, SceneError, SceneVolume};
pub use storage::StorageError;
