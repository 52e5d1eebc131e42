//! Flywheel Publish
//!
//! Adapters behind the core `ObjectStore` and `ImageRegistry` ports.
//! Publishing is idempotent: destination keys are fully rendered before
//! upload, so retrying a run overwrites the same objects and tags.

pub mod object;
pub mod registry;

pub use object::{FsObjectStore, HttpObjectStore};
pub use registry::DockerRegistry;
