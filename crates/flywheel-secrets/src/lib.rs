//! Flywheel Secrets
//!
//! Secret provider adapters implementing the core `SecretProvider` port.
//! The engine resolves secrets per step, immediately before launch, and
//! never caches the values.

pub mod providers;

pub use providers::{EnvProvider, FileProvider, StaticProvider};
