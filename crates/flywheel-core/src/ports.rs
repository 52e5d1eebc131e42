//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the engine and external
//! adapters: the sandbox executor, the secret provider, and the artifact
//! sinks. The engine only constructs requests and observes results; it
//! never talks to Docker, vaults, or storage directly.

use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Invocation request for an isolated execution environment.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Image reference identifying the sandbox.
    pub image: String,
    /// Commands run in order; the first failing command fails the step.
    pub commands: Vec<String>,
    /// Full environment: materialized literals plus resolved secrets.
    pub environment: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

/// Exit status and captured output of a sandboxed command list.
#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub exit_code: i32,
    /// Combined stdout/stderr lines in arrival order.
    pub output: Vec<String>,
}

impl SandboxResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a step's command list inside an isolated environment.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult>;
}

/// A resolved secret. Debug output never shows the value.
#[derive(Clone)]
pub struct SecretValue {
    pub value: String,
}

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue").field("value", &"***").finish()
    }
}

/// Resolves named secret references at execution time.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Get a secret by name. Fails with `Error::SecretNotFound` when the
    /// name is undeclared.
    async fn get(&self, name: &str) -> Result<SecretValue>;

    /// Check if a secret exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Object-storage sink with idempotent overwrite semantics.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Container-registry sink with idempotent overwrite semantics.
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Push a local image reference to `repository:tag`.
    async fn push(&self, repository: &str, tag: &str, image: &str) -> Result<()>;
}
