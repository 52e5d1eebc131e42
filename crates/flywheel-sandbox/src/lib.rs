//! Flywheel Sandbox
//!
//! Executors for running a step's command list in an isolated
//! environment: a Docker container adapter, a local process adapter for
//! development, and a scripted fake for tests.

pub mod container;
pub mod fake;
pub mod process;

pub use container::ContainerSandbox;
pub use fake::FakeSandbox;
pub use process::ProcessSandbox;

/// Shared executor configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub timeout_seconds: Option<u64>,
    /// Host directory mounted as the step workspace.
    pub workspace: std::path::PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: Some(3600),
            workspace: std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from(".")),
        }
    }
}

/// Join a command list into a single strict shell script, so the first
/// failing command fails the whole step with its exit code.
pub(crate) fn shell_script(commands: &[String]) -> String {
    commands.join("\n")
}
