//! Secret provider implementations.

use async_trait::async_trait;
use flywheel_core::ports::{SecretProvider, SecretValue};
use flywheel_core::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Environment variable secret provider.
pub struct EnvProvider {
    prefix: Option<String>,
}

impl EnvProvider {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    fn resolve_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{}_{}", p, name),
            None => name.to_string(),
        }
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SecretProvider for EnvProvider {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        let env_name = self.resolve_name(name);
        let value = std::env::var(&env_name)
            .map(SecretValue::new)
            .map_err(|_| Error::SecretNotFound(name.to_string()))?;
        debug!(name = %name, provider = "env", "Secret resolved");
        Ok(value)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(std::env::var(self.resolve_name(name)).is_ok())
    }

    fn name(&self) -> &str {
        "env"
    }
}

/// File-based secret provider (for development): a flat JSON object of
/// name → value.
pub struct FileProvider {
    secrets: HashMap<String, String>,
}

impl FileProvider {
    pub async fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Serialization(format!("Failed to read secrets file: {}", e)))?;
        let secrets: HashMap<String, String> = serde_json::from_str(&content)?;
        info!(path = %path.display(), count = secrets.len(), "Loaded secrets file");
        Ok(Self { secrets })
    }
}

#[async_trait]
impl SecretProvider for FileProvider {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        let value = self
            .secrets
            .get(name)
            .map(SecretValue::new)
            .ok_or_else(|| Error::SecretNotFound(name.to_string()))?;
        debug!(name = %name, provider = "file", "Secret resolved");
        Ok(value)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.secrets.contains_key(name))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// In-memory provider, the injectable fake for engine tests.
#[derive(Default)]
pub struct StaticProvider {
    secrets: HashMap<String, String>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticProvider {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        self.secrets
            .get(name)
            .map(SecretValue::new)
            .ok_or_else(|| Error::SecretNotFound(name.to_string()))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.secrets.contains_key(name))
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_provider() {
        // SAFETY: This test runs in isolation and doesn't rely on this env var elsewhere
        unsafe { std::env::set_var("FLYWHEEL_TEST_SECRET", "secret_value") };
        let provider = EnvProvider::default();

        let value = provider.get("FLYWHEEL_TEST_SECRET").await.unwrap();
        assert_eq!(value.value, "secret_value");

        assert!(provider.exists("FLYWHEEL_TEST_SECRET").await.unwrap());
        assert!(!provider.exists("NONEXISTENT_SECRET").await.unwrap());
        assert!(matches!(
            provider.get("NONEXISTENT_SECRET").await.unwrap_err(),
            Error::SecretNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_env_provider_with_prefix() {
        unsafe { std::env::set_var("CI_REGISTRY_TOKEN", "tok") };
        let provider = EnvProvider::new(Some("CI".to_string()));
        let value = provider.get("REGISTRY_TOKEN").await.unwrap();
        assert_eq!(value.value, "tok");
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticProvider::new().with_secret("DB_PASSWORD", "hunter2");

        let value = provider.get("DB_PASSWORD").await.unwrap();
        assert_eq!(value.value, "hunter2");

        assert!(provider.exists("DB_PASSWORD").await.unwrap());
        assert!(!provider.exists("NONEXISTENT").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"registry_token":"tok123"}"#).unwrap();

        let provider = FileProvider::load_from_file(&path).await.unwrap();
        assert_eq!(provider.get("registry_token").await.unwrap().value, "tok123");
        assert!(!provider.exists("other").await.unwrap());
    }
}
