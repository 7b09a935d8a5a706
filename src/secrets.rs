use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

/// Key under which the provider API token is stored.
pub const API_KEY_NOVEL: &str = "api_key_novel";

/// File-backed key/value store for API credentials. A missing file is an
/// empty store, not an error; writes persist immediately.
pub struct SecretStore {
    path: PathBuf,
    secrets: HashMap<String, String>,
}

impl SecretStore {
    pub fn load(path: &Path) -> Result<Self> {
        let secrets = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            HashMap::new()
        };
        Ok(SecretStore {
            path: path.to_path_buf(),
            secrets,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).map(String::as_str)
    }

    pub fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.secrets.insert(key.to_string(), value.to_string());
        fs::write(&self.path, serde_json::to_string_pretty(&self.secrets)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("nai-bridge-secrets-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_file_is_empty_store() {
        let store = SecretStore::load(&temp_path("missing.json")).unwrap();
        assert!(store.get(API_KEY_NOVEL).is_none());
    }

    #[test]
    fn write_then_reload() {
        let path = temp_path("roundtrip.json");
        let mut store = SecretStore::load(&path).unwrap();
        store.write(API_KEY_NOVEL, "pst-abc123").unwrap();

        let reloaded = SecretStore::load(&path).unwrap();
        assert_eq!(reloaded.get(API_KEY_NOVEL), Some("pst-abc123"));
        let _ = fs::remove_file(&path);
    }
}
