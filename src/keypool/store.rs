use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable storage for the raw key list.
///
/// The pool writes the full list through this trait on every mutation so a
/// restart reconstructs the same set. The medium is opaque to the pool; the
/// default is a JSON file next to the config.
pub trait KeyStore: Send + Sync {
    /// Load the persisted key list. An absent store yields an empty list.
    fn load(&self) -> Result<Vec<String>>;

    /// Replace the persisted key list.
    fn save(&self, keys: &[String]) -> Result<()>;
}

/// JSON-file-backed key store
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store location under the user's config directory
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("metascribe").join("keys.json"))
    }

    /// Open the store at its default location
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs_err::read_to_string(&self.path)
            .context("Failed to read key store")?;

        serde_json::from_str(&content).context("Failed to parse key store")
    }

    fn save(&self, keys: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(keys)
            .context("Failed to serialize key store")?;

        fs_err::write(&self.path, content)
            .context("Failed to write key store")?;

        Ok(())
    }
}

/// In-memory key store for embedding and tests
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<Vec<String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: Vec<String>) -> Self {
        Self {
            keys: Mutex::new(keys),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.keys.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, keys: &[String]) -> Result<()> {
        *self.keys.lock().unwrap_or_else(|e| e.into_inner()) = keys.to_vec();
        Ok(())
    }
}
