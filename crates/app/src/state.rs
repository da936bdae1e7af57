use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

use common::keystore::{KeyPairManager, SqliteKeyStore, SqliteKeyStoreError};
use common::registry::{BlobsStore, BlobsStoreError, FileCacheStore, PublicKeyRegistry, CACHE_TTL};
use serde::{Deserialize, Serialize};

use crate::directory::LocalDirectory;

pub const APP_NAME: &str = "quill";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEYS_DB_FILE_NAME: &str = "keys.sqlite";
pub const BLOBS_DIR_NAME: &str = "blobs";
pub const CACHE_DIR_NAME: &str = "cache";
pub const DIRECTORY_FILE_NAME: &str = "directory.json";

pub type Registry = PublicKeyRegistry<BlobsStore, FileCacheStore, LocalDirectory>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// How long a resolved public key is trusted, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Identity used when `--user` is not given
    #[serde(default)]
    pub default_user: Option<String>,
}

fn default_cache_ttl_secs() -> u64 {
    CACHE_TTL.as_secs()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            default_user: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the quill directory (~/.quill)
    pub quill_dir: PathBuf,
    /// Path to the key pair database
    pub keys_db_path: PathBuf,
    /// Path to the content-addressed blob store
    pub blobs_path: PathBuf,
    /// Path to the public key cache
    pub cache_path: PathBuf,
    /// Path to the local profile directory
    pub directory_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the quill directory path (custom or default ~/.quill)
    pub fn quill_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    fn at(quill_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            keys_db_path: quill_dir.join(KEYS_DB_FILE_NAME),
            blobs_path: quill_dir.join(BLOBS_DIR_NAME),
            cache_path: quill_dir.join(CACHE_DIR_NAME),
            directory_path: quill_dir.join(DIRECTORY_FILE_NAME),
            config_path: quill_dir.join(CONFIG_FILE_NAME),
            quill_dir,
            config,
        }
    }

    /// Initialize a new quill state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let quill_dir = Self::quill_dir(custom_path)?;
        if quill_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let state = Self::at(quill_dir, config.unwrap_or_default());
        fs::create_dir_all(&state.quill_dir)?;
        fs::create_dir_all(&state.blobs_path)?;
        fs::create_dir_all(&state.cache_path)?;
        fs::write(&state.directory_path, "{}")?;
        fs::write(&state.config_path, toml::to_string_pretty(&state.config)?)?;

        // the key database is created on first open
        Ok(state)
    }

    /// Load existing state from the quill directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let quill_dir = Self::quill_dir(custom_path)?;
        let config_path = quill_dir.join(CONFIG_FILE_NAME);

        let config_toml = match fs::read_to_string(&config_path) {
            Ok(config_toml) => config_toml,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StateError::NotInitialized)
            }
            Err(e) => return Err(e.into()),
        };
        let config: AppConfig = toml::from_str(&config_toml)?;

        let state = Self::at(quill_dir, config);
        if !state.blobs_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", BLOBS_DIR_NAME)));
        }
        if !state.directory_path.exists() {
            return Err(StateError::MissingFile(DIRECTORY_FILE_NAME.to_string()));
        }
        Ok(state)
    }

    /// The identity to act as: `explicit` if given, else the configured default
    pub fn user(&self, explicit: Option<&str>) -> Result<String, StateError> {
        explicit
            .map(str::to_string)
            .or_else(|| self.config.default_user.clone())
            .ok_or(StateError::NoUser)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    /// Open the stores behind this state
    pub async fn open(self) -> Result<Services, StateError> {
        let keys = KeyPairManager::new(SqliteKeyStore::open(&self.keys_db_path).await?);
        let registry = PublicKeyRegistry::new(
            BlobsStore::fs(&self.blobs_path).await?,
            FileCacheStore::new(&self.cache_path),
            LocalDirectory::new(&self.directory_path),
        )
        .with_ttl(self.cache_ttl());

        tracing::debug!(quill_dir = %self.quill_dir.display(), "opened quill state");
        Ok(Services {
            state: self,
            keys,
            registry,
        })
    }
}

/// An [`AppState`] with its stores open
#[derive(Debug)]
pub struct Services {
    pub state: AppState,
    pub keys: KeyPairManager<SqliteKeyStore>,
    pub registry: Registry,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("quill directory not initialized. Run 'quill init' first")]
    NotInitialized,

    #[error("quill directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("no user given. Pass --user or set default_user in config.toml")]
    NoUser,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("key store error: {0}")]
    KeyStore(#[from] SqliteKeyStoreError),

    #[error("blob store error: {0}")]
    Blobs(#[from] BlobsStoreError),
}
