//! Storage backends for extension data.
//!
//! Extensions keep their whole data set in memory behind a lock and call
//! [`Database::dirty`] after every mutation. The JSON file backend loads the
//! file on first access and rewrites it on every flush.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Storage failures.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file content could not be (de)serialised.
    #[error("Invalid database content in {path}: {source}")]
    Serialization {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The file does not exist and creating it was disabled.
    #[error("Database file {0} does not exist")]
    Missing(PathBuf),
}

/// Options of the JSON file backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFileDatabaseOptions {
    /// Location of the file.
    pub path: PathBuf,
    /// Fail instead of creating the file when it is missing.
    #[serde(default)]
    pub no_init: bool,
    /// Pretty-print with this many spaces, compact when absent.
    #[serde(default)]
    pub indent: Option<usize>,
}

/// Which backend an extension uses, as written in its options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatabaseOptions {
    /// Nothing is persisted.
    #[default]
    InMemory,
    /// A single JSON document on disk.
    JsonFile(JsonFileDatabaseOptions),
}

/// A lazily loaded, lock-protected data set.
#[async_trait]
pub trait Database<T: Send + 'static>: Send + Sync {
    /// The in-memory data, loaded on first access.
    async fn cache(&self) -> Result<&Mutex<T>, DatabaseError>;

    /// Persists the current data.
    async fn dirty(&self) -> Result<(), DatabaseError>;
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryDatabase<T> {
    data: Mutex<T>,
}

impl<T> InMemoryDatabase<T> {
    /// Wraps an initial value.
    pub fn new(data: T) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Database<T> for InMemoryDatabase<T> {
    async fn cache(&self) -> Result<&Mutex<T>, DatabaseError> {
        Ok(&self.data)
    }

    async fn dirty(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Stores the data set as one JSON document.
#[derive(Debug)]
pub struct JsonFileDatabase<T> {
    options: JsonFileDatabaseOptions,
    cache: OnceCell<Mutex<T>>,
    write_lock: Mutex<()>,
}

impl<T> JsonFileDatabase<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    /// Creates the backend; nothing is read until the first access.
    pub fn new(options: JsonFileDatabaseOptions) -> Self {
        Self {
            options,
            cache: OnceCell::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.options.path
    }

    /// Reads the file, creating it with default content when missing.
    pub async fn read(&self) -> Result<T, DatabaseError> {
        let path = self.path();
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                DatabaseError::Serialization {
                    path: path.to_path_buf(),
                    source,
                }
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.options.no_init {
                    return Err(DatabaseError::Missing(path.to_path_buf()));
                }
                info!(path = %path.display(), "Initializing database file");
                let data = T::default();
                self.write(&data).await?;
                Ok(data)
            }
            Err(source) => Err(DatabaseError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes `data` to a temporary file next to the target and moves it
    /// into place.
    pub async fn write(&self, data: &T) -> Result<(), DatabaseError> {
        let bytes = self.encode(data)?;
        self.write_bytes(&bytes).await
    }

    fn encode(&self, data: &T) -> Result<Vec<u8>, DatabaseError> {
        to_json_bytes(data, self.options.indent).map_err(|source| DatabaseError::Serialization {
            path: self.path().to_path_buf(),
            source,
        })
    }

    async fn write_bytes(&self, bytes: &[u8]) -> Result<(), DatabaseError> {
        let path = self.path();
        let io_error = |source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_error)?;

        debug!(path = %path.display(), bytes = bytes.len(), "Database written");
        Ok(())
    }
}

#[async_trait]
impl<T> Database<T> for JsonFileDatabase<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    async fn cache(&self) -> Result<&Mutex<T>, DatabaseError> {
        self.cache
            .get_or_try_init(|| async {
                debug!(path = %self.path().display(), "Lazily initializing database cache");
                self.read().await.map(Mutex::new)
            })
            .await
    }

    async fn dirty(&self) -> Result<(), DatabaseError> {
        // Writes are serialised so an older snapshot never lands after a
        // newer one.
        let _writing = self.write_lock.lock().await;
        let bytes = {
            let data = self.cache().await?.lock().await;
            self.encode(&data)?
        };
        self.write_bytes(&bytes).await
    }
}

fn to_json_bytes<T: Serialize>(data: &T, indent: Option<usize>) -> Result<Vec<u8>, serde_json::Error> {
    match indent {
        None => serde_json::to_vec(data),
        Some(width) => {
            let indent = vec![b' '; width];
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            data.serialize(&mut serializer)?;
            Ok(buf)
        }
    }
}

/// Builds the backend described by `options`.
pub fn make_database<T>(options: &DatabaseOptions) -> Box<dyn Database<T>>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    match options {
        DatabaseOptions::InMemory => Box::new(InMemoryDatabase::new(T::default())),
        DatabaseOptions::JsonFile(options) => Box::new(JsonFileDatabase::<T>::new(options.clone())),
    }
}
