//! Extension options and the store wrapper every extension persists through.

use commander_core::{Database, DatabaseError, DatabaseOptions};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Options understood by every store-backed extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Where the extension keeps its data.
    pub database: DatabaseOptions,
}

/// Parses an extension's options document, falling back to defaults.
pub fn parse_options<T>(options: Option<&Value>) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    options.map_or_else(|| Ok(T::default()), |value| T::deserialize(value))
}

/// An extension's whole data set behind a [`Database`].
///
/// Mutations run under the data lock and are flushed afterwards. A mutation
/// that fails is not flushed.
pub struct DataStore<T> {
    database: Box<dyn Database<T>>,
}

impl<T: Send + 'static> DataStore<T> {
    /// Wraps a database.
    pub fn new(database: Box<dyn Database<T>>) -> Self {
        Self { database }
    }

    /// Forces the data to be loaded now.
    pub async fn load(&self) -> Result<(), DatabaseError> {
        self.database.cache().await.map(|_| ())
    }

    /// Runs `f` against the current data.
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R + Send) -> Result<R, DatabaseError> {
        let data = self.database.cache().await?.lock().await;
        Ok(f(&data))
    }

    /// Runs `f` against the data and persists the result when it succeeds.
    pub async fn write<R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E> + Send) -> Result<R, E>
    where
        E: From<DatabaseError>,
    {
        let result = {
            let mut data = self.database.cache().await?.lock().await;
            f(&mut data)?
        };
        self.database.dirty().await?;
        Ok(result)
    }
}

impl<T> fmt::Debug for DataStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore").finish_non_exhaustive()
    }
}
