//! Named response stores.
//!
//! A named store is a keyed collection of [`StoredResponse`] records inside
//! the shared database. Writes are single-statement UPSERTs, so a reader
//! sees either the previous record or the new one for a key, never a mix.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::StoreDb;
use super::response::StoredResponse;
use crate::Error;

/// Keyed response storage used by the controller.
///
/// Implemented by [`NamedStore`]; tests substitute their own doubles.
#[async_trait]
pub trait ResponseStore: Send + Sync + fmt::Debug {
    /// Insert or replace the record under `key`.
    async fn put(&self, key: &str, response: &StoredResponse) -> Result<(), Error>;

    /// Exact-key lookup.
    async fn match_key(&self, key: &str) -> Result<Option<StoredResponse>, Error>;

    /// Whether a record exists under `key`.
    async fn has(&self, key: &str) -> Result<bool, Error> {
        Ok(self.match_key(key).await?.is_some())
    }

    /// Remove the record under `key`. Returns false if there was none.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// All keys, in insertion order of the latest write.
    async fn keys(&self) -> Result<Vec<String>, Error>;
}

/// Handle to one named store in a [`StoreDb`].
#[derive(Clone)]
pub struct NamedStore {
    db: StoreDb,
    name: String,
}

impl NamedStore {
    pub(crate) fn new(db: StoreDb, name: &str) -> Self {
        Self { db, name: name.to_string() }
    }
}

impl fmt::Debug for NamedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedStore").field("name", &self.name).finish()
    }
}

#[async_trait]
impl ResponseStore for NamedStore {
    async fn put(&self, key: &str, response: &StoredResponse) -> Result<(), Error> {
        let store = self.name.clone();
        let key = key.to_string();
        let status = response.status;
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.to_vec();
        let digest = response.digest.clone();
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (store, key, status, headers_json, body, digest, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(store, key) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        digest = excluded.digest,
                        stored_at = excluded.stored_at",
                    params![store, key, status, headers_json, body, digest, stored_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn match_key(&self, key: &str) -> Result<Option<StoredResponse>, Error> {
        let store = self.name.clone();
        let key = key.to_string();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(u16, String, Vec<u8>, String, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status, headers_json, body, digest, stored_at
                     FROM entries WHERE store = ?1 AND key = ?2",
                )?;

                let result = stmt.query_row(params![store, key], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((status, headers_json, body, digest, stored_at)) = row else {
            return Ok(None);
        };

        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
        Ok(Some(StoredResponse { status, headers, body: Bytes::from(body), digest, stored_at: Some(stored_at) }))
    }

    async fn has(&self, key: &str) -> Result<bool, Error> {
        let store = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM entries WHERE store = ?1 AND key = ?2)",
                    params![store, key],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let store = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM entries WHERE store = ?1 AND key = ?2", params![store, key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM entries WHERE store = ?1 ORDER BY stored_at ASC, key ASC")?;
                let keys = stmt
                    .query_map(params![store], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}
