//! Public client facade: composes the codec, stream, and pool into the
//! operations callers actually use.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::pool::Pool;
use crate::record::{GetItem, GetRecord, Record, ScriptRecord};
use crate::FLAG_NOREPLY;

/// An async client for a Kyoto Tycoon server, backed by a bounded pool of
/// persistent TCP connections.
///
/// Cloning a `KtClient` is cheap: the pool is reference-counted and shared
/// across clones, so handing a clone to each task is the expected way to
/// use this type under concurrency.
#[derive(Clone)]
pub struct KtClient {
    pool: Arc<Pool>,
}

impl KtClient {
    /// Build a client from an explicit [`ClientConfig`]. The first
    /// connection is opened lazily, on the first operation.
    pub fn new(config: ClientConfig) -> Self {
        let pool = Pool::new(
            config.host,
            config.port,
            config.max_connections,
            config.timeout,
        );
        KtClient {
            pool: Arc::new(pool),
        }
    }

    /// Build a client and eagerly open (and immediately release) one
    /// connection, so construction fails fast if the server isn't
    /// reachable. Used by the embedded supervisor's connect loop.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config);
        let mut lease = client.pool.lease().await?;
        lease.mark_healthy();
        drop(lease);
        Ok(client)
    }

    /// Number of streams currently idle in this client's pool. Exposed for
    /// tests asserting the concurrency bound on open sockets.
    pub fn idle_connections(&self) -> usize {
        self.pool.free_count()
    }

    /// Store a single record. Returns `None` if `flags` includes
    /// `FLAG_NOREPLY` (no response is read in that case).
    pub async fn set(
        &self,
        key: impl Into<Vec<u8>>,
        val: impl Into<Vec<u8>>,
        db: u16,
        expire: i64,
        flags: u32,
    ) -> Result<Option<u32>> {
        self.set_bulk(&[Record::new(key, val, db, expire)], flags)
            .await
    }

    /// Store `kv` as `(key, value, db, expire)` records sharing one `db`
    /// and one `expire`.
    pub async fn set_bulk_kv(
        &self,
        kv: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
        db: u16,
        expire: i64,
        flags: u32,
    ) -> Result<Option<u32>> {
        let records: Vec<Record> = kv
            .into_iter()
            .map(|(k, v)| Record::new(k, v, db, expire))
            .collect();
        self.set_bulk(&records, flags).await
    }

    /// Store multiple records at once.
    pub async fn set_bulk(&self, records: &[Record], flags: u32) -> Result<Option<u32>> {
        let request = codec::encode_set_bulk(records, flags)?;
        let mut lease = self.pool.lease().await?;

        let result = async {
            lease.stream().write_all(&request).await?;
            if flags & FLAG_NOREPLY != 0 {
                return Ok(None);
            }
            let count = codec::decode_count_response(lease.stream(), codec::MB_SET_BULK).await?;
            Ok(Some(count))
        }
        .await;

        if result.is_ok() {
            lease.mark_healthy();
        }
        result
    }

    /// Fetch the value of a single key, or `None` if it doesn't exist.
    pub async fn get(&self, key: impl Into<Vec<u8>>, db: u16) -> Result<Option<Vec<u8>>> {
        let recs = self.get_bulk(&[GetItem::new(key, db)]).await?;
        Ok(recs.into_iter().next().map(|r| r.value))
    }

    /// Fetch multiple keys at once. Keys the server doesn't have are
    /// omitted from the returned map; on duplicate input keys, the later
    /// lookup wins.
    pub async fn get_bulk_keys(
        &self,
        keys: impl IntoIterator<Item = Vec<u8>>,
        db: u16,
    ) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        let items: Vec<GetItem> = keys.into_iter().map(|k| GetItem::new(k, db)).collect();
        let recs = self.get_bulk(&items).await?;
        Ok(recs.into_iter().map(|r| (r.key, r.value)).collect())
    }

    /// Fetch multiple `(key, db)` pairs at once, returning full records.
    pub async fn get_bulk(&self, items: &[GetItem]) -> Result<Vec<GetRecord>> {
        let request = codec::encode_get_bulk(items, 0)?;
        let mut lease = self.pool.lease().await?;

        let result = async {
            lease.stream().write_all(&request).await?;
            codec::decode_get_bulk_response(lease.stream()).await
        }
        .await;

        if result.is_ok() {
            lease.mark_healthy();
        }
        result
    }

    /// Remove a single key. Returns `None` if `flags` includes
    /// `FLAG_NOREPLY`.
    pub async fn remove(&self, key: impl Into<Vec<u8>>, db: u16, flags: u32) -> Result<Option<u32>> {
        self.remove_bulk(&[GetItem::new(key, db)], flags).await
    }

    /// Remove multiple keys from the same database.
    pub async fn remove_bulk_keys(
        &self,
        keys: impl IntoIterator<Item = Vec<u8>>,
        db: u16,
        flags: u32,
    ) -> Result<Option<u32>> {
        let items: Vec<GetItem> = keys.into_iter().map(|k| GetItem::new(k, db)).collect();
        self.remove_bulk(&items, flags).await
    }

    /// Remove multiple `(key, db)` pairs at once.
    pub async fn remove_bulk(&self, items: &[GetItem], flags: u32) -> Result<Option<u32>> {
        let request = codec::encode_remove_bulk(items, flags)?;
        let mut lease = self.pool.lease().await?;

        let result = async {
            lease.stream().write_all(&request).await?;
            if flags & FLAG_NOREPLY != 0 {
                return Ok(None);
            }
            let count =
                codec::decode_count_response(lease.stream(), codec::MB_REMOVE_BULK).await?;
            Ok(Some(count))
        }
        .await;

        if result.is_ok() {
            lease.mark_healthy();
        }
        result
    }

    /// Invoke a Lua procedure exposed by the server's scripting extension.
    pub async fn play_script(
        &self,
        name: impl AsRef<[u8]>,
        records: &[ScriptRecord],
        flags: u32,
    ) -> Result<Option<Vec<ScriptRecord>>> {
        let request = codec::encode_play_script(name.as_ref(), records, flags)?;
        let mut lease = self.pool.lease().await?;

        let result = async {
            lease.stream().write_all(&request).await?;
            if flags & FLAG_NOREPLY != 0 {
                return Ok(None);
            }
            let recs = codec::decode_play_script_response(lease.stream()).await?;
            Ok(Some(recs))
        }
        .await;

        if result.is_ok() {
            lease.mark_healthy();
        }
        result
    }
}
