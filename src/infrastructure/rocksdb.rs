use crate::domain::payment::OrderId;
use crate::domain::ports::GuardStore;
use crate::domain::state::GuardState;
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family holding one guard per order id.
pub const CF_GUARDS: &str = "guards";

/// A persistent reconciliation guard backed by RocksDB.
///
/// Guards survive restarts, so an order activated in an earlier run is still
/// recognized as resolved. `Clone` shares the underlying `Arc<DB>` and the claim
/// lock.
#[derive(Clone)]
pub struct RocksDBGuardStore {
    db: Arc<DB>,
    claims: Arc<Mutex<()>>,
}

impl RocksDBGuardStore {
    /// Opens or creates a RocksDB instance at `path` with the "guards" column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_guards = ColumnFamilyDescriptor::new(CF_GUARDS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_guards])?;

        Ok(Self {
            db: Arc::new(db),
            claims: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_GUARDS)
            .ok_or_else(|| ReconcileError::Storage("Guards column family not found".to_string()))
    }

    fn read(&self, order_id: &OrderId) -> Result<Option<GuardState>> {
        match self.db.get_pinned_cf(self.cf()?, order_id.as_str())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, order_id: &OrderId, state: GuardState) -> Result<()> {
        let value = serde_json::to_vec(&state)?;
        self.db.put_cf(self.cf()?, order_id.as_str(), value)?;
        Ok(())
    }
}

#[async_trait]
impl GuardStore for RocksDBGuardStore {
    async fn try_claim(&self, order_id: &OrderId, state: GuardState) -> Result<bool> {
        let _claim = self.claims.lock().await;
        if self.read(order_id)?.is_some() {
            return Ok(false);
        }
        self.write(order_id, state)?;
        Ok(true)
    }

    async fn set(&self, order_id: &OrderId, state: GuardState) -> Result<()> {
        let _claim = self.claims.lock().await;
        self.write(order_id, state)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<GuardState>> {
        self.read(order_id)
    }
}
