//! Run Store
//!
//! Sled-backed persistence for preserved scaffold contexts and execution
//! records. Values are JSON so stored runs stay readable with external tools.

use crate::catalog::ResultMap;
use crate::error::StorageError;
use crate::execution::ExecutionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const CONTEXTS_TREE: &str = "preserved_contexts";
const RECORDS_TREE: &str = "execution_records";

/// Context carried from one run of a scaffold to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreservedContext {
    pub scaffold_id: String,
    pub data: ResultMap,
    /// Number of runs merged into this context.
    pub merge_count: u64,
    pub updated_at: DateTime<Utc>,
}

fn backend(action: &str, err: sled::Error) -> StorageError {
    StorageError::Backend(format!("Failed to {}: {}", action, err))
}

fn data(action: &str, err: serde_json::Error) -> StorageError {
    StorageError::Data(format!("Failed to {}: {}", action, err))
}

pub struct RunStore {
    db: sled::Db,
    contexts: sled::Tree,
    records: sled::Tree,
}

impl RunStore {
    /// Open (or create) a store in the directory at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| backend("open sled database", e))?;
        Self::from_db(db)
    }

    /// Store that lives only as long as the handle.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| backend("open temporary database", e))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let contexts = db
            .open_tree(CONTEXTS_TREE)
            .map_err(|e| backend("open contexts tree", e))?;
        let records = db
            .open_tree(RECORDS_TREE)
            .map_err(|e| backend("open records tree", e))?;
        Ok(Self {
            db,
            contexts,
            records,
        })
    }

    pub fn load_context(&self, scaffold_id: &str) -> Result<Option<PreservedContext>, StorageError> {
        match self
            .contexts
            .get(scaffold_id.as_bytes())
            .map_err(|e| backend("read preserved context", e))?
        {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| data("decode preserved context", e)),
            None => Ok(None),
        }
    }

    /// Merge `update` into the stored context (new keys win) and bump the
    /// merge counter.
    pub fn save_context(
        &self,
        scaffold_id: &str,
        update: &ResultMap,
    ) -> Result<PreservedContext, StorageError> {
        let mut context = self
            .load_context(scaffold_id)?
            .unwrap_or_else(|| PreservedContext {
                scaffold_id: scaffold_id.to_string(),
                data: ResultMap::new(),
                merge_count: 0,
                updated_at: Utc::now(),
            });
        context
            .data
            .extend(update.iter().map(|(k, v)| (k.clone(), v.clone())));
        context.merge_count += 1;
        context.updated_at = Utc::now();

        let bytes = serde_json::to_vec(&context).map_err(|e| data("encode preserved context", e))?;
        self.contexts
            .insert(scaffold_id.as_bytes(), bytes)
            .map_err(|e| backend("write preserved context", e))?;
        debug!(scaffold_id, merge_count = context.merge_count, "Preserved context saved");
        Ok(context)
    }

    fn record_key(run_id: &str, sequence: u64) -> String {
        format!("{}:{:020}", run_id, sequence)
    }

    pub fn append_record(&self, record: &ExecutionRecord) -> Result<(), StorageError> {
        let key = Self::record_key(&record.run_id, record.sequence);
        let bytes = serde_json::to_vec(record).map_err(|e| data("encode execution record", e))?;
        self.records
            .insert(key.as_bytes(), bytes)
            .map_err(|e| backend("write execution record", e))?;
        Ok(())
    }

    /// Records of one run in sequence order.
    pub fn records_for_run(&self, run_id: &str) -> Result<Vec<ExecutionRecord>, StorageError> {
        let prefix = format!("{}:", run_id);
        self.records
            .scan_prefix(prefix.as_bytes())
            .map(|item| {
                let (_, value) = item.map_err(|e| backend("iterate execution records", e))?;
                serde_json::from_slice(&value).map_err(|e| data("decode execution record", e))
            })
            .collect()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| backend("flush database", e))?;
        Ok(())
    }
}
