use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fros_models::{ExecutionRecord, Transaction};

use super::ExecutionLedger;
use crate::error::StoreError;

/// In-process ledger. Sharded maps keep appends for distinct identifiers
/// from blocking each other.
#[derive(Default)]
pub struct MemoryLedger {
    records: DashMap<String, Arc<ExecutionRecord>>,
    by_account: DashMap<String, Vec<Transaction>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionLedger for MemoryLedger {
    fn append(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let transaction = record.transaction.clone();

        match self.records.entry(transaction.id.clone()) {
            Entry::Occupied(existing) => {
                return Err(StoreError::Duplicate(Box::new(
                    existing.get().as_ref().clone(),
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(record));
            }
        }

        self.by_account
            .entry(transaction.origin_account.clone())
            .or_default()
            .push(transaction);
        Ok(())
    }

    fn get(&self, transaction_id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self
            .records
            .get(transaction_id)
            .map(|r| r.value().as_ref().clone()))
    }

    fn history_for_account(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut history = self
            .by_account
            .get(account)
            .map(|txs| txs.value().clone())
            .unwrap_or_default();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history.truncate(limit);
        Ok(history)
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}
