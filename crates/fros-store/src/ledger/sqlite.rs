use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use fros_models::{ExecutionRecord, Transaction};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use super::ExecutionLedger;
use crate::error::StoreError;

/// Schema for the durable execution ledger.
///
/// `occurred_at` is stored as fixed-width RFC 3339 (microseconds, `Z`) so
/// lexical order matches chronological order.
pub const LEDGER_TABLE_DDL: &str = "
CREATE TABLE IF NOT EXISTS execution_records (
    transaction_id   TEXT PRIMARY KEY NOT NULL,
    origin_account   TEXT NOT NULL,
    occurred_at      TEXT NOT NULL,
    transaction_json TEXT NOT NULL,
    record_json      TEXT NOT NULL,
    recorded_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_account
    ON execution_records(origin_account, occurred_at);
";

/// SQLite-backed ledger. The primary key enforces one record per
/// transaction identifier; SQLite is single-writer so appends serialize
/// on the connection.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) a ledger file. Enables WAL so readers such as
    /// `fros audit` can run while an orchestrator is appending.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(LEDGER_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(path, "Opened SQLite ledger");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(LEDGER_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger connection poisoned".to_string()))
    }

    fn fetch(conn: &Connection, transaction_id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        let json: Option<String> = conn
            .prepare_cached("SELECT record_json FROM execution_records WHERE transaction_id = ?1")?
            .query_row(rusqlite::params![transaction_id], |row| row.get(0))
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl ExecutionLedger for SqliteLedger {
    fn append(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        let transaction_json = serde_json::to_string(&record.transaction)?;
        let record_json = serde_json::to_string(&record)?;
        let occurred_at = record
            .transaction
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO execution_records \
             (transaction_id, origin_account, occurred_at, transaction_json, record_json, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.transaction.id,
                record.transaction.origin_account,
                occurred_at,
                transaction_json,
                record_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            let first = Self::fetch(&conn, &record.transaction.id)?.ok_or_else(|| {
                StoreError::Unavailable(format!(
                    "insert of {} ignored but no row found",
                    record.transaction.id
                ))
            })?;
            return Err(StoreError::Duplicate(Box::new(first)));
        }
        Ok(())
    }

    fn get(&self, transaction_id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        let conn = self.conn()?;
        Self::fetch(&conn, transaction_id)
    }

    fn history_for_account(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT transaction_json FROM execution_records \
             WHERE origin_account = ?1 ORDER BY occurred_at DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![account, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: usize =
            conn.query_row("SELECT COUNT(*) FROM execution_records", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_records::record;
    use chrono::Duration;

    #[test]
    fn append_and_get_round_trip() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let original = record("tx-1", "acct-1", Utc::now(), 0.42);
        ledger.append(original.clone()).unwrap();

        let stored = ledger.get("tx-1").unwrap().unwrap();
        assert_eq!(stored.transaction, original.transaction);
        assert_eq!(stored.decision.id, original.decision.id);
        assert_eq!(stored.request_id, original.request_id);
        assert!(ledger.get("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_is_rejected_with_first_record() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.append(record("tx-1", "acct-1", Utc::now(), 0.1)).unwrap();

        match ledger.append(record("tx-1", "acct-1", Utc::now(), 0.8)) {
            Err(StoreError::Duplicate(first)) => assert_eq!(first.decision.score, 0.1),
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn history_ordering_and_limit() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let base = Utc::now();
        // Inserted out of order on purpose.
        for i in [2, 0, 4, 1, 3] {
            ledger
                .append(record(&format!("tx-{i}"), "acct-1", base + Duration::seconds(i), 0.1))
                .unwrap();
        }
        ledger.append(record("tx-x", "acct-2", base, 0.1)).unwrap();

        let history = ledger.history_for_account("acct-1", 2).unwrap();
        let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["tx-4", "tx-3"]);
        assert_eq!(ledger.history_for_account("acct-2", 10).unwrap().len(), 1);
    }

    #[test]
    fn file_backed_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();

        {
            let ledger = SqliteLedger::open(path).unwrap();
            ledger.append(record("tx-1", "acct-1", Utc::now(), 0.75)).unwrap();
        }

        let reopened = SqliteLedger::open(path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        let stored = reopened.get("tx-1").unwrap().unwrap();
        assert_eq!(stored.decision.score, 0.75);
        assert!(reopened.append(record("tx-1", "acct-1", Utc::now(), 0.1)).is_err());
    }

    #[test]
    fn concurrent_appends_serialize_without_loss() {
        let ledger = std::sync::Arc::new(SqliteLedger::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = std::sync::Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut duplicates = 0;
                    for i in 0..25 {
                        // Every thread also races on the shared "tx-shared-{i}".
                        ledger
                            .append(record(&format!("tx-{t}-{i}"), "acct-1", Utc::now(), 0.1))
                            .unwrap();
                        match ledger.append(record(&format!("tx-shared-{i}"), "acct-1", Utc::now(), 0.1)) {
                            Ok(()) => {}
                            Err(StoreError::Duplicate(_)) => duplicates += 1,
                            Err(e) => panic!("unexpected ledger error: {e}"),
                        }
                    }
                    duplicates
                })
            })
            .collect();

        let duplicates: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(duplicates, 7 * 25);
        assert_eq!(ledger.len().unwrap(), 8 * 25 + 25);
    }

    #[test]
    fn empty_ledger() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        assert!(ledger.is_empty().unwrap());
        assert!(ledger.history_for_account("acct-1", 10).unwrap().is_empty());
    }
}
