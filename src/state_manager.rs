// State Manager for the gate
// SQLite-based persistence with JSON backup
//
// Keeps the strategy state between evaluation cycles and an audit trail of
// every allocation the gate produced.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::StateConfig;
use crate::{AllocationMap, Evaluation, StrategyState};

// =============================================================================
// Data Models
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub key: String,
    pub state: StrategyState,
    /// Timestamp of the last bar the state was evaluated on
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub id: i64,
    pub key: String,
    pub as_of: DateTime<Utc>,
    pub regime: String,
    pub decision: String,
    pub allocation: AllocationMap,
    pub created_at: String,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp: {}", raw))?
        .with_timezone(&Utc))
}

// =============================================================================
// State Store Implementation
// =============================================================================

pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
    json_backup_path: Option<PathBuf>,
}

impl SqliteStateStore {
    pub fn new<P: AsRef<Path>>(db_path: P, json_backup_path: Option<P>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Create parent directories
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = json_backup_path.as_ref().and_then(|p| p.as_ref().parent()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // WAL keeps readers unblocked while a cycle is written
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            json_backup_path: json_backup_path.map(|p| p.as_ref().to_path_buf()),
        };

        store.create_tables()?;
        info!("SQLite state store initialized at {}", db_path.display());

        Ok(store)
    }

    /// Non-persistent store for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            json_backup_path: None,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("State database lock poisoned"))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS strategy_state (
                key TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                as_of TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS allocations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                as_of TEXT NOT NULL,
                regime TEXT NOT NULL,
                decision TEXT NOT NULL,
                allocation_json TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_allocations_key ON allocations(key, id)",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    /// Persist the new state and its allocation in one transaction
    pub fn save_cycle(&self, key: &str, as_of: DateTime<Utc>, eval: &Evaluation) -> Result<()> {
        let state_json = serde_json::to_string(&eval.state)?;
        let allocation_json = serde_json::to_string(&eval.allocation)?;
        let as_of_str = as_of.to_rfc3339();

        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT OR REPLACE INTO strategy_state (key, state_json, as_of, updated_at)
                 VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)",
                params![key, state_json, as_of_str],
            )?;

            tx.execute(
                "INSERT INTO allocations (key, as_of, regime, decision, allocation_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key,
                    as_of_str,
                    eval.regime.as_str(),
                    eval.decision.as_str(),
                    allocation_json
                ],
            )?;

            tx.commit()?;
        }

        info!(
            key,
            as_of = %as_of,
            regime = %eval.regime,
            decision = %eval.decision,
            count = eval.state.count,
            "Cycle saved"
        );

        if self.json_backup_path.is_some() {
            self.export_json()?;
        }

        Ok(())
    }

    pub fn load_state(&self, key: &str) -> Result<Option<StoredState>> {
        let row = {
            let conn = self.lock()?;
            let mut stmt =
                conn.prepare("SELECT state_json, as_of FROM strategy_state WHERE key = ?1")?;
            let result = stmt.query_row(params![key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            });
            match result {
                Ok(r) => Some(r),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };

        let Some((state_json, as_of)) = row else {
            debug!(key, "No stored state");
            return Ok(None);
        };

        let state: StrategyState = serde_json::from_str(&state_json)
            .with_context(|| format!("Corrupt stored state for '{}'", key))?;
        let as_of = parse_timestamp(&as_of)?;

        debug!(key, count = state.count, regime = %state.regime, "Loaded state");
        Ok(Some(StoredState {
            key: key.to_string(),
            state,
            as_of,
        }))
    }

    /// Most recent allocations for `key`, newest first
    pub fn recent_allocations(&self, key: &str, limit: usize) -> Result<Vec<AllocationRecord>> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT id, key, as_of, regime, decision, allocation_json, created_at
                 FROM allocations WHERE key = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![key, limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(
                |(id, key, as_of, regime, decision, allocation_json, created_at)| {
                    Ok(AllocationRecord {
                        id,
                        key,
                        as_of: parse_timestamp(&as_of)?,
                        regime,
                        decision,
                        allocation: serde_json::from_str(&allocation_json)
                            .context("Corrupt stored allocation")?,
                        created_at,
                    })
                },
            )
            .collect()
    }

    fn all_states(&self) -> Result<Vec<StoredState>> {
        let keys: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare("SELECT key FROM strategy_state ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            keys
        };

        let mut states = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(state) = self.load_state(&key)? {
                states.push(state);
            }
        }
        Ok(states)
    }

    pub fn export_json(&self) -> Result<()> {
        let Some(path) = &self.json_backup_path else {
            return Ok(());
        };

        let states = self.all_states()?;
        let backup = serde_json::json!({
            "exported_at": Utc::now().to_rfc3339(),
            "states": states,
        });

        std::fs::write(path, serde_json::to_string_pretty(&backup)?)?;
        debug!("State exported to: {}", path.display());
        Ok(())
    }
}

// =============================================================================
// Factory Function
// =============================================================================

pub fn create_state_store(config: &StateConfig) -> Result<SqliteStateStore> {
    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("Failed to create state dir {}", config.state_dir))?;

    let backup = config.auto_backup.then(|| config.json_backup_path());
    SqliteStateStore::new(config.db_path(), backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Decision, Regime, Symbol};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn evaluation(count: i64, decision: Decision, weight: f64) -> Evaluation {
        let mut state = StrategyState::seeded(count);
        state.regime = Regime::Elevated;
        state.entry_prices.insert(Symbol::new("QQQ"), 321.5);
        Evaluation {
            state,
            allocation: AllocationMap::uniform(&[Symbol::new("QQQ")], weight),
            regime: Regime::Elevated,
            decision,
            readings: BTreeMap::new(),
        }
    }

    #[test]
    fn test_state_round_trip() {
        let store = SqliteStateStore::in_memory().unwrap();
        assert!(store.load_state("gate").unwrap().is_none());

        let as_of = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let eval = evaluation(7, Decision::Cooldown, 0.0);
        store.save_cycle("gate", as_of, &eval).unwrap();

        let stored = store.load_state("gate").unwrap().unwrap();
        assert_eq!(stored.state, eval.state);
        assert_eq!(stored.as_of, as_of);
    }

    #[test]
    fn test_allocation_audit_trail() {
        let store = SqliteStateStore::in_memory().unwrap();
        let day1 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();

        store
            .save_cycle("gate", day1, &evaluation(5, Decision::Cooldown, 0.0))
            .unwrap();
        store
            .save_cycle("gate", day2, &evaluation(0, Decision::Reentry, 1.0))
            .unwrap();
        store
            .save_cycle("other", day2, &evaluation(0, Decision::Reentry, 1.0))
            .unwrap();

        let records = store.recent_allocations("gate", 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_of, day2);
        assert_eq!(records[0].decision, "reentry");
        assert_eq!(records[0].allocation.weight(&Symbol::new("QQQ")), Some(1.0));
        assert_eq!(records[1].regime, "elevated");

        assert_eq!(store.load_state("gate").unwrap().unwrap().state.count, 0);
    }

    #[test]
    fn test_file_store_writes_backup() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StateConfig {
            state_dir: dir.path().join("state").display().to_string(),
            key: None,
            auto_backup: true,
        };
        let store = create_state_store(&config).unwrap();
        let as_of = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        store
            .save_cycle("gate", as_of, &evaluation(3, Decision::Cooldown, 0.0))
            .unwrap();

        let backup = std::fs::read_to_string(config.json_backup_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&backup).unwrap();
        assert_eq!(json["states"][0]["key"], "gate");
        assert_eq!(json["states"][0]["state"]["count"], 3);

        drop(store);
        let reopened = create_state_store(&config).unwrap();
        assert!(reopened.load_state("gate").unwrap().is_some());
    }
}
