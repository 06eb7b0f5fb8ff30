//! The rule store (§4.A): persisted tables for experiments, address-sets,
//! filter chains, and TC rules, reached through a pooled SQLite connection.
//!
//! Every write is serialized by SQLite itself; readers see only committed
//! state. All failures surface as [`StoreError`] and are fatal to whichever
//! attack step triggered them (§4.A contract).

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::error::StoreError;
use crate::model::{
    AddressSetRule, AttackKind, Direction, Experiment, ExperimentStatus, FilterChainRule, TcRule,
    TcType,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS experiments (
    uid TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    recover_command TEXT NOT NULL DEFAULT '',
    error TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS address_set_rules (
    name TEXT PRIMARY KEY,
    cidrs TEXT NOT NULL,
    experiment TEXT NOT NULL REFERENCES experiments(uid)
);

CREATE TABLE IF NOT EXISTS filter_chain_rules (
    name TEXT PRIMARY KEY,
    address_sets TEXT NOT NULL,
    direction TEXT NOT NULL,
    experiment TEXT NOT NULL REFERENCES experiments(uid)
);

CREATE TABLE IF NOT EXISTS tc_rules (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    device TEXT NOT NULL,
    tc_json TEXT NOT NULL,
    address_set TEXT,
    protocol TEXT,
    source_port TEXT,
    egress_port TEXT,
    experiment TEXT NOT NULL REFERENCES experiments(uid)
);
"#;

/// Pooled handle to the rule store's SQLite backend.
///
/// Cheap to clone: internally an `Arc`-backed connection pool (see
/// [`sqlx::sqlite::SqlitePool`]).
#[derive(Clone, Debug)]
pub struct RuleStore {
    pool: SqlitePool,
}

impl RuleStore {
    /// Open (creating if absent) the SQLite database at `path` and run the
    /// idempotent schema migration.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&url).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests: same schema, no filesystem footprint.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new().max_connections(8).connect("sqlite::memory:").await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    // ---- experiments ----------------------------------------------------

    /// Insert a new experiment row (§4.A `set`).
    pub async fn set_experiment(&self, exp: &Experiment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO experiments (uid, kind, status, recover_command, error, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&exp.uid)
        .bind(exp.kind.as_str())
        .bind(exp.status.as_str())
        .bind(&exp.recover_command)
        .bind(&exp.error_message)
        .bind(exp.created_at.to_rfc3339())
        .bind(exp.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition an experiment's status, error message, and recover command
    /// (§4.A `update`). The dispatcher and recovery engine call this once per
    /// state transition (§4.D).
    pub async fn update_experiment(
        &self,
        uid: &str,
        status: ExperimentStatus,
        error_message: &str,
        recover_command: &str,
    ) -> Result<(), StoreError> {
        let updated_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE experiments SET status = ?, error = ?, recover_command = ?, updated_at = ? \
             WHERE uid = ?",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(recover_command)
        .bind(updated_at)
        .bind(uid)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("experiment {uid}")));
        }
        Ok(())
    }

    /// Fetch one experiment by uid (§4.A `get`).
    pub async fn get_experiment(&self, uid: &str) -> Result<Experiment, StoreError> {
        let row = sqlx::query(
            "SELECT uid, kind, status, recover_command, error, created_at, updated_at \
             FROM experiments WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("experiment {uid}")))?;
        row_to_experiment(&row)
    }

    // ---- address-set rules -----------------------------------------------

    /// Persist an address-set rule (§4.A `set`).
    pub async fn set_address_set(&self, rule: &AddressSetRule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO address_set_rules (name, cidrs, experiment) VALUES (?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET cidrs = excluded.cidrs",
        )
        .bind(&rule.name)
        .bind(&rule.cidrs)
        .bind(&rule.experiment)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List every address-set rule, in no particular order (§4.A `list`).
    pub async fn list_address_sets(&self) -> Result<Vec<AddressSetRule>, StoreError> {
        let rows = sqlx::query("SELECT name, cidrs, experiment FROM address_set_rules")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| AddressSetRule {
                name: r.get("name"),
                cidrs: r.get("cidrs"),
                experiment: r.get("experiment"),
            })
            .collect())
    }

    /// Delete every address-set rule owned by `uid` (§4.A `delete_by_experiment`).
    pub async fn delete_address_sets_by_experiment(&self, uid: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM address_set_rules WHERE experiment = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- filter-chain rules -----------------------------------------------

    /// Persist a filter-chain rule.
    pub async fn set_filter_chain(&self, rule: &FilterChainRule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO filter_chain_rules (name, address_sets, direction, experiment) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET address_sets = excluded.address_sets",
        )
        .bind(&rule.name)
        .bind(&rule.address_sets)
        .bind(rule.direction.to_string())
        .bind(&rule.experiment)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List every filter-chain rule.
    pub async fn list_filter_chains(&self) -> Result<Vec<FilterChainRule>, StoreError> {
        let rows =
            sqlx::query("SELECT name, address_sets, direction, experiment FROM filter_chain_rules")
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|r| {
                let direction: String = r.get("direction");
                Ok(FilterChainRule {
                    name: r.get("name"),
                    address_sets: r.get("address_sets"),
                    direction: Direction::from_str(&direction)
                        .map_err(StoreError::Decode)?,
                    experiment: r.get("experiment"),
                })
            })
            .collect()
    }

    /// Delete every filter-chain rule owned by `uid`.
    pub async fn delete_filter_chains_by_experiment(&self, uid: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM filter_chain_rules WHERE experiment = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- TC rules -----------------------------------------------------------

    /// Persist a TC rule.
    pub async fn set_tc(&self, rule: &TcRule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tc_rules (type, device, tc_json, address_set, protocol, source_port, egress_port, experiment) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.r#type.to_string())
        .bind(&rule.device)
        .bind(&rule.tc_json)
        .bind(&rule.address_set)
        .bind(&rule.protocol)
        .bind(&rule.source_port)
        .bind(&rule.egress_port)
        .bind(&rule.experiment)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List TC rules for one device (§4.A `find_by_device`).
    pub async fn find_tcs_by_device(&self, device: &str) -> Result<Vec<TcRule>, StoreError> {
        let rows = sqlx::query(
            "SELECT type, device, tc_json, address_set, protocol, source_port, egress_port, experiment \
             FROM tc_rules WHERE device = ?",
        )
        .bind(device)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_tc_rule).collect()
    }

    /// Delete every TC rule owned by `uid`.
    pub async fn delete_tcs_by_experiment(&self, uid: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tc_rules WHERE experiment = ?").bind(uid).execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_experiment(row: &sqlx::sqlite::SqliteRow) -> Result<Experiment, StoreError> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(Experiment {
        uid: row.get("uid"),
        kind: AttackKind::from_str(&kind).map_err(StoreError::Decode)?,
        status: ExperimentStatus::from_str(&status).map_err(StoreError::Decode)?,
        recover_command: row.get("recover_command"),
        error_message: row.get("error"),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Decode(e.to_string()))?
            .with_timezone(&Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| StoreError::Decode(e.to_string()))?
            .with_timezone(&Utc),
    })
}

fn row_to_tc_rule(row: &sqlx::sqlite::SqliteRow) -> Result<TcRule, StoreError> {
    let r#type: String = row.get("type");
    Ok(TcRule {
        r#type: TcType::from_str(&r#type).map_err(StoreError::Decode)?,
        device: row.get("device"),
        tc_json: row.get("tc_json"),
        address_set: row.get("address_set"),
        protocol: row.get("protocol"),
        source_port: row.get("source_port"),
        egress_port: row.get("egress_port"),
        experiment: row.get("experiment"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExperimentStatus;

    fn new_experiment(uid: &str) -> Experiment {
        let now = Utc::now();
        Experiment {
            uid: uid.to_string(),
            kind: AttackKind::Network,
            status: ExperimentStatus::Created,
            recover_command: "{}".into(),
            error_message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn set_then_get_experiment_round_trips() {
        let store = RuleStore::connect_in_memory().await.unwrap();
        let exp = new_experiment("exp-1");
        store.set_experiment(&exp).await.unwrap();
        let fetched = store.get_experiment("exp-1").await.unwrap();
        assert_eq!(fetched.uid, "exp-1");
        assert_eq!(fetched.status, ExperimentStatus::Created);
    }

    #[tokio::test]
    async fn update_experiment_transitions_status() {
        let store = RuleStore::connect_in_memory().await.unwrap();
        store.set_experiment(&new_experiment("exp-2")).await.unwrap();
        store
            .update_experiment("exp-2", ExperimentStatus::Success, "", "{\"v\":1}")
            .await
            .unwrap();
        let fetched = store.get_experiment("exp-2").await.unwrap();
        assert_eq!(fetched.status, ExperimentStatus::Success);
        assert_eq!(fetched.recover_command, "{\"v\":1}");
    }

    #[tokio::test]
    async fn update_unknown_experiment_errors() {
        let store = RuleStore::connect_in_memory().await.unwrap();
        let err = store
            .update_experiment("missing", ExperimentStatus::Error, "boom", "")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn address_set_rules_round_trip_and_delete() {
        let store = RuleStore::connect_in_memory().await.unwrap();
        store.set_experiment(&new_experiment("exp-3")).await.unwrap();
        store
            .set_address_set(&AddressSetRule {
                name: "chaos-aaaa".into(),
                cidrs: "10.0.0.1/32".into(),
                experiment: "exp-3".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.list_address_sets().await.unwrap().len(), 1);
        store.delete_address_sets_by_experiment("exp-3").await.unwrap();
        assert!(store.list_address_sets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tc_rules_filter_by_device() {
        let store = RuleStore::connect_in_memory().await.unwrap();
        store.set_experiment(&new_experiment("exp-4")).await.unwrap();
        store
            .set_tc(&TcRule {
                r#type: TcType::Netem,
                device: "eth0".into(),
                tc_json: "{}".into(),
                address_set: None,
                protocol: None,
                source_port: None,
                egress_port: None,
                experiment: "exp-4".into(),
            })
            .await
            .unwrap();
        store
            .set_tc(&TcRule {
                r#type: TcType::Netem,
                device: "eth1".into(),
                tc_json: "{}".into(),
                address_set: None,
                protocol: None,
                source_port: None,
                egress_port: None,
                experiment: "exp-4".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.find_tcs_by_device("eth0").await.unwrap().len(), 1);
        assert_eq!(store.find_tcs_by_device("eth1").await.unwrap().len(), 1);
        store.delete_tcs_by_experiment("exp-4").await.unwrap();
        assert!(store.find_tcs_by_device("eth0").await.unwrap().is_empty());
    }
}
