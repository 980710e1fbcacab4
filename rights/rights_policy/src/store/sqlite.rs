//! SQLite-backed rights store.
//!
//! One database holds the policies, the decision log and the activity feed.
//! Timestamps are stored as RFC 3339 text and constraint and raw policy
//! documents as JSON text. Decisions carry no foreign key to their policy so
//! they outlive it.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rights_core::error::{Error, Result, StorageError};
use rights_core::id::{ActorId, DecisionId, PolicyId, ProjectId};
use rights_core::types::TargetRef;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{sort_for_listing, PolicyStore};
use crate::activity::{ActivityEvent, ActivitySink};
use crate::config::SqliteConfig;
use crate::engine::DecisionLog;
use crate::model::{
    ActionType, ConstraintSet, Decision, DecisionFilter, NewDecision, Outcome, Policy,
    PolicyDraft, PolicyPatch, PolicyType,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS rights_policy (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_type TEXT NOT NULL,
        target_id INTEGER NOT NULL,
        policy_type TEXT NOT NULL,
        action_type TEXT NOT NULL,
        constraints TEXT,
        raw_policy TEXT,
        created_by INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rights_policy_lookup
        ON rights_policy (target_type, target_id, action_type);
    CREATE TABLE IF NOT EXISTS rights_decision (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        policy_id INTEGER,
        policy_type TEXT,
        target_type TEXT NOT NULL,
        target_id INTEGER NOT NULL,
        actor_id INTEGER NOT NULL,
        action_requested TEXT NOT NULL,
        outcome TEXT NOT NULL,
        rationale TEXT NOT NULL,
        evaluated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rights_decision_usage
        ON rights_decision (policy_id, actor_id, outcome);
    CREATE TABLE IF NOT EXISTS activity_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        actor_id INTEGER,
        project_id INTEGER,
        event_type TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id INTEGER NOT NULL,
        title TEXT,
        created_at TEXT NOT NULL
    );
";

const POLICY_COLUMNS: &str = "id, target_type, target_id, policy_type, action_type, \
     constraints, raw_policy, created_by, created_at, updated_at";

const DECISION_COLUMNS: &str = "id, policy_id, policy_type, target_type, target_id, actor_id, \
     action_requested, outcome, rationale, evaluated_at";

/// A rights store backed by a SQLite database.
///
/// Implements [`PolicyStore`], [`DecisionLog`] and [`ActivitySink`] over a
/// single connection. The connection mutex and SQLite's own busy handler
/// both wait at most the configured busy timeout; running out surfaces as
/// [`Error::Timeout`].
#[derive(Clone)]
pub struct SqliteRightsStore {
    connection: Arc<Mutex<Connection>>,
    busy_timeout: Duration,
    path: Option<PathBuf>,
}

impl SqliteRightsStore {
    /// Open (or create) the database described by `config`.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&config.path, flags)
            .map_err(|err| backend_error(&config.path, err))?;
        connection
            .execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|err| backend_error(&config.path, err))?;

        let store = Self::from_connection(
            connection,
            config.busy_timeout(),
            Some(config.path.clone()),
        )?;
        info!(path = %config.path.display(), "Opened SQLite rights store");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|err| Error::from(StorageError::Backend(err.to_string())))?;
        Self::from_connection(
            connection,
            Duration::from_millis(crate::config::DEFAULT_BUSY_TIMEOUT_MS),
            None,
        )
    }

    fn from_connection(
        mut connection: Connection,
        busy_timeout: Duration,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        connection
            .busy_timeout(busy_timeout)
            .map_err(|err| Error::from(StorageError::Backend(err.to_string())))?;
        initialize_schema(&mut connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            busy_timeout,
            path,
        })
    }

    /// The database file, `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Every activity event recorded so far, oldest first.
    pub fn list_activity(&self) -> Result<Vec<ActivityEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT actor_id, project_id, event_type, entity_type, entity_id, title \
                 FROM activity_log ORDER BY id",
            )
            .map_err(|err| self.db_error(err))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ActivityEvent {
                    actor_id: row.get::<_, Option<i64>>(0)?.map(ActorId::new),
                    project_id: row.get::<_, Option<i64>>(1)?.map(ProjectId::new),
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    title: row.get(5)?,
                })
            })
            .map_err(|err| self.db_error(err))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|err| self.db_error(err))
    }

    /// Acquire the connection, waiting at most the busy timeout.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .try_lock_for(self.busy_timeout)
            .ok_or(Error::Timeout(self.busy_timeout))
    }

    /// Map a driver error, treating busy and locked databases as timeouts.
    fn db_error(&self, err: rusqlite::Error) -> Error {
        if is_contention(&err) {
            warn!(error = %err, "SQLite database busy");
            Error::Timeout(self.busy_timeout)
        } else {
            StorageError::Backend(err.to_string()).into()
        }
    }

    fn load_policy(conn: &Connection, id: PolicyId) -> rusqlite::Result<Option<PolicyRow>> {
        conn.query_row(
            &format!("SELECT {} FROM rights_policy WHERE id = ?1", POLICY_COLUMNS),
            params![id.value()],
            PolicyRow::from_row,
        )
        .optional()
    }

    fn query_policies(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Policy>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|err| self.db_error(err))?;
        let rows = stmt
            .query_map(params, PolicyRow::from_row)
            .map_err(|err| self.db_error(err))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|err| self.db_error(err))?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(PolicyRow::into_policy).collect()
    }
}

impl PolicyStore for SqliteRightsStore {
    fn create_policy(&self, draft: &PolicyDraft) -> Result<PolicyId> {
        let spec = draft.validate()?;
        let now = format_timestamp(Utc::now());
        let raw_policy = spec.raw_policy.as_ref().map(Value::to_string);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO rights_policy (target_type, target_id, policy_type, action_type, \
             constraints, raw_policy, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                spec.target.target_type,
                spec.target.target_id,
                spec.policy_type.as_str(),
                spec.action_type.as_str(),
                spec.constraints.to_json_text(),
                raw_policy,
                spec.created_by.map(|actor| actor.value()),
                now,
            ],
        )
        .map_err(|err| self.db_error(err))?;
        let id = PolicyId::new(conn.last_insert_rowid());
        debug!(policy_id = %id, policy_target = %spec.target, "Created policy");

        Ok(id)
    }

    fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
        let row = {
            let conn = self.lock()?;
            Self::load_policy(&conn, id).map_err(|err| self.db_error(err))?
        };
        row.map(PolicyRow::into_policy).transpose()
    }

    fn list_policies(&self, target: &TargetRef) -> Result<Vec<Policy>> {
        let mut policies = self.query_policies(
            &format!(
                "SELECT {} FROM rights_policy WHERE target_type = ?1 AND target_id = ?2",
                POLICY_COLUMNS
            ),
            params![target.target_type, target.target_id],
        )?;
        sort_for_listing(&mut policies);

        Ok(policies)
    }

    fn policies_for_action(&self, target: &TargetRef, action: ActionType) -> Result<Vec<Policy>> {
        self.query_policies(
            &format!(
                "SELECT {} FROM rights_policy \
                 WHERE target_type = ?1 AND target_id = ?2 AND action_type = ?3 ORDER BY id",
                POLICY_COLUMNS
            ),
            params![target.target_type, target.target_id, action.as_str()],
        )
    }

    fn update_policy(&self, id: PolicyId, patch: &PolicyPatch) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|err| self.db_error(err))?;

        let Some(row) = Self::load_policy(&tx, id).map_err(|err| self.db_error(err))? else {
            return Ok(false);
        };
        let mut policy = row.into_policy()?;
        patch.apply(&mut policy, Utc::now())?;

        // Document columns the patch leaves alone keep their stored text as is
        tx.execute(
            "UPDATE rights_policy SET target_type = ?1, target_id = ?2, policy_type = ?3, \
             action_type = ?4, \
             constraints = CASE WHEN ?5 THEN ?6 ELSE constraints END, \
             raw_policy = CASE WHEN ?7 THEN ?8 ELSE raw_policy END, \
             updated_at = ?9 WHERE id = ?10",
            params![
                policy.target.target_type,
                policy.target.target_id,
                policy.policy_type.as_str(),
                policy.action_type.as_str(),
                patch.constraints.is_some(),
                policy.constraints.to_json_text(),
                patch.raw_policy.is_some(),
                policy.raw_policy.as_ref().map(Value::to_string),
                format_timestamp(policy.updated_at),
                id.value(),
            ],
        )
        .map_err(|err| self.db_error(err))?;
        tx.commit().map_err(|err| self.db_error(err))?;
        debug!(policy_id = %id, "Updated policy");

        Ok(true)
    }

    fn delete_policy(&self, id: PolicyId) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM rights_policy WHERE id = ?1", params![id.value()])
            .map_err(|err| self.db_error(err))?;
        if deleted > 0 {
            debug!(policy_id = %id, "Deleted policy");
        }

        Ok(deleted > 0)
    }
}

impl DecisionLog for SqliteRightsStore {
    fn append(&self, decision: NewDecision) -> Result<Decision> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO rights_decision (policy_id, policy_type, target_type, target_id, \
             actor_id, action_requested, outcome, rationale, evaluated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                decision.policy_id.map(|id| id.value()),
                decision.policy_type.map(|policy_type| policy_type.as_str()),
                decision.target.target_type,
                decision.target.target_id,
                decision.actor_id.value(),
                decision.action_requested.as_str(),
                decision.outcome.as_str(),
                decision.rationale,
                format_timestamp(decision.evaluated_at),
            ],
        )
        .map_err(|err| self.db_error(err))?;
        let id = DecisionId::new(conn.last_insert_rowid());

        Ok(decision.into_decision(id))
    }

    fn count_permitted(&self, policy_id: PolicyId, actor_id: ActorId) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM rights_decision \
                 WHERE policy_id = ?1 AND actor_id = ?2 AND outcome = ?3",
                params![policy_id.value(), actor_id.value(), Outcome::Permitted.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| self.db_error(err))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM rights_decision \
                     WHERE (?1 IS NULL OR policy_id = ?1) \
                     AND (?2 IS NULL OR actor_id = ?2) \
                     AND (?3 IS NULL OR outcome = ?3) \
                     ORDER BY id",
                    DECISION_COLUMNS
                ))
                .map_err(|err| self.db_error(err))?;
            let mapped = stmt
                .query_map(
                    params![
                        filter.policy_id.map(|id| id.value()),
                        filter.actor_id.map(|id| id.value()),
                        filter.outcome.map(|outcome| outcome.as_str()),
                    ],
                    DecisionRow::from_row,
                )
                .map_err(|err| self.db_error(err))?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| self.db_error(err))?
        };

        rows.into_iter().map(DecisionRow::into_decision).collect()
    }
}

impl ActivitySink for SqliteRightsStore {
    fn record(&self, event: &ActivityEvent) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO activity_log (actor_id, project_id, event_type, entity_type, \
             entity_id, title, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.actor_id.map(|id| id.value()),
                event.project_id.map(|id| id.value()),
                event.event_type,
                event.entity_type,
                event.entity_id,
                event.title,
                format_timestamp(Utc::now()),
            ],
        )
        .map_err(|err| self.db_error(err))?;

        Ok(())
    }
}

/// A `rights_policy` row before its text columns are decoded.
struct PolicyRow {
    id: i64,
    target_type: String,
    target_id: i64,
    policy_type: String,
    action_type: String,
    constraints: Option<String>,
    raw_policy: Option<String>,
    created_by: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl PolicyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            target_type: row.get(1)?,
            target_id: row.get(2)?,
            policy_type: row.get(3)?,
            action_type: row.get(4)?,
            constraints: row.get(5)?,
            raw_policy: row.get(6)?,
            created_by: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_policy(self) -> Result<Policy> {
        let record = format!("rights_policy {}", self.id);
        let corrupt = |reason: String| -> Error {
            StorageError::Corrupt {
                record: record.clone(),
                reason,
            }
            .into()
        };

        Ok(Policy {
            id: PolicyId::new(self.id),
            target: TargetRef::new(self.target_type, self.target_id),
            policy_type: self
                .policy_type
                .parse::<PolicyType>()
                .map_err(|err| corrupt(err.to_string()))?,
            action_type: self
                .action_type
                .parse::<ActionType>()
                .map_err(|err| corrupt(err.to_string()))?,
            constraints: ConstraintSet::from_json_text(self.constraints.as_deref()),
            raw_policy: self.raw_policy.as_deref().map(parse_raw_policy),
            created_by: self.created_by.map(ActorId::new),
            created_at: parse_timestamp(&self.created_at).map_err(&corrupt)?,
            updated_at: parse_timestamp(&self.updated_at).map_err(&corrupt)?,
        })
    }
}

/// A `rights_decision` row before its text columns are decoded.
struct DecisionRow {
    id: i64,
    policy_id: Option<i64>,
    policy_type: Option<String>,
    target_type: String,
    target_id: i64,
    actor_id: i64,
    action_requested: String,
    outcome: String,
    rationale: String,
    evaluated_at: String,
}

impl DecisionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            policy_id: row.get(1)?,
            policy_type: row.get(2)?,
            target_type: row.get(3)?,
            target_id: row.get(4)?,
            actor_id: row.get(5)?,
            action_requested: row.get(6)?,
            outcome: row.get(7)?,
            rationale: row.get(8)?,
            evaluated_at: row.get(9)?,
        })
    }

    fn into_decision(self) -> Result<Decision> {
        let record = format!("rights_decision {}", self.id);
        let corrupt = |reason: String| -> Error {
            StorageError::Corrupt {
                record: record.clone(),
                reason,
            }
            .into()
        };

        Ok(Decision {
            id: DecisionId::new(self.id),
            policy_id: self.policy_id.map(PolicyId::new),
            policy_type: self
                .policy_type
                .as_deref()
                .map(str::parse::<PolicyType>)
                .transpose()
                .map_err(|err| corrupt(err.to_string()))?,
            target: TargetRef::new(self.target_type, self.target_id),
            actor_id: ActorId::new(self.actor_id),
            action_requested: self
                .action_requested
                .parse::<ActionType>()
                .map_err(|err| corrupt(err.to_string()))?,
            outcome: self.outcome.parse::<Outcome>().map_err(&corrupt)?,
            rationale: self.rationale,
            evaluated_at: parse_timestamp(&self.evaluated_at).map_err(&corrupt)?,
        })
    }
}

fn initialize_schema(connection: &mut Connection) -> Result<()> {
    let tx = connection
        .transaction()
        .map_err(|err| Error::from(StorageError::Backend(err.to_string())))?;
    tx.execute_batch(SCHEMA)
        .map_err(|err| Error::from(StorageError::Backend(err.to_string())))?;
    tx.commit()
        .map_err(|err| Error::from(StorageError::Backend(err.to_string())))?;
    Ok(())
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn backend_error(path: &Path, err: rusqlite::Error) -> Error {
    StorageError::Backend(format!("{}: {}", path.display(), err)).into()
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| format!("bad timestamp '{}': {}", text, err))
}

fn parse_raw_policy(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|err| {
        warn!(error = %err, "Stored raw policy is not valid JSON; keeping it as text");
        Value::String(text.to_string())
    })
}
