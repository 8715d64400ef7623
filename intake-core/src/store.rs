//! Durable storage for callers, calls, triage records and the audit trail.
//!
//! `SqliteStore` opens a fresh connection per operation against a WAL-mode
//! database. Every read-modify-write runs inside a `BEGIN IMMEDIATE`
//! transaction, so a status transition is a compare-and-set: two controllers
//! racing on the same call serialize on the write lock and the loser observes
//! the winner's status.

use crate::error::StoreError;
use crate::models::{
    AuditEntry, AuditId, Call, CallId, CallStats, CallStatus, Caller, CallerId, CallerInput,
    CategoryCount, CategoryInfo, NewCall, TriageRecord,
};
use crate::triage::{Evaluation, Priority, TriageAnswers};
use category_registry::{EmergencyCategory, MedicalReceiver, CATEGORIES};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CALL_COLUMNS: &str = "id, number, caller_id, category, operator, address, description,
     priority, status, dispatched_unit, destination, created_at, dispatched_at, closed_at,
     closure_notes, notification_sent";

const CALLER_COLUMNS: &str = "id, document, given_name, family_name, phone, secondary_phone,
     street, number, floor, unit, neighborhood, latitude, longitude, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, call_id, action, operator, description, details, timestamp";

/// A guarded status change, applied atomically by [`RecordStore::transition_call`].
#[derive(Clone, Debug)]
pub struct Transition {
    pub to: CallStatus,
    /// Statuses the call may currently be in for the change to apply.
    pub allowed_from: Vec<CallStatus>,
    /// Reject unless the call has a triage record (General calls are exempt).
    pub requires_triage: bool,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

impl Transition {
    pub fn new(to: CallStatus, allowed_from: &[CallStatus]) -> Self {
        Self {
            to,
            allowed_from: allowed_from.to_vec(),
            requires_triage: false,
            unit: None,
            notes: None,
            at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransitionOutcome {
    Applied(Call),
    Rejected(CallStatus),
    Untriaged,
    Missing,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TriageOutcome {
    Inserted(Call),
    CallMissing,
    WrongStatus(CallStatus),
    AlreadyTriaged,
}

pub trait RecordStore: Send + Sync {
    fn create_caller(&self, input: &CallerInput, audit: &AuditEntry) -> Result<Caller, StoreError>;
    fn update_caller(
        &self,
        id: CallerId,
        input: &CallerInput,
        audit: &AuditEntry,
    ) -> Result<Option<Caller>, StoreError>;
    fn get_caller(&self, id: CallerId) -> Result<Option<Caller>, StoreError>;
    fn find_caller_by_document(&self, document: &str) -> Result<Option<Caller>, StoreError>;
    /// Matches the primary or the secondary phone.
    fn find_caller_by_phone(&self, phone: &str) -> Result<Option<Caller>, StoreError>;

    fn create_call(&self, call: &NewCall, audit: &AuditEntry) -> Result<Call, StoreError>;
    fn get_call(&self, id: CallId) -> Result<Option<Call>, StoreError>;
    fn find_call_by_number(&self, number: &str) -> Result<Option<Call>, StoreError>;
    fn open_calls(&self) -> Result<Vec<Call>, StoreError>;
    fn recent_calls(&self, limit: usize) -> Result<Vec<Call>, StoreError>;

    fn insert_triage(&self, record: &TriageRecord, audit: &AuditEntry)
        -> Result<TriageOutcome, StoreError>;
    fn triage_for_call(&self, call_id: CallId) -> Result<Option<TriageRecord>, StoreError>;

    fn transition_call(
        &self,
        id: CallId,
        transition: &Transition,
        audit: &AuditEntry,
    ) -> Result<TransitionOutcome, StoreError>;
    /// Flips `notification_sent` from false to true. Returns whether this
    /// caller performed the flip.
    fn claim_notification(&self, id: CallId) -> Result<bool, StoreError>;

    fn append_audit(&self, entry: &AuditEntry) -> Result<AuditId, StoreError>;
    fn audit_for_call(&self, call_id: CallId) -> Result<Vec<AuditEntry>, StoreError>;
    fn audit_after(&self, after_id: AuditId) -> Result<Vec<AuditEntry>, StoreError>;
    fn latest_audit_id(&self) -> Result<Option<AuditId>, StoreError>;
    fn categories(&self) -> Result<Vec<CategoryInfo>, StoreError>;
    /// Status and category counters; `today` counts calls created at or
    /// after `day_start`.
    fn call_stats(&self, day_start: DateTime<Utc>) -> Result<CallStats, StoreError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db_path = PathBuf::from(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let store = Self {
            db_path: Arc::new(db_path),
        };
        let conn = store.connect()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS categories (
                code TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                weight INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS callers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document TEXT,
                given_name TEXT NOT NULL,
                family_name TEXT NOT NULL,
                phone TEXT NOT NULL,
                secondary_phone TEXT,
                street TEXT NOT NULL,
                number TEXT NOT NULL,
                floor TEXT NOT NULL,
                unit TEXT NOT NULL,
                neighborhood TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_callers_document ON callers(document);
            CREATE INDEX IF NOT EXISTS idx_callers_phone ON callers(phone);
            CREATE INDEX IF NOT EXISTS idx_callers_secondary ON callers(secondary_phone);
            CREATE TABLE IF NOT EXISTS calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number TEXT NOT NULL UNIQUE,
                caller_id INTEGER REFERENCES callers(id),
                category TEXT NOT NULL REFERENCES categories(code),
                operator TEXT NOT NULL,
                address TEXT NOT NULL,
                description TEXT NOT NULL,
                priority INTEGER,
                status TEXT NOT NULL,
                dispatched_unit TEXT,
                destination TEXT,
                created_at TEXT NOT NULL,
                dispatched_at TEXT,
                closed_at TEXT,
                closure_notes TEXT,
                notification_sent INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_calls_status ON calls(status);
            CREATE TABLE IF NOT EXISTS triage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                call_id INTEGER NOT NULL UNIQUE REFERENCES calls(id),
                category TEXT NOT NULL,
                answers TEXT NOT NULL,
                priority INTEGER NOT NULL,
                recommend_dispatch INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                call_id INTEGER,
                action TEXT NOT NULL,
                operator TEXT NOT NULL,
                description TEXT NOT NULL,
                details TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_call ON audit_log(call_id);
            ",
        )?;

        for category in CATEGORIES {
            conn.execute(
                "INSERT OR IGNORE INTO categories (code, display_name, weight) VALUES (?1, ?2, ?3)",
                params![category.code(), category.display_name(), category.default_weight()],
            )?;
        }

        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&*self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

impl RecordStore for SqliteStore {
    fn create_caller(&self, input: &CallerInput, audit: &AuditEntry) -> Result<Caller, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO callers (document, given_name, family_name, phone, secondary_phone,
                 street, number, floor, unit, neighborhood, latitude, longitude,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                input.document,
                input.given_name,
                input.family_name,
                input.phone,
                input.secondary_phone,
                input.address.street,
                input.address.number,
                input.address.floor,
                input.address.unit,
                input.address.neighborhood,
                input.latitude,
                input.longitude,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_audit(&tx, &with_caller_id(audit, id))?;
        let caller = select_caller(&tx, id)?
            .ok_or_else(|| StoreError::Corrupt(format!("caller {id} vanished after insert")))?;
        tx.commit()?;
        Ok(caller)
    }

    fn update_caller(
        &self,
        id: CallerId,
        input: &CallerInput,
        audit: &AuditEntry,
    ) -> Result<Option<Caller>, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE callers SET document = ?2, given_name = ?3, family_name = ?4, phone = ?5,
                 secondary_phone = ?6, street = ?7, number = ?8, floor = ?9, unit = ?10,
                 neighborhood = ?11, latitude = ?12, longitude = ?13, updated_at = ?14
             WHERE id = ?1",
            params![
                id,
                input.document,
                input.given_name,
                input.family_name,
                input.phone,
                input.secondary_phone,
                input.address.street,
                input.address.number,
                input.address.floor,
                input.address.unit,
                input.address.neighborhood,
                input.latitude,
                input.longitude,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        insert_audit(&tx, &with_caller_id(audit, id))?;
        let caller = select_caller(&tx, id)?;
        tx.commit()?;
        Ok(caller)
    }

    fn get_caller(&self, id: CallerId) -> Result<Option<Caller>, StoreError> {
        let conn = self.connect()?;
        select_caller(&conn, id)
    }

    fn find_caller_by_document(&self, document: &str) -> Result<Option<Caller>, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {CALLER_COLUMNS} FROM callers
             WHERE document = ?1
             ORDER BY updated_at DESC, id DESC
             LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![document.trim()], map_caller)
            .optional()?)
    }

    fn find_caller_by_phone(&self, phone: &str) -> Result<Option<Caller>, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {CALLER_COLUMNS} FROM callers
             WHERE phone = ?1 OR secondary_phone = ?1
             ORDER BY updated_at DESC, id DESC
             LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![phone.trim()], map_caller)
            .optional()?)
    }

    fn create_call(&self, call: &NewCall, audit: &AuditEntry) -> Result<Call, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO calls (number, caller_id, category, operator, address, description,
                 status, created_at, closed_at, closure_notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                call.number,
                call.caller_id,
                call.category.code(),
                call.operator,
                call.address,
                call.description,
                call.status.as_str(),
                call.created_at.to_rfc3339(),
                call.closed_at.map(|t| t.to_rfc3339()),
                call.closure_notes,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let mut entry = audit.clone();
        entry.call_id = Some(id);
        insert_audit(&tx, &entry)?;
        let created = select_call(&tx, id)?
            .ok_or_else(|| StoreError::Corrupt(format!("call {id} vanished after insert")))?;
        tx.commit()?;
        Ok(created)
    }

    fn get_call(&self, id: CallId) -> Result<Option<Call>, StoreError> {
        let conn = self.connect()?;
        select_call(&conn, id)
    }

    fn find_call_by_number(&self, number: &str) -> Result<Option<Call>, StoreError> {
        let conn = self.connect()?;
        let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE number = ?1");
        Ok(conn.query_row(&sql, params![number], map_call).optional()?)
    }

    fn open_calls(&self) -> Result<Vec<Call>, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {CALL_COLUMNS} FROM calls
             WHERE status IN (?1, ?2, ?3)
             ORDER BY id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let [a, b, c] = CallStatus::OPEN.map(CallStatus::as_str);
        let rows = stmt.query_map(params![a, b, c], map_call)?;
        collect(rows)
    }

    fn recent_calls(&self, limit: usize) -> Result<Vec<Call>, StoreError> {
        let conn = self.connect()?;
        let sql = format!("SELECT {CALL_COLUMNS} FROM calls ORDER BY id DESC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], map_call)?;
        collect(rows)
    }

    fn insert_triage(
        &self,
        record: &TriageRecord,
        audit: &AuditEntry,
    ) -> Result<TriageOutcome, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(current) = select_call(&tx, record.call_id)? else {
            return Ok(TriageOutcome::CallMissing);
        };
        if current.status != CallStatus::Active {
            return Ok(TriageOutcome::WrongStatus(current.status));
        }
        if has_triage(&tx, record.call_id)? {
            return Ok(TriageOutcome::AlreadyTriaged);
        }

        let answers = serde_json::to_string(&record.answers)?;
        tx.execute(
            "INSERT INTO triage (call_id, category, answers, priority, recommend_dispatch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.call_id,
                record.category().code(),
                answers,
                record.evaluation.priority.value(),
                record.evaluation.recommend_dispatch,
                record.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE calls SET priority = ?2, destination = COALESCE(?3, destination) WHERE id = ?1",
            params![
                record.call_id,
                record.evaluation.priority.value(),
                record.answers.medical_receiver().map(MedicalReceiver::tag),
            ],
        )?;
        let mut entry = audit.clone();
        entry.call_id = Some(record.call_id);
        insert_audit(&tx, &entry)?;

        let updated = select_call(&tx, record.call_id)?
            .ok_or_else(|| StoreError::Corrupt(format!("call {} vanished", record.call_id)))?;
        tx.commit()?;
        Ok(TriageOutcome::Inserted(updated))
    }

    fn triage_for_call(&self, call_id: CallId) -> Result<Option<TriageRecord>, StoreError> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                "SELECT id, call_id, answers, priority, recommend_dispatch, created_at
                 FROM triage WHERE call_id = ?1",
                params![call_id],
                map_triage,
            )
            .optional()?)
    }

    fn transition_call(
        &self,
        id: CallId,
        transition: &Transition,
        audit: &AuditEntry,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(current) = select_call(&tx, id)? else {
            return Ok(TransitionOutcome::Missing);
        };
        if !transition.allowed_from.contains(&current.status) {
            return Ok(TransitionOutcome::Rejected(current.status));
        }
        if transition.requires_triage
            && current.category.requires_triage()
            && !has_triage(&tx, id)?
        {
            return Ok(TransitionOutcome::Untriaged);
        }

        let at = transition.at.to_rfc3339();
        let (dispatched_at, closed_at) = match transition.to {
            CallStatus::Dispatched => (Some(at), None),
            CallStatus::Closed | CallStatus::Cancelled => (None, Some(at)),
            CallStatus::Active | CallStatus::InProgress => (None, None),
        };
        let changed = tx.execute(
            "UPDATE calls SET status = ?3,
                 dispatched_at = COALESCE(?4, dispatched_at),
                 closed_at = COALESCE(?5, closed_at),
                 dispatched_unit = COALESCE(?6, dispatched_unit),
                 closure_notes = COALESCE(?7, closure_notes)
             WHERE id = ?1 AND status = ?2",
            params![
                id,
                current.status.as_str(),
                transition.to.as_str(),
                dispatched_at,
                closed_at,
                transition.unit,
                transition.notes,
            ],
        )?;
        if changed == 0 {
            return Ok(TransitionOutcome::Rejected(current.status));
        }
        let mut entry = audit.clone();
        entry.call_id = Some(id);
        insert_audit(&tx, &entry)?;

        let updated = select_call(&tx, id)?
            .ok_or_else(|| StoreError::Corrupt(format!("call {id} vanished")))?;
        tx.commit()?;
        Ok(TransitionOutcome::Applied(updated))
    }

    fn claim_notification(&self, id: CallId) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE calls SET notification_sent = 1 WHERE id = ?1 AND notification_sent = 0",
            params![id],
        )?;
        Ok(changed == 1)
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<AuditId, StoreError> {
        let conn = self.connect()?;
        insert_audit(&conn, entry)
    }

    fn audit_for_call(&self, call_id: CallId) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.connect()?;
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE call_id = ?1 ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![call_id], map_audit)?;
        collect(rows)
    }

    fn audit_after(&self, after_id: AuditId) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.connect()?;
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE id > ?1 ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![after_id], map_audit)?;
        collect(rows)
    }

    fn latest_audit_id(&self) -> Result<Option<AuditId>, StoreError> {
        let conn = self.connect()?;
        Ok(conn.query_row("SELECT MAX(id) FROM audit_log", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?)
    }

    fn categories(&self) -> Result<Vec<CategoryInfo>, StoreError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT code, display_name, weight FROM categories ORDER BY weight ASC")?;
        let rows = stmt.query_map([], |row| {
            let code: String = row.get(0)?;
            Ok(CategoryInfo {
                category: parse_column(0, &code, EmergencyCategory::from_code)?,
                display_name: row.get(1)?,
                weight: row.get(2)?,
            })
        })?;
        collect(rows)
    }

    fn call_stats(&self, day_start: DateTime<Utc>) -> Result<CallStats, StoreError> {
        let conn = self.connect()?;
        let mut stats = CallStats::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM calls GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((parse_column(0, &status, |s| s.parse::<CallStatus>())?, count))
        })?;
        for (status, count) in collect(rows)? {
            let count = u64::try_from(count).unwrap_or(0);
            stats.total += count;
            match status {
                CallStatus::Active => stats.active = count,
                CallStatus::Dispatched => stats.dispatched = count,
                CallStatus::InProgress => stats.in_progress = count,
                CallStatus::Closed => stats.closed = count,
                CallStatus::Cancelled => stats.cancelled = count,
            }
        }

        let today: i64 = conn.query_row(
            "SELECT COUNT(*) FROM calls WHERE created_at >= ?1",
            params![day_start.to_rfc3339()],
            |row| row.get(0),
        )?;
        stats.today = u64::try_from(today).unwrap_or(0);

        let mut stmt = conn.prepare(
            "SELECT c.code, COUNT(calls.id) FROM categories c
             LEFT JOIN calls ON calls.category = c.code
             GROUP BY c.code, c.weight
             ORDER BY c.weight ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let code: String = row.get(0)?;
            let total: i64 = row.get(1)?;
            Ok(CategoryCount {
                category: parse_column(0, &code, EmergencyCategory::from_code)?,
                total: u64::try_from(total).unwrap_or(0),
            })
        })?;
        stats.by_category = collect(rows)?;
        Ok(stats)
    }
}

fn with_caller_id(audit: &AuditEntry, caller_id: CallerId) -> AuditEntry {
    let mut entry = audit.clone();
    let mut details = match entry.details.take() {
        Some(serde_json::Value::Object(map)) => map,
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("details".into(), other);
            map
        }
        None => serde_json::Map::new(),
    };
    details.insert("caller_id".into(), caller_id.into());
    entry.details = Some(serde_json::Value::Object(details));
    entry
}

fn insert_audit(conn: &Connection, entry: &AuditEntry) -> Result<AuditId, StoreError> {
    let action = serde_json::to_string(&entry.action)?;
    let details = entry.details.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO audit_log (call_id, action, operator, description, details, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.call_id,
            action,
            entry.operator,
            entry.description,
            details,
            entry.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn has_triage(conn: &Connection, call_id: CallId) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM triage WHERE call_id = ?1",
            params![call_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn select_call(conn: &Connection, id: CallId) -> Result<Option<Call>, StoreError> {
    let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], map_call).optional()?)
}

fn select_caller(conn: &Connection, id: CallerId) -> Result<Option<Caller>, StoreError> {
    let sql = format!("SELECT {CALLER_COLUMNS} FROM callers WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], map_caller).optional()?)
}

fn collect<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_column<T>(
    idx: usize,
    raw: &str,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> rusqlite::Result<T> {
    parse(raw).map_err(|msg| conversion_error(idx, std::io::Error::other(msg)))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| conversion_error(idx, err))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_timestamp(idx, &raw))
        .transpose()
}

fn parse_priority(idx: usize, value: u8) -> rusqlite::Result<Priority> {
    Priority::new(value)
        .ok_or_else(|| conversion_error(idx, std::io::Error::other(format!("priority {value} out of range"))))
}

fn map_call(row: &Row<'_>) -> rusqlite::Result<Call> {
    let category: String = row.get(3)?;
    let priority: Option<u8> = row.get(7)?;
    let status: String = row.get(8)?;
    let destination: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;

    Ok(Call {
        id: row.get(0)?,
        number: row.get(1)?,
        caller_id: row.get(2)?,
        category: parse_column(3, &category, EmergencyCategory::from_code)?,
        operator: row.get(4)?,
        address: row.get(5)?,
        description: row.get(6)?,
        priority: priority.map(|p| parse_priority(7, p)).transpose()?,
        status: parse_column(8, &status, |s| s.parse::<CallStatus>())?,
        dispatched_unit: row.get(9)?,
        destination: destination
            .map(|tag| parse_column(10, &tag, MedicalReceiver::from_tag))
            .transpose()?,
        created_at: parse_timestamp(11, &created_at)?,
        dispatched_at: optional_timestamp(row, 12)?,
        closed_at: optional_timestamp(row, 13)?,
        closure_notes: row.get(14)?,
        notification_sent: row.get(15)?,
    })
}

fn map_caller(row: &Row<'_>) -> rusqlite::Result<Caller> {
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;
    Ok(Caller {
        id: row.get(0)?,
        document: row.get(1)?,
        given_name: row.get(2)?,
        family_name: row.get(3)?,
        phone: row.get(4)?,
        secondary_phone: row.get(5)?,
        address: crate::models::Address {
            street: row.get(6)?,
            number: row.get(7)?,
            floor: row.get(8)?,
            unit: row.get(9)?,
            neighborhood: row.get(10)?,
        },
        latitude: row.get(11)?,
        longitude: row.get(12)?,
        created_at: parse_timestamp(13, &created_at)?,
        updated_at: parse_timestamp(14, &updated_at)?,
    })
}

fn map_triage(row: &Row<'_>) -> rusqlite::Result<TriageRecord> {
    let answers: String = row.get(2)?;
    let answers: TriageAnswers =
        serde_json::from_str(&answers).map_err(|err| conversion_error(2, err))?;
    let priority: u8 = row.get(3)?;
    let created_at: String = row.get(5)?;
    Ok(TriageRecord {
        id: row.get(0)?,
        call_id: row.get(1)?,
        answers,
        evaluation: Evaluation {
            priority: parse_priority(3, priority)?,
            recommend_dispatch: row.get(4)?,
        },
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn map_audit(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let action: String = row.get(2)?;
    let details: Option<String> = row.get(5)?;
    let timestamp: String = row.get(6)?;

    let action = serde_json::from_str(&action).map_err(|err| conversion_error(2, err))?;
    let details = details
        .map(|s| serde_json::from_str(&s).map_err(|err| conversion_error(5, err)))
        .transpose()?;

    Ok(AuditEntry {
        id: row.get(0)?,
        call_id: row.get(1)?,
        action,
        operator: row.get(3)?,
        description: row.get(4)?,
        details,
        timestamp: parse_timestamp(6, &timestamp)?,
    })
}
