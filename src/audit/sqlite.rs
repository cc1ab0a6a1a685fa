//! SQLite-backed append-only audit log (`spec.md` §4.5, §6).
//!
//! Uses Write-Ahead Logging for durable, synchronous writes — every fix
//! decision is committed before the pipeline moves to the next error
//! (`spec.md` §5 cancellation safety).

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use crate::core::errors::{GeoFixError, Result};
use crate::model::{AuditEntry, ErrorKind, FixAction, FixKind, SessionSummary, Tier};

/// Append-only audit log over a SQLite database.
pub struct AuditLog {
    conn: Connection,
    path: PathBuf,
}

impl AuditLog {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| GeoFixError::io(parent, source))?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an in-memory database, useful for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one audit entry. Synchronous: the write is durable once this
    /// returns (`spec.md` §5 "Suspension points").
    pub fn insert(&self, entry: &AuditEntry) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO audit_log (
                    timestamp, session_id, feature_id, error_kind, error_id,
                    fix_kind, tier, confidence, rationale, before_wkt, after_wkt,
                    action, validation_ok, new_errors
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            )?
            .execute(params![
                entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                entry.session_id,
                entry.feature_id,
                entry.error_kind.as_str(),
                entry.error_id,
                entry.fix_kind.as_str(),
                entry.tier.as_str(),
                entry.confidence,
                entry.rationale,
                entry.before_wkt,
                entry.after_wkt,
                entry.action.as_str(),
                i32::from(entry.validation_ok),
                entry.new_errors,
            ])?;
        Ok(())
    }

    /// Query audit entries, newest first, filtered by any combination of
    /// feature, session, and error kind.
    pub fn query(
        &self,
        feature_id: Option<&str>,
        session_id: Option<&str>,
        error_kind: Option<ErrorKind>,
        limit: u32,
    ) -> Result<Vec<AuditEntry>> {
        let mut sql = String::from(
            "SELECT timestamp, session_id, feature_id, error_kind, error_id,
                    fix_kind, tier, confidence, rationale, before_wkt, after_wkt,
                    action, validation_ok, new_errors
             FROM audit_log WHERE 1=1",
        );
        if feature_id.is_some() {
            sql.push_str(" AND feature_id = ?");
        }
        if session_id.is_some() {
            sql.push_str(" AND session_id = ?");
        }
        if error_kind.is_some() {
            sql.push_str(" AND error_kind = ?");
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut idx = 1;
        if let Some(v) = feature_id {
            stmt.raw_bind_parameter(idx, v)?;
            idx += 1;
        }
        if let Some(v) = session_id {
            stmt.raw_bind_parameter(idx, v)?;
            idx += 1;
        }
        if let Some(v) = error_kind {
            stmt.raw_bind_parameter(idx, v.as_str())?;
            idx += 1;
        }
        stmt.raw_bind_parameter(idx, limit)?;

        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_entry(row)?);
        }
        Ok(out)
    }

    /// Aggregate counts for a session (`spec.md` §4.5 `SessionSummary`).
    pub fn session_summary(&self, session_id: &str) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT action, COUNT(*) FROM audit_log WHERE session_id = ?1 GROUP BY action")?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (action, count) = row?;
            summary.total += count;
            match action.as_str() {
                "applied" => summary.applied = count,
                "rolled_back" => summary.rolled_back = count,
                "skipped" => summary.skipped = count,
                "pending_review" => summary.pending_review = count,
                _ => {}
            }
        }
        Ok(summary)
    }

    /// Total number of audit rows, optionally scoped to a session.
    pub fn count(&self, session_id: Option<&str>) -> Result<i64> {
        let count = session_id.map_or_else(
            || self.conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0)),
            |id| {
                self.conn.query_row(
                    "SELECT COUNT(*) FROM audit_log WHERE session_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
            },
        )?;
        Ok(count)
    }

    /// Check that WAL mode is active (for diagnostics).
    #[must_use]
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let timestamp_str: String = row.get(0)?;
    let error_kind_str: String = row.get(3)?;
    let fix_kind_str: String = row.get(5)?;
    let tier_str: String = row.get(6)?;
    let action_str: String = row.get(11)?;
    let validation_ok: i32 = row.get(12)?;

    Ok(AuditEntry {
        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        session_id: row.get(1)?,
        feature_id: row.get(2)?,
        error_kind: parse_error_kind(&error_kind_str),
        error_id: row.get(4)?,
        fix_kind: parse_fix_kind(&fix_kind_str),
        tier: parse_tier(&tier_str),
        confidence: row.get(7)?,
        rationale: row.get(8)?,
        before_wkt: row.get(9)?,
        after_wkt: row.get(10)?,
        action: parse_action(&action_str),
        validation_ok: validation_ok != 0,
        new_errors: row.get(13)?,
    })
}

fn parse_error_kind(s: &str) -> ErrorKind {
    match s {
        "empty_geometry" => ErrorKind::EmptyGeometry,
        "duplicate_geometry" => ErrorKind::DuplicateGeometry,
        "building_overlap" => ErrorKind::BuildingOverlap,
        "building_on_road" => ErrorKind::BuildingOnRoad,
        "building_boundary_overlap" => ErrorKind::BuildingBoundaryOverlap,
        "outside_boundary" => ErrorKind::OutsideBoundary,
        "unreasonable_area" => ErrorKind::UnreasonableArea,
        "low_compactness" => ErrorKind::LowCompactness,
        "road_setback" => ErrorKind::RoadSetback,
        _ => ErrorKind::InvalidGeometry,
    }
}

fn parse_fix_kind(s: &str) -> FixKind {
    match s {
        "simplify" => FixKind::Simplify,
        "delete" => FixKind::Delete,
        "trim" => FixKind::Trim,
        "merge" => FixKind::Merge,
        "snap" => FixKind::Snap,
        "clip" => FixKind::Clip,
        "nudge" => FixKind::Nudge,
        "flag" => FixKind::Flag,
        "human_review" => FixKind::HumanReview,
        _ => FixKind::MakeValid,
    }
}

fn parse_tier(s: &str) -> Tier {
    match s {
        "oracle" => Tier::Oracle,
        "human" => Tier::Human,
        _ => Tier::Rule,
    }
}

fn parse_action(s: &str) -> FixAction {
    match s {
        "rolled_back" => FixAction::RolledBack,
        "skipped" => FixAction::Skipped,
        "pending_review" => FixAction::PendingReview,
        _ => FixAction::Applied,
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") && !mode.eq_ignore_ascii_case("memory") {
        eprintln!("[GFX-AUDIT] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            session_id TEXT NOT NULL,
            feature_id TEXT NOT NULL,
            error_kind TEXT NOT NULL,
            error_id TEXT NOT NULL,
            fix_kind TEXT NOT NULL,
            tier TEXT NOT NULL,
            confidence REAL NOT NULL,
            rationale TEXT NOT NULL,
            before_wkt TEXT NOT NULL,
            after_wkt TEXT,
            action TEXT NOT NULL,
            validation_ok INTEGER NOT NULL,
            new_errors INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_log(session_id);
        CREATE INDEX IF NOT EXISTS idx_audit_feature ON audit_log(feature_id);
        CREATE INDEX IF NOT EXISTS idx_audit_error_kind ON audit_log(error_kind);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_entry(session_id: &str, action: FixAction) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            feature_id: "f1".to_string(),
            error_kind: ErrorKind::InvalidGeometry,
            error_id: "err-000000".to_string(),
            fix_kind: FixKind::MakeValid,
            tier: Tier::Rule,
            confidence: 0.95,
            rationale: "self-intersecting ring".to_string(),
            before_wkt: "POLYGON((0 0,10 10,10 0,0 10,0 0))".to_string(),
            after_wkt: Some("POLYGON((0 0,10 0,10 10,0 0))".to_string()),
            action,
            validation_ok: true,
            new_errors: 0,
        }
    }

    #[test]
    fn schema_created_and_wal_active_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(&dir.path().join("audit.db")).unwrap();
        assert!(log.is_wal_mode());
    }

    #[test]
    fn insert_and_query_roundtrip() {
        let log = AuditLog::open_in_memory().unwrap();
        log.insert(&sample_entry("s1", FixAction::Applied)).unwrap();
        let rows = log.query(None, Some("s1"), None, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].feature_id, "f1");
        assert_eq!(rows[0].fix_kind, FixKind::MakeValid);
        assert_eq!(rows[0].action, FixAction::Applied);
    }

    #[test]
    fn session_summary_counts_by_action() {
        let log = AuditLog::open_in_memory().unwrap();
        log.insert(&sample_entry("s1", FixAction::Applied)).unwrap();
        log.insert(&sample_entry("s1", FixAction::RolledBack)).unwrap();
        log.insert(&sample_entry("s1", FixAction::PendingReview)).unwrap();
        let summary = log.session_summary("s1").unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.rolled_back, 1);
        assert_eq!(summary.pending_review, 1);
    }

    #[test]
    fn query_filters_by_feature() {
        let log = AuditLog::open_in_memory().unwrap();
        log.insert(&sample_entry("s1", FixAction::Applied)).unwrap();
        let mut other = sample_entry("s1", FixAction::Applied);
        other.feature_id = "f2".to_string();
        log.insert(&other).unwrap();
        let rows = log.query(Some("f2"), None, None, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].feature_id, "f2");
    }
}
