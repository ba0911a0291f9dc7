use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{
    ApiTest, ApiTestResult, AttributeFilter, QualityGateReport, ReportParameters, ReportStatus,
};
use crate::coverage::Coverage;

pub const REPORT_DB_FILENAME: &str = "quality-gate-reports.db";

/// SQLite store for report aggregates. Every write replaces the whole
/// aggregate of one calculation id.
pub struct ReportDb {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl ReportDb {
    pub fn new(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {:?}", data_dir))?;
        let db_path = data_dir.join(REPORT_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS quality_gate_reports (
                calculation_id TEXT PRIMARY KEY,
                config_name TEXT NOT NULL,
                lookback_secs INTEGER NOT NULL,
                attribute_filters TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS api_tests (
                id TEXT PRIMARY KEY,
                calculation_id TEXT NOT NULL REFERENCES quality_gate_reports(calculation_id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                service_name TEXT NOT NULL,
                api_name TEXT NOT NULL,
                api_version TEXT
            );

            CREATE TABLE IF NOT EXISTS api_test_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                api_test_id TEXT NOT NULL REFERENCES api_tests(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                criterion TEXT NOT NULL,
                coverage_hundredths INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                diagnostic TEXT,
                included_in_report INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reports_status ON quality_gate_reports(status);
            CREATE INDEX IF NOT EXISTS idx_reports_updated ON quality_gate_reports(updated_at);
            CREATE INDEX IF NOT EXISTS idx_api_tests_calc ON api_tests(calculation_id);
            CREATE INDEX IF NOT EXISTS idx_results_api_test ON api_test_results(api_test_id);
        ",
        )?;
        Ok(())
    }

    // ========================================================================
    // Aggregate writes
    // ========================================================================

    /// Whole-aggregate upsert.
    pub fn save_report(&self, report: &QualityGateReport) -> anyhow::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_report(&tx, report)?;
        tx.commit()?;
        Ok(())
    }

    /// Read-modify-write of one aggregate under the connection lock and an
    /// immediate transaction, so two updates to the same report never
    /// interleave within this process.
    ///
    /// Returns `Ok(None)` when the report does not exist. When `apply` fails
    /// nothing is written and its error is handed back inside `Some(Err(..))`.
    pub fn update_report<T, E, F>(&self, calculation_id: Uuid, apply: F) -> anyhow::Result<Option<Result<T, E>>>
    where
        F: FnOnce(&mut QualityGateReport) -> Result<T, E>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(mut report) = load_report(&tx, calculation_id)? else {
            return Ok(None);
        };

        report.updated_at = Utc::now();
        match apply(&mut report) {
            Ok(value) => {
                write_report(&tx, &report)?;
                tx.commit()?;
                Ok(Some(Ok(value)))
            }
            Err(e) => Ok(Some(Err(e))),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_report(&self, calculation_id: Uuid) -> anyhow::Result<Option<QualityGateReport>> {
        let conn = self.conn();
        load_report(&conn, calculation_id)
    }

    /// Reports still NOT_STARTED or IN_PROGRESS whose last update is older
    /// than `cutoff`, oldest first.
    pub fn list_unfinished_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<QualityGateReport>> {
        let conn = self.conn();
        let ids: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT calculation_id FROM quality_gate_reports
                 WHERE status IN ('NOT_STARTED', 'IN_PROGRESS') AND updated_at < ?1
                 ORDER BY updated_at",
            )?;
            let rows = stmt.query_map(params![format_ts(&cutoff)], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            let id = Uuid::parse_str(&id)?;
            if let Some(report) = load_report(&conn, id)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    pub fn count_reports(&self) -> anyhow::Result<i64> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM quality_gate_reports", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn write_report(conn: &Connection, report: &QualityGateReport) -> anyhow::Result<()> {
    let calculation_id = report.calculation_id.to_string();
    conn.execute(
        "INSERT INTO quality_gate_reports (calculation_id, config_name, lookback_secs, attribute_filters, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(calculation_id) DO UPDATE SET
            config_name=excluded.config_name,
            lookback_secs=excluded.lookback_secs,
            attribute_filters=excluded.attribute_filters,
            status=excluded.status,
            updated_at=excluded.updated_at",
        params![
            calculation_id,
            report.quality_gate_config_name,
            report.parameters.lookback_secs as i64,
            serde_json::to_string(&report.parameters.attribute_filters)?,
            report.report_status.as_str(),
            format_ts(&report.created_at),
            format_ts(&report.updated_at),
        ],
    )?;

    // Children are rewritten wholesale; results cascade with their api test.
    conn.execute(
        "DELETE FROM api_tests WHERE calculation_id=?1",
        params![calculation_id],
    )?;

    let mut test_stmt = conn.prepare(
        "INSERT INTO api_tests (id, calculation_id, position, service_name, api_name, api_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut result_stmt = conn.prepare(
        "INSERT INTO api_test_results (api_test_id, position, criterion, coverage_hundredths, duration_ms, diagnostic, included_in_report, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    for (position, test) in report.api_tests.iter().enumerate() {
        let test_id = test.id.to_string();
        test_stmt.execute(params![
            test_id,
            calculation_id,
            position as i64,
            test.service_name,
            test.api_name,
            test.api_version,
        ])?;
        for (result_position, result) in test.results.iter().enumerate() {
            result_stmt.execute(params![
                test_id,
                result_position as i64,
                result.criterion.as_str(),
                i64::from(result.coverage.hundredths()),
                result.duration_ms as i64,
                result.diagnostic,
                result.included_in_report as i64,
                format_ts(&result.recorded_at),
            ])?;
        }
    }
    Ok(())
}

fn load_report(conn: &Connection, calculation_id: Uuid) -> anyhow::Result<Option<QualityGateReport>> {
    let id = calculation_id.to_string();
    let row = conn
        .query_row(
            "SELECT config_name, lookback_secs, attribute_filters, status, created_at, updated_at
             FROM quality_gate_reports WHERE calculation_id=?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((config_name, lookback_secs, filters, status, created_at, updated_at)) = row else {
        return Ok(None);
    };

    let attribute_filters: Vec<AttributeFilter> = serde_json::from_str(&filters)?;
    let report_status: ReportStatus = status.parse().map_err(anyhow::Error::msg)?;

    Ok(Some(QualityGateReport {
        calculation_id,
        quality_gate_config_name: config_name,
        parameters: ReportParameters {
            lookback_secs: lookback_secs.max(0) as u64,
            attribute_filters,
        },
        api_tests: load_api_tests(conn, &id)?,
        report_status,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    }))
}

fn load_api_tests(conn: &Connection, calculation_id: &str) -> anyhow::Result<Vec<ApiTest>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_name, api_name, api_version
         FROM api_tests WHERE calculation_id=?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![calculation_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;

    let mut tests = Vec::with_capacity(rows.len());
    for (id, service_name, api_name, api_version) in rows {
        let results = load_results(conn, &id)?;
        tests.push(ApiTest {
            id: Uuid::parse_str(&id)?,
            service_name,
            api_name,
            api_version,
            results,
        });
    }
    Ok(tests)
}

fn load_results(conn: &Connection, api_test_id: &str) -> anyhow::Result<Vec<ApiTestResult>> {
    let mut stmt = conn.prepare(
        "SELECT criterion, coverage_hundredths, duration_ms, diagnostic, included_in_report, recorded_at
         FROM api_test_results WHERE api_test_id=?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![api_test_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, i64>(4)? != 0,
            row.get::<_, String>(5)?,
        ))
    })?;
    let rows = rows.collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(criterion, hundredths, duration_ms, diagnostic, included_in_report, recorded_at)| {
                Ok(ApiTestResult {
                    criterion: criterion.parse().map_err(anyhow::Error::msg)?,
                    coverage: Coverage::from_hundredths(hundredths.clamp(0, 100) as u16),
                    duration_ms: duration_ms.max(0) as u64,
                    diagnostic,
                    included_in_report,
                    recorded_at: parse_ts(&recorded_at)?,
                })
            },
        )
        .collect()
}
