use rusqlite::Connection;
use std::fs;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::EngineResult;

/// Lock wait bound for concurrent writers on the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection to the configured SQLite file, creating the parent
/// directory when needed. Connections are short-lived: one per request.
pub fn open_connection(cfg: &AppConfig) -> EngineResult<Connection> {
    if let Some(dir) = cfg.db_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(&cfg.db_path)?;
    configure(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema, used by tests and dry runs.
pub fn open_in_memory() -> EngineResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> EngineResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

/// Create every table and index if missing.
pub fn init_schema(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS faculties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS programs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            faculty_id INTEGER NOT NULL REFERENCES faculties(id),
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            program_id INTEGER NOT NULL REFERENCES programs(id),
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (program_id, code)
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            program_id INTEGER REFERENCES programs(id)
        );

        CREATE TABLE IF NOT EXISTS teaching_assignments (
            user_id INTEGER NOT NULL REFERENCES users(id),
            course_id INTEGER NOT NULL REFERENCES courses(id),
            PRIMARY KEY (user_id, course_id)
        );

        CREATE TABLE IF NOT EXISTS outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            program_id INTEGER NOT NULL REFERENCES programs(id),
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT,
            target REAL NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ux_outcomes_code
            ON outcomes(program_id, code) WHERE is_active = 1;

        CREATE TABLE IF NOT EXISTS course_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            taxonomy_json TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ux_course_outcomes_code
            ON course_outcomes(course_id, code) WHERE is_active = 1;

        CREATE TABLE IF NOT EXISTS outcome_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_outcome_id INTEGER NOT NULL REFERENCES course_outcomes(id),
            outcome_id INTEGER NOT NULL REFERENCES outcomes(id),
            weight REAL NOT NULL,
            UNIQUE (course_outcome_id, outcome_id)
        );

        CREATE TABLE IF NOT EXISTS assessment_techniques (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_outcome_id INTEGER NOT NULL REFERENCES course_outcomes(id),
            name TEXT NOT NULL,
            reference_type TEXT,
            weight REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sub_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_outcome_id INTEGER NOT NULL REFERENCES course_outcomes(id),
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            weight REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sub_outcome_assessments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sub_outcome_id INTEGER NOT NULL REFERENCES sub_outcomes(id) ON DELETE CASCADE,
            technique_id INTEGER NOT NULL REFERENCES assessment_techniques(id) ON DELETE CASCADE,
            weight REAL NOT NULL,
            UNIQUE (sub_outcome_id, technique_id)
        );

        CREATE TABLE IF NOT EXISTS graduate_profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            program_id INTEGER NOT NULL REFERENCES programs(id),
            curriculum TEXT,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            target REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS profile_outcomes (
            profile_id INTEGER NOT NULL REFERENCES graduate_profiles(id),
            outcome_id INTEGER NOT NULL REFERENCES outcomes(id),
            PRIMARY KEY (profile_id, outcome_id)
        );

        CREATE TABLE IF NOT EXISTS grade_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES users(id),
            course_outcome_id INTEGER NOT NULL REFERENCES course_outcomes(id),
            score REAL NOT NULL,
            period TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_grade_records_cpmk ON grade_records(course_outcome_id);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sub_outcome_assessments'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }
}
