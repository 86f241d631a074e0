//! Write-side statements. Callers own the transaction; nothing here
//! validates business rules.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{EngineResult, LinkKind};
use crate::models::{NewCourse, NewFaculty, NewProgram, NewUser};

fn now() -> String {
    Utc::now().to_rfc3339()
}

pub fn insert_faculty(conn: &Connection, f: &NewFaculty) -> EngineResult<i64> {
    conn.execute("INSERT INTO faculties (code, name) VALUES (?1, ?2)", params![f.code.trim(), f.name.trim()])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_program(conn: &Connection, p: &NewProgram) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO programs (faculty_id, code, name) VALUES (?1, ?2, ?3)",
        params![p.faculty_id, p.code.trim(), p.name.trim()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_course(conn: &Connection, c: &NewCourse) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO courses (program_id, code, name) VALUES (?1, ?2, ?3)",
        params![c.program_id, c.code.trim(), c.name.trim()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_user(conn: &Connection, u: &NewUser) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO users (name, role, program_id) VALUES (?1, ?2, ?3)",
        params![u.name.trim(), u.role.as_str(), u.program_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record a pengampu relation. Re-assigning is a no-op.
pub fn assign_lecturer(conn: &Connection, user_id: i64, course_id: i64) -> EngineResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO teaching_assignments (user_id, course_id) VALUES (?1, ?2)",
        params![user_id, course_id],
    )?;
    Ok(())
}

// --- CPL ---

pub fn insert_outcome(
    conn: &Connection,
    program_id: i64,
    code: &str,
    description: &str,
    category: Option<&str>,
    target: f64,
) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO outcomes (program_id, code, description, category, target, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![program_id, code.trim(), description.trim(), category, target, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_outcome_row(
    conn: &Connection,
    id: i64,
    code: &str,
    description: &str,
    category: Option<&str>,
    target: f64,
) -> EngineResult<()> {
    conn.execute(
        "UPDATE outcomes SET code = ?2, description = ?3, category = ?4, target = ?5 WHERE id = ?1",
        params![id, code.trim(), description.trim(), category, target],
    )?;
    Ok(())
}

/// Deactivate a CPL and drop the links that pointed at it.
pub fn soft_delete_outcome(conn: &Connection, id: i64) -> EngineResult<usize> {
    let links = conn.execute("DELETE FROM outcome_mappings WHERE outcome_id = ?1", params![id])?;
    conn.execute("DELETE FROM profile_outcomes WHERE outcome_id = ?1", params![id])?;
    conn.execute("UPDATE outcomes SET is_active = 0 WHERE id = ?1", params![id])?;
    Ok(links)
}

// --- CPMK ---

pub fn insert_course_outcome(
    conn: &Connection,
    course_id: i64,
    code: &str,
    description: &str,
    taxonomy_levels: &[String],
) -> EngineResult<i64> {
    let taxonomy_json = serde_json::to_string(taxonomy_levels)?;
    conn.execute(
        "INSERT INTO course_outcomes (course_id, code, description, taxonomy_json, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![course_id, code.trim(), description.trim(), taxonomy_json, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_course_outcome_row(
    conn: &Connection,
    id: i64,
    code: &str,
    description: &str,
    taxonomy_levels: &[String],
) -> EngineResult<()> {
    let taxonomy_json = serde_json::to_string(taxonomy_levels)?;
    conn.execute(
        "UPDATE course_outcomes SET code = ?2, description = ?3, taxonomy_json = ?4 WHERE id = ?1",
        params![id, code.trim(), description.trim(), taxonomy_json],
    )?;
    Ok(())
}

/// Deactivate a CPMK together with everything weighted underneath it.
pub fn soft_delete_course_outcome(conn: &Connection, id: i64) -> EngineResult<()> {
    conn.execute(
        "DELETE FROM sub_outcome_assessments
         WHERE sub_outcome_id IN (SELECT id FROM sub_outcomes WHERE course_outcome_id = ?1)",
        params![id],
    )?;
    conn.execute("DELETE FROM sub_outcomes WHERE course_outcome_id = ?1", params![id])?;
    conn.execute("DELETE FROM assessment_techniques WHERE course_outcome_id = ?1", params![id])?;
    conn.execute("DELETE FROM outcome_mappings WHERE course_outcome_id = ?1", params![id])?;
    conn.execute("UPDATE course_outcomes SET is_active = 0 WHERE id = ?1", params![id])?;
    Ok(())
}

// --- Weighted links ---

pub fn insert_outcome_mapping(conn: &Connection, course_outcome_id: i64, outcome_id: i64, weight: f64) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO outcome_mappings (course_outcome_id, outcome_id, weight) VALUES (?1, ?2, ?3)",
        params![course_outcome_id, outcome_id, weight],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_technique(
    conn: &Connection,
    course_outcome_id: i64,
    name: &str,
    reference_type: Option<&str>,
    weight: f64,
) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO assessment_techniques (course_outcome_id, name, reference_type, weight) VALUES (?1, ?2, ?3, ?4)",
        params![course_outcome_id, name.trim(), reference_type, weight],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_sub_outcome(conn: &Connection, course_outcome_id: i64, code: &str, description: &str, weight: f64) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO sub_outcomes (course_outcome_id, code, description, weight) VALUES (?1, ?2, ?3, ?4)",
        params![course_outcome_id, code.trim(), description.trim(), weight],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_sub_assessment(conn: &Connection, sub_outcome_id: i64, technique_id: i64, weight: f64) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO sub_outcome_assessments (sub_outcome_id, technique_id, weight) VALUES (?1, ?2, ?3)",
        params![sub_outcome_id, technique_id, weight],
    )?;
    Ok(conn.last_insert_rowid())
}

fn link_table(kind: LinkKind) -> &'static str {
    match kind {
        LinkKind::CplMapping => "outcome_mappings",
        LinkKind::Technique => "assessment_techniques",
        LinkKind::SubCpmk => "sub_outcomes",
        LinkKind::SubCpmkTechnique => "sub_outcome_assessments",
    }
}

pub fn update_link_weight(conn: &Connection, kind: LinkKind, id: i64, weight: f64) -> EngineResult<usize> {
    let sql = format!("UPDATE {} SET weight = ?2 WHERE id = ?1", link_table(kind));
    Ok(conn.execute(&sql, params![id, weight])?)
}

pub fn update_technique_row(conn: &Connection, id: i64, name: &str, reference_type: Option<&str>, weight: f64) -> EngineResult<()> {
    conn.execute(
        "UPDATE assessment_techniques SET name = ?2, reference_type = ?3, weight = ?4 WHERE id = ?1",
        params![id, name.trim(), reference_type, weight],
    )?;
    Ok(())
}

pub fn update_sub_outcome_row(conn: &Connection, id: i64, code: &str, description: &str, weight: f64) -> EngineResult<()> {
    conn.execute(
        "UPDATE sub_outcomes SET code = ?2, description = ?3, weight = ?4 WHERE id = ?1",
        params![id, code.trim(), description.trim(), weight],
    )?;
    Ok(())
}

/// Hard-delete one link row; Sub-CPMK mappings hanging off a deleted
/// technique or Sub-CPMK go with it.
pub fn delete_link(conn: &Connection, kind: LinkKind, id: i64) -> EngineResult<usize> {
    match kind {
        LinkKind::Technique => {
            conn.execute("DELETE FROM sub_outcome_assessments WHERE technique_id = ?1", params![id])?;
        }
        LinkKind::SubCpmk => {
            conn.execute("DELETE FROM sub_outcome_assessments WHERE sub_outcome_id = ?1", params![id])?;
        }
        _ => {}
    }
    let sql = format!("DELETE FROM {} WHERE id = ?1", link_table(kind));
    Ok(conn.execute(&sql, params![id])?)
}

pub fn delete_technique_assessments(conn: &Connection, technique_id: i64) -> EngineResult<usize> {
    Ok(conn.execute("DELETE FROM sub_outcome_assessments WHERE technique_id = ?1", params![technique_id])?)
}

// --- Nilai ---

pub fn insert_grade(conn: &Connection, student_id: i64, course_outcome_id: i64, score: f64, period: &str) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO grade_records (student_id, course_outcome_id, score, period, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![student_id, course_outcome_id, score, period.trim(), now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_grade(conn: &Connection, id: i64) -> EngineResult<usize> {
    Ok(conn.execute("DELETE FROM grade_records WHERE id = ?1", params![id])?)
}

// --- Profil lulusan ---

pub fn insert_profile(
    conn: &Connection,
    program_id: i64,
    curriculum: Option<&str>,
    code: &str,
    name: &str,
    target: f64,
    outcome_ids: &[i64],
) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO graduate_profiles (program_id, curriculum, code, name, target) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![program_id, curriculum, code.trim(), name.trim(), target],
    )?;
    let id = conn.last_insert_rowid();
    for oid in outcome_ids {
        conn.execute(
            "INSERT OR IGNORE INTO profile_outcomes (profile_id, outcome_id) VALUES (?1, ?2)",
            params![id, oid],
        )?;
    }
    Ok(id)
}
