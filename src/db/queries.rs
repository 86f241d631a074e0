//! Read-side queries. Every function takes a borrowed connection so it can
//! run either on a plain `Connection` or inside a `Transaction`.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;

use crate::error::EngineResult;
use crate::models::{
    AssessmentTechnique, Course, CourseOutcome, GradeRecord, GraduateProfile, Outcome,
    OutcomeMapping, Program, Role, SubOutcome, SubOutcomeAssessmentMapping, User,
};

fn program_from_row(row: &Row) -> rusqlite::Result<Program> {
    Ok(Program { id: row.get(0)?, faculty_id: row.get(1)?, code: row.get(2)?, name: row.get(3)? })
}

fn course_from_row(row: &Row) -> rusqlite::Result<Course> {
    Ok(Course { id: row.get(0)?, program_id: row.get(1)?, code: row.get(2)?, name: row.get(3)? })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let role_raw: String = row.get(2)?;
    let role = Role::parse(&role_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, format!("unknown role '{}'", role_raw).into())
    })?;
    Ok(User { id: row.get(0)?, name: row.get(1)?, role, program_id: row.get(3)? })
}

fn outcome_from_row(row: &Row) -> rusqlite::Result<Outcome> {
    Ok(Outcome {
        id: row.get(0)?,
        program_id: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        target: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
    })
}

fn course_outcome_from_row(row: &Row) -> rusqlite::Result<CourseOutcome> {
    let taxonomy_json: String = row.get(4)?;
    let taxonomy_levels: Vec<String> = serde_json::from_str(&taxonomy_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(CourseOutcome {
        id: row.get(0)?,
        course_id: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        taxonomy_levels,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

fn mapping_from_row(row: &Row) -> rusqlite::Result<OutcomeMapping> {
    Ok(OutcomeMapping {
        id: row.get(0)?,
        course_outcome_id: row.get(1)?,
        outcome_id: row.get(2)?,
        weight: row.get(3)?,
    })
}

fn technique_from_row(row: &Row) -> rusqlite::Result<AssessmentTechnique> {
    Ok(AssessmentTechnique {
        id: row.get(0)?,
        course_outcome_id: row.get(1)?,
        name: row.get(2)?,
        reference_type: row.get(3)?,
        weight: row.get(4)?,
    })
}

fn sub_outcome_from_row(row: &Row) -> rusqlite::Result<SubOutcome> {
    Ok(SubOutcome {
        id: row.get(0)?,
        course_outcome_id: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        weight: row.get(4)?,
    })
}

fn sub_assessment_from_row(row: &Row) -> rusqlite::Result<SubOutcomeAssessmentMapping> {
    Ok(SubOutcomeAssessmentMapping {
        id: row.get(0)?,
        sub_outcome_id: row.get(1)?,
        technique_id: row.get(2)?,
        weight: row.get(3)?,
    })
}

const OUTCOME_COLS: &str = "id, program_id, code, description, category, target, is_active";
const COURSE_OUTCOME_COLS: &str = "id, course_id, code, description, taxonomy_json, is_active";

// --- Programs, courses, users ---

pub fn get_program(conn: &Connection, id: i64) -> EngineResult<Option<Program>> {
    Ok(conn
        .query_row("SELECT id, faculty_id, code, name FROM programs WHERE id = ?1", params![id], program_from_row)
        .optional()?)
}

pub fn faculty_exists(conn: &Connection, id: i64) -> EngineResult<bool> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM faculties WHERE id = ?1", params![id], |r| r.get(0))?;
    Ok(n > 0)
}

pub fn get_course(conn: &Connection, id: i64) -> EngineResult<Option<Course>> {
    Ok(conn
        .query_row("SELECT id, program_id, code, name FROM courses WHERE id = ?1", params![id], course_from_row)
        .optional()?)
}

/// Course lookup by code within one program. Codes are only unique per
/// program, so there is no cross-program form.
pub fn find_course_by_code(conn: &Connection, program_id: i64, code: &str) -> EngineResult<Option<Course>> {
    Ok(conn
        .query_row(
            "SELECT id, program_id, code, name FROM courses
             WHERE program_id = ?1 AND UPPER(code) = UPPER(?2)",
            params![program_id, code.trim()],
            course_from_row,
        )
        .optional()?)
}

pub fn get_user(conn: &Connection, id: i64) -> EngineResult<Option<User>> {
    Ok(conn
        .query_row("SELECT id, name, role, program_id FROM users WHERE id = ?1", params![id], user_from_row)
        .optional()?)
}

/// Courses a dosen is pengampu of.
pub fn taught_course_ids(conn: &Connection, user_id: i64) -> EngineResult<HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT course_id FROM teaching_assignments WHERE user_id = ?1")?;
    let rows = stmt.query_map(params![user_id], |r| r.get::<_, i64>(0))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

// --- CPL ---

pub fn get_outcome(conn: &Connection, id: i64) -> EngineResult<Option<Outcome>> {
    let sql = format!("SELECT {} FROM outcomes WHERE id = ?1", OUTCOME_COLS);
    Ok(conn.query_row(&sql, params![id], outcome_from_row).optional()?)
}

pub fn find_outcome_by_code(conn: &Connection, program_id: i64, code: &str) -> EngineResult<Option<Outcome>> {
    let sql = format!(
        "SELECT {} FROM outcomes WHERE program_id = ?1 AND UPPER(code) = UPPER(?2) AND is_active = 1",
        OUTCOME_COLS
    );
    Ok(conn.query_row(&sql, params![program_id, code.trim()], outcome_from_row).optional()?)
}

pub fn list_outcomes(conn: &Connection, program_id: i64) -> EngineResult<Vec<Outcome>> {
    let sql = format!("SELECT {} FROM outcomes WHERE program_id = ?1 AND is_active = 1 ORDER BY id", OUTCOME_COLS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![program_id], outcome_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// --- CPMK ---

pub fn get_course_outcome(conn: &Connection, id: i64) -> EngineResult<Option<CourseOutcome>> {
    let sql = format!("SELECT {} FROM course_outcomes WHERE id = ?1", COURSE_OUTCOME_COLS);
    Ok(conn.query_row(&sql, params![id], course_outcome_from_row).optional()?)
}

pub fn find_course_outcome_by_code(conn: &Connection, course_id: i64, code: &str) -> EngineResult<Option<CourseOutcome>> {
    let sql = format!(
        "SELECT {} FROM course_outcomes WHERE course_id = ?1 AND UPPER(code) = UPPER(?2) AND is_active = 1",
        COURSE_OUTCOME_COLS
    );
    Ok(conn.query_row(&sql, params![course_id, code.trim()], course_outcome_from_row).optional()?)
}

pub fn list_course_outcomes(conn: &Connection, course_id: i64) -> EngineResult<Vec<CourseOutcome>> {
    let sql = format!(
        "SELECT {} FROM course_outcomes WHERE course_id = ?1 AND is_active = 1 ORDER BY id",
        COURSE_OUTCOME_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![course_id], course_outcome_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// (course_id, program_id) owning a CPMK.
pub fn course_outcome_owner(conn: &Connection, course_outcome_id: i64) -> EngineResult<Option<(i64, i64)>> {
    Ok(conn
        .query_row(
            "SELECT c.id, c.program_id FROM course_outcomes co
             JOIN courses c ON c.id = co.course_id
             WHERE co.id = ?1",
            params![course_outcome_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?)
}

// --- Weighted links ---

pub fn get_outcome_mapping(conn: &Connection, id: i64) -> EngineResult<Option<OutcomeMapping>> {
    Ok(conn
        .query_row(
            "SELECT id, course_outcome_id, outcome_id, weight FROM outcome_mappings WHERE id = ?1",
            params![id],
            mapping_from_row,
        )
        .optional()?)
}

pub fn find_outcome_mapping(conn: &Connection, course_outcome_id: i64, outcome_id: i64) -> EngineResult<Option<OutcomeMapping>> {
    Ok(conn
        .query_row(
            "SELECT id, course_outcome_id, outcome_id, weight FROM outcome_mappings
             WHERE course_outcome_id = ?1 AND outcome_id = ?2",
            params![course_outcome_id, outcome_id],
            mapping_from_row,
        )
        .optional()?)
}

pub fn list_outcome_mappings(conn: &Connection, course_outcome_id: i64) -> EngineResult<Vec<OutcomeMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_outcome_id, outcome_id, weight FROM outcome_mappings
         WHERE course_outcome_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![course_outcome_id], mapping_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn get_technique(conn: &Connection, id: i64) -> EngineResult<Option<AssessmentTechnique>> {
    Ok(conn
        .query_row(
            "SELECT id, course_outcome_id, name, reference_type, weight FROM assessment_techniques WHERE id = ?1",
            params![id],
            technique_from_row,
        )
        .optional()?)
}

pub fn find_technique_by_name(conn: &Connection, course_outcome_id: i64, name: &str) -> EngineResult<Option<AssessmentTechnique>> {
    Ok(conn
        .query_row(
            "SELECT id, course_outcome_id, name, reference_type, weight FROM assessment_techniques
             WHERE course_outcome_id = ?1 AND LOWER(TRIM(name)) = LOWER(TRIM(?2))",
            params![course_outcome_id, name],
            technique_from_row,
        )
        .optional()?)
}

pub fn list_techniques(conn: &Connection, course_outcome_id: i64) -> EngineResult<Vec<AssessmentTechnique>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_outcome_id, name, reference_type, weight FROM assessment_techniques
         WHERE course_outcome_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![course_outcome_id], technique_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn get_sub_outcome(conn: &Connection, id: i64) -> EngineResult<Option<SubOutcome>> {
    Ok(conn
        .query_row(
            "SELECT id, course_outcome_id, code, description, weight FROM sub_outcomes WHERE id = ?1",
            params![id],
            sub_outcome_from_row,
        )
        .optional()?)
}

pub fn find_sub_outcome_by_code(conn: &Connection, course_outcome_id: i64, code: &str) -> EngineResult<Option<SubOutcome>> {
    Ok(conn
        .query_row(
            "SELECT id, course_outcome_id, code, description, weight FROM sub_outcomes
             WHERE course_outcome_id = ?1 AND UPPER(TRIM(code)) = UPPER(TRIM(?2))",
            params![course_outcome_id, code],
            sub_outcome_from_row,
        )
        .optional()?)
}

pub fn list_sub_outcomes(conn: &Connection, course_outcome_id: i64) -> EngineResult<Vec<SubOutcome>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_outcome_id, code, description, weight FROM sub_outcomes
         WHERE course_outcome_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![course_outcome_id], sub_outcome_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn get_sub_assessment(conn: &Connection, id: i64) -> EngineResult<Option<SubOutcomeAssessmentMapping>> {
    Ok(conn
        .query_row(
            "SELECT id, sub_outcome_id, technique_id, weight FROM sub_outcome_assessments WHERE id = ?1",
            params![id],
            sub_assessment_from_row,
        )
        .optional()?)
}

pub fn find_sub_assessment(conn: &Connection, sub_outcome_id: i64, technique_id: i64) -> EngineResult<Option<SubOutcomeAssessmentMapping>> {
    Ok(conn
        .query_row(
            "SELECT id, sub_outcome_id, technique_id, weight FROM sub_outcome_assessments
             WHERE sub_outcome_id = ?1 AND technique_id = ?2",
            params![sub_outcome_id, technique_id],
            sub_assessment_from_row,
        )
        .optional()?)
}

pub fn count_technique_assessments(conn: &Connection, technique_id: i64) -> EngineResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM sub_outcome_assessments WHERE technique_id = ?1",
        params![technique_id],
        |r| r.get(0),
    )?)
}

// --- Nilai ---

/// Grade records that reference a CPMK directly.
pub fn count_course_outcome_grades(conn: &Connection, course_outcome_id: i64) -> EngineResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM grade_records WHERE course_outcome_id = ?1",
        params![course_outcome_id],
        |r| r.get(0),
    )?)
}

/// Grade records that feed a CPL through any of its CPMK mappings.
pub fn count_outcome_grades(conn: &Connection, outcome_id: i64) -> EngineResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM grade_records g
         JOIN outcome_mappings m ON m.course_outcome_id = g.course_outcome_id
         WHERE m.outcome_id = ?1",
        params![outcome_id],
        |r| r.get(0),
    )?)
}

pub fn get_grade(conn: &Connection, id: i64) -> EngineResult<Option<GradeRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, student_id, course_outcome_id, score, period FROM grade_records WHERE id = ?1",
            params![id],
            |r| {
                Ok(GradeRecord {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    course_outcome_id: r.get(2)?,
                    score: r.get(3)?,
                    period: r.get(4)?,
                })
            },
        )
        .optional()?)
}

// --- Profil lulusan ---

pub fn get_profile(conn: &Connection, id: i64) -> EngineResult<Option<GraduateProfile>> {
    let head = conn
        .query_row(
            "SELECT id, program_id, curriculum, code, name, target FROM graduate_profiles WHERE id = ?1",
            params![id],
            |r| {
                Ok(GraduateProfile {
                    id: r.get(0)?,
                    program_id: r.get(1)?,
                    curriculum: r.get(2)?,
                    code: r.get(3)?,
                    name: r.get(4)?,
                    target: r.get(5)?,
                    outcome_ids: Vec::new(),
                })
            },
        )
        .optional()?;

    let mut profile = match head {
        Some(p) => p,
        None => return Ok(None),
    };
    let mut stmt = conn.prepare(
        "SELECT po.outcome_id FROM profile_outcomes po
         JOIN outcomes o ON o.id = po.outcome_id
         WHERE po.profile_id = ?1 AND o.is_active = 1 ORDER BY po.outcome_id",
    )?;
    let rows = stmt.query_map(params![id], |r| r.get::<_, i64>(0))?;
    for r in rows {
        profile.outcome_ids.push(r?);
    }
    Ok(Some(profile))
}
