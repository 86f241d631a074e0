// Core data structures: persisted entities and request payloads.

use serde::{Deserialize, Serialize};

/// Upper bound for any weight-percentage.
pub const MAX_WEIGHT: f64 = 100.0;

/// Tolerance used when comparing summed percentages.
pub const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Kaprodi,
    Dosen,
    Mahasiswa,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Kaprodi => "kaprodi",
            Role::Dosen => "dosen",
            Role::Mahasiswa => "mahasiswa",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "kaprodi" => Some(Role::Kaprodi),
            "dosen" => Some(Role::Dosen),
            "mahasiswa" => Some(Role::Mahasiswa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Faculty {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: i64,
    pub faculty_id: i64,
    pub code: String,
    pub name: String,
}

/// Mata kuliah.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub program_id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: Role,
    pub program_id: Option<i64>,
}

/// CPL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub id: i64,
    pub program_id: i64,
    pub code: String,
    pub description: String,
    pub category: Option<String>,
    /// Target ketercapaian (0-100).
    pub target: f64,
    pub is_active: bool,
}

/// CPMK. `course_id` never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseOutcome {
    pub id: i64,
    pub course_id: i64,
    pub code: String,
    pub description: String,
    /// Taxonomy tags such as "C3" or "P2".
    pub taxonomy_levels: Vec<String>,
    pub is_active: bool,
}

/// CPMK -> CPL link with its bobot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeMapping {
    pub id: i64,
    pub course_outcome_id: i64,
    pub outcome_id: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentTechnique {
    pub id: i64,
    pub course_outcome_id: i64,
    pub name: String,
    pub reference_type: Option<String>,
    pub weight: f64,
}

/// Sub-CPMK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubOutcome {
    pub id: i64,
    pub course_outcome_id: i64,
    pub code: String,
    pub description: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubOutcomeAssessmentMapping {
    pub id: i64,
    pub sub_outcome_id: i64,
    pub technique_id: i64,
    pub weight: f64,
}

/// Profil lulusan, linked (unweighted) to a set of CPL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraduateProfile {
    pub id: i64,
    pub program_id: i64,
    pub curriculum: Option<String>,
    pub code: String,
    pub name: String,
    pub target: f64,
    pub outcome_ids: Vec<i64>,
}

/// Nilai of one student on one CPMK for one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRecord {
    pub id: i64,
    pub student_id: i64,
    pub course_outcome_id: i64,
    pub score: f64,
    pub period: String,
}

// --- Request payloads ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFaculty {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProgram {
    pub faculty_id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub program_id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub program_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutcome {
    pub program_id: i64,
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Falls back to the configured default target when absent.
    #[serde(default)]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeUpdate {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourseOutcome {
    pub course_id: i64,
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub taxonomy_levels: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseOutcomeUpdate {
    /// Only accepted when equal to the current course.
    #[serde(default)]
    pub course_id: Option<i64>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub taxonomy_levels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGrade {
    pub student_id: i64,
    pub course_outcome_id: i64,
    pub score: f64,
    pub period: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    pub program_id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub curriculum: Option<String>,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default)]
    pub outcome_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_lowercase() {
        let r: Role = serde_json::from_str("\"kaprodi\"").unwrap();
        assert_eq!(r, Role::Kaprodi);
        assert_eq!(Role::parse(" Dosen "), Some(Role::Dosen));
        assert_eq!(Role::parse("rector"), None);
    }

    #[test]
    fn test_new_outcome_target_optional() {
        let o: NewOutcome = serde_json::from_str(
            r#"{"program_id": 1, "code": "CPL-01", "description": "Mampu menganalisis"}"#,
        )
        .expect("should parse CPL without target");
        assert!(o.target.is_none());
        assert!(o.category.is_none());
    }
}
