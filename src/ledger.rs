//! Weight ledger: committed and remaining bobot per parent scope.
//!
//! Totals are summed from the persisted rows on every call. There is no
//! incremental counter to drift after concurrent edits or cascaded deletes;
//! when called on a `Transaction` the sums see that transaction's writes.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::fmt;

use crate::db::queries;
use crate::error::{EngineError, EngineResult};
use crate::models::MAX_WEIGHT;

/// Parent scope whose children share one weight budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    /// CPL mappings of one CPMK.
    CplMappings(i64),
    /// Assessment techniques of one CPMK.
    Techniques(i64),
    /// Sub-CPMK of one CPMK.
    SubOutcomes(i64),
    /// Technique mappings of one Sub-CPMK; ceiling is the Sub-CPMK's weight.
    SubOutcomeAssessments(i64),
    /// Sub-CPMK mappings consuming one technique; ceiling is the technique's weight.
    TechniqueAssessments(i64),
}

impl Scope {
    pub fn parent_id(&self) -> i64 {
        match *self {
            Scope::CplMappings(id)
            | Scope::Techniques(id)
            | Scope::SubOutcomes(id)
            | Scope::SubOutcomeAssessments(id)
            | Scope::TechniqueAssessments(id) => id,
        }
    }

    /// Label used in "Sisa Bobot" details shown to the user.
    pub fn remaining_label(&self) -> &'static str {
        match self {
            Scope::CplMappings(_) => "Sisa Bobot CPL",
            Scope::Techniques(_) => "Sisa Bobot Teknik Penilaian",
            Scope::SubOutcomes(_) => "Sisa Bobot Sub-CPMK",
            Scope::SubOutcomeAssessments(_) => "Sisa Bobot Sub-CPMK",
            Scope::TechniqueAssessments(_) => "Sisa Bobot Teknik",
        }
    }

    fn sum_sql(&self) -> &'static str {
        match self {
            Scope::CplMappings(_) => {
                "SELECT COALESCE(SUM(weight), 0) FROM outcome_mappings WHERE course_outcome_id = ?1 AND id != ?2"
            }
            Scope::Techniques(_) => {
                "SELECT COALESCE(SUM(weight), 0) FROM assessment_techniques WHERE course_outcome_id = ?1 AND id != ?2"
            }
            Scope::SubOutcomes(_) => {
                "SELECT COALESCE(SUM(weight), 0) FROM sub_outcomes WHERE course_outcome_id = ?1 AND id != ?2"
            }
            Scope::SubOutcomeAssessments(_) => {
                "SELECT COALESCE(SUM(weight), 0) FROM sub_outcome_assessments WHERE sub_outcome_id = ?1 AND id != ?2"
            }
            Scope::TechniqueAssessments(_) => {
                "SELECT COALESCE(SUM(weight), 0) FROM sub_outcome_assessments WHERE technique_id = ?1 AND id != ?2"
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::CplMappings(id) => write!(f, "CPL mappings of CPMK {}", id),
            Scope::Techniques(id) => write!(f, "techniques of CPMK {}", id),
            Scope::SubOutcomes(id) => write!(f, "Sub-CPMK of CPMK {}", id),
            Scope::SubOutcomeAssessments(id) => write!(f, "technique mappings of Sub-CPMK {}", id),
            Scope::TechniqueAssessments(id) => write!(f, "Sub-CPMK mappings of technique {}", id),
        }
    }
}

/// Budget snapshot of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Allowance {
    pub scope: Scope,
    pub ceiling: f64,
    pub committed: f64,
    pub remaining: f64,
}

pub struct WeightLedger<'c> {
    conn: &'c Connection,
}

impl<'c> WeightLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        WeightLedger { conn }
    }

    /// Sum of child weights in `scope`, leaving out `exclude_link_id` if given.
    pub fn total_committed(&self, scope: Scope, exclude_link_id: Option<i64>) -> EngineResult<f64> {
        let exclude = exclude_link_id.unwrap_or(-1);
        let total: f64 = self
            .conn
            .query_row(scope.sum_sql(), params![scope.parent_id(), exclude], |r| r.get(0))?;
        Ok(total)
    }

    /// Maximum the children of `scope` may add up to.
    pub fn ceiling(&self, scope: Scope) -> EngineResult<f64> {
        match scope {
            Scope::CplMappings(_) | Scope::Techniques(_) | Scope::SubOutcomes(_) => Ok(MAX_WEIGHT),
            Scope::SubOutcomeAssessments(id) => queries::get_sub_outcome(self.conn, id)?
                .map(|s| s.weight)
                .ok_or_else(|| EngineError::NotFound(format!("sub-CPMK {}", id))),
            Scope::TechniqueAssessments(id) => queries::get_technique(self.conn, id)?
                .map(|t| t.weight)
                .ok_or_else(|| EngineError::NotFound(format!("technique {}", id))),
        }
    }

    pub fn remaining(&self, scope: Scope, exclude_link_id: Option<i64>) -> EngineResult<f64> {
        Ok(self.allowance(scope, exclude_link_id)?.remaining)
    }

    pub fn allowance(&self, scope: Scope, exclude_link_id: Option<i64>) -> EngineResult<Allowance> {
        let ceiling = self.ceiling(scope)?;
        let committed = self.total_committed(scope, exclude_link_id)?;
        Ok(Allowance { scope, ceiling, committed, remaining: ceiling - committed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insertions, open_in_memory};
    use crate::models::{NewCourse, NewFaculty, NewProgram};

    fn seed_cpmk(conn: &Connection) -> i64 {
        let f = insertions::insert_faculty(conn, &NewFaculty { code: "FT".into(), name: "Teknik".into() }).unwrap();
        let p = insertions::insert_program(conn, &NewProgram { faculty_id: f, code: "IF".into(), name: "Informatika".into() }).unwrap();
        let c = insertions::insert_course(conn, &NewCourse { program_id: p, code: "IF101".into(), name: "Algoritma".into() }).unwrap();
        insertions::insert_course_outcome(conn, c, "CPMK-1", "Mampu", &[]).unwrap()
    }

    #[test]
    fn test_empty_scope_has_full_budget() {
        let conn = open_in_memory().unwrap();
        let cpmk = seed_cpmk(&conn);
        let ledger = WeightLedger::new(&conn);
        assert_eq!(ledger.total_committed(Scope::Techniques(cpmk), None).unwrap(), 0.0);
        assert_eq!(ledger.remaining(Scope::Techniques(cpmk), None).unwrap(), 100.0);
    }

    #[test]
    fn test_exclude_leaves_out_own_contribution() {
        let conn = open_in_memory().unwrap();
        let cpmk = seed_cpmk(&conn);
        let t1 = insertions::insert_technique(&conn, cpmk, "UTS", None, 30.0).unwrap();
        insertions::insert_technique(&conn, cpmk, "UAS", None, 45.0).unwrap();

        let ledger = WeightLedger::new(&conn);
        assert_eq!(ledger.total_committed(Scope::Techniques(cpmk), None).unwrap(), 75.0);
        assert_eq!(ledger.remaining(Scope::Techniques(cpmk), Some(t1)).unwrap(), 55.0);
    }

    #[test]
    fn test_sub_scopes_use_parent_weight_as_ceiling() {
        let conn = open_in_memory().unwrap();
        let cpmk = seed_cpmk(&conn);
        let sub = insertions::insert_sub_outcome(&conn, cpmk, "SUB-1", "x", 50.0).unwrap();
        let tech = insertions::insert_technique(&conn, cpmk, "Proyek", None, 30.0).unwrap();
        insertions::insert_sub_assessment(&conn, sub, tech, 20.0).unwrap();

        let ledger = WeightLedger::new(&conn);
        let a = ledger.allowance(Scope::SubOutcomeAssessments(sub), None).unwrap();
        assert_eq!((a.ceiling, a.committed, a.remaining), (50.0, 20.0, 30.0));
        assert_eq!(ledger.remaining(Scope::TechniqueAssessments(tech), None).unwrap(), 10.0);
        assert!(matches!(
            ledger.ceiling(Scope::TechniqueAssessments(999)),
            Err(EngineError::NotFound(_))
        ));
    }
}
