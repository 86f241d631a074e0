//! Mapping validator: gates every create/update/delete of a weighted link
//! and commits it.
//!
//! Validation may run early on a plain connection (dry run), but the
//! authoritative check always repeats inside the IMMEDIATE transaction that
//! performs the write, so two writers cannot both pass on a stale remainder.

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::{insertions, queries};
use crate::error::{EngineError, EngineResult, LinkKind};
use crate::ledger::{Allowance, Scope, WeightLedger};
use crate::models::{CourseOutcome, MAX_WEIGHT, WEIGHT_EPSILON};

/// A weighted link someone wants to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LinkProposal {
    CplMapping {
        course_outcome_id: i64,
        outcome_id: i64,
        weight: f64,
    },
    Technique {
        course_outcome_id: i64,
        name: String,
        #[serde(default)]
        reference_type: Option<String>,
        weight: f64,
    },
    SubCpmk {
        course_outcome_id: i64,
        code: String,
        #[serde(default)]
        description: String,
        weight: f64,
    },
    SubCpmkTechnique {
        sub_outcome_id: i64,
        technique_id: i64,
        weight: f64,
    },
}

impl LinkProposal {
    pub fn kind(&self) -> LinkKind {
        match self {
            LinkProposal::CplMapping { .. } => LinkKind::CplMapping,
            LinkProposal::Technique { .. } => LinkKind::Technique,
            LinkProposal::SubCpmk { .. } => LinkKind::SubCpmk,
            LinkProposal::SubCpmkTechnique { .. } => LinkKind::SubCpmkTechnique,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            LinkProposal::CplMapping { weight, .. }
            | LinkProposal::Technique { weight, .. }
            | LinkProposal::SubCpmk { weight, .. }
            | LinkProposal::SubCpmkTechnique { weight, .. } => *weight,
        }
    }
}

/// Partial change to an existing link. Fields that do not apply to the
/// link's kind are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkUpdate {
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
    /// An empty string clears the reference type.
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LinkUpdate {
    pub fn weight(weight: f64) -> Self {
        LinkUpdate { weight: Some(weight), ..Default::default() }
    }

    /// Reference type after applying this update to `current`.
    pub fn resolved_reference_type(&self, current: Option<&str>) -> Option<String> {
        match self.reference_type.as_deref().map(str::trim) {
            Some("") => None,
            Some(r) => Some(r.to_string()),
            None => current.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Outcome(i64),
    CourseOutcome(i64),
    Link(LinkKind, i64),
}

/// Lifecycle of a proposed link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    Proposed,
    Validated,
    Committed { id: i64 },
    Rejected { reason: String, detail: Option<String> },
}

impl LinkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Committed { .. } | LinkState::Rejected { .. })
    }
}

/// A link proposal walking `Proposed -> Validated -> Committed`, or ending
/// in `Rejected`. Terminal proposals cannot be retried.
#[derive(Debug, Clone)]
pub struct Proposal {
    link: LinkProposal,
    state: LinkState,
}

impl Proposal {
    pub fn new(link: LinkProposal) -> Self {
        Proposal { link, state: LinkState::Proposed }
    }

    pub fn link(&self) -> &LinkProposal {
        &self.link
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn validate(&mut self, conn: &Connection) -> EngineResult<()> {
        if self.state != LinkState::Proposed {
            return Err(EngineError::InvalidInput(format!("proposal is {:?}, expected Proposed", self.state)));
        }
        match validate_create(conn, &self.link) {
            Ok(()) => {
                self.state = LinkState::Validated;
                Ok(())
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Insert the link. The proposal must be `Validated`; the checks run
    /// again under the transaction's write lock.
    pub fn commit(&mut self, conn: &mut Connection) -> EngineResult<i64> {
        if self.state != LinkState::Validated {
            return Err(EngineError::InvalidInput(format!("proposal is {:?}, expected Validated", self.state)));
        }
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Err(e) = validate_create(&tx, &self.link) {
            return Err(self.reject(e));
        }
        let id = insert_link(&tx, &self.link)?;
        tx.commit()?;
        self.state = LinkState::Committed { id };
        tracing::info!(kind = %self.link.kind(), id, weight = self.link.weight(), "link committed");
        Ok(id)
    }

    fn reject(&mut self, e: EngineError) -> EngineError {
        if e.is_expected() {
            self.state = LinkState::Rejected { reason: e.code().to_string(), detail: e.detail() };
            tracing::warn!(kind = %self.link.kind(), reason = e.code(), "link rejected: {}", e);
        }
        e
    }
}

fn check_weight(weight: f64) -> EngineResult<()> {
    if !weight.is_finite() || weight <= 0.0 || weight > MAX_WEIGHT {
        return Err(EngineError::InvalidWeight(format!("bobot must be greater than 0 and at most 100, got {}", weight)));
    }
    Ok(())
}

fn check_budget(ledger: &WeightLedger, scope: Scope, weight: f64, exclude: Option<i64>) -> EngineResult<Allowance> {
    let allowance = ledger.allowance(scope, exclude)?;
    if weight > allowance.remaining + WEIGHT_EPSILON {
        return Err(EngineError::OverBudget { scope, requested: weight, remaining: allowance.remaining, counterpart: None });
    }
    Ok(allowance)
}

/// Both ceilings of a Sub-CPMK x technique mapping; the tighter one is
/// reported, with the other side as counterpart.
fn check_bipartite(ledger: &WeightLedger, sub_outcome_id: i64, technique_id: i64, weight: f64, exclude: Option<i64>) -> EngineResult<()> {
    let sub = ledger.allowance(Scope::SubOutcomeAssessments(sub_outcome_id), exclude)?;
    let tech = ledger.allowance(Scope::TechniqueAssessments(technique_id), exclude)?;
    let (tight, loose) = if tech.remaining < sub.remaining { (tech, sub) } else { (sub, tech) };
    if weight > tight.remaining + WEIGHT_EPSILON {
        return Err(EngineError::OverBudget {
            scope: tight.scope,
            requested: weight,
            remaining: tight.remaining,
            counterpart: Some((loose.scope, loose.remaining)),
        });
    }
    Ok(())
}

fn active_course_outcome(conn: &Connection, id: i64) -> EngineResult<Option<CourseOutcome>> {
    Ok(queries::get_course_outcome(conn, id)?.filter(|c| c.is_active))
}

fn require_parent_cpmk(conn: &Connection, id: i64) -> EngineResult<CourseOutcome> {
    active_course_outcome(conn, id)?.ok_or_else(|| EngineError::InvalidWeight(format!("CPMK {} does not exist", id)))
}

fn require_text(value: &str, field: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

pub fn validate_create(conn: &Connection, link: &LinkProposal) -> EngineResult<()> {
    check_weight(link.weight())?;
    let ledger = WeightLedger::new(conn);

    match link {
        LinkProposal::CplMapping { course_outcome_id, outcome_id, weight } => {
            let cpmk = require_parent_cpmk(conn, *course_outcome_id)?;
            let outcome = queries::get_outcome(conn, *outcome_id)?
                .filter(|o| o.is_active)
                .ok_or_else(|| EngineError::InvalidWeight(format!("CPL {} does not exist", outcome_id)))?;
            if let Some(course) = queries::get_course(conn, cpmk.course_id)? {
                if course.program_id != outcome.program_id {
                    return Err(EngineError::InvalidInput(format!(
                        "CPL {} belongs to another program than CPMK {}",
                        outcome.code, cpmk.code
                    )));
                }
            }
            if queries::find_outcome_mapping(conn, cpmk.id, outcome.id)?.is_some() {
                return Err(EngineError::Duplicate {
                    kind: LinkKind::CplMapping,
                    detail: format!("{} is already mapped to {}", cpmk.code, outcome.code),
                });
            }
            check_budget(&ledger, Scope::CplMappings(cpmk.id), *weight, None)?;
        }
        LinkProposal::Technique { course_outcome_id, name, weight, .. } => {
            let cpmk = require_parent_cpmk(conn, *course_outcome_id)?;
            require_text(name, "technique name")?;
            if queries::find_technique_by_name(conn, cpmk.id, name)?.is_some() {
                return Err(EngineError::Duplicate {
                    kind: LinkKind::Technique,
                    detail: format!("{} already has technique '{}'", cpmk.code, name.trim()),
                });
            }
            check_budget(&ledger, Scope::Techniques(cpmk.id), *weight, None)?;
        }
        LinkProposal::SubCpmk { course_outcome_id, code, weight, .. } => {
            let cpmk = require_parent_cpmk(conn, *course_outcome_id)?;
            require_text(code, "Sub-CPMK code")?;
            if queries::find_sub_outcome_by_code(conn, cpmk.id, code)?.is_some() {
                return Err(EngineError::Duplicate {
                    kind: LinkKind::SubCpmk,
                    detail: format!("{} already has Sub-CPMK {}", cpmk.code, code.trim()),
                });
            }
            check_budget(&ledger, Scope::SubOutcomes(cpmk.id), *weight, None)?;
        }
        LinkProposal::SubCpmkTechnique { sub_outcome_id, technique_id, weight } => {
            let sub = queries::get_sub_outcome(conn, *sub_outcome_id)?
                .ok_or_else(|| EngineError::InvalidWeight(format!("Sub-CPMK {} does not exist", sub_outcome_id)))?;
            let tech = queries::get_technique(conn, *technique_id)?
                .ok_or_else(|| EngineError::InvalidWeight(format!("technique {} does not exist", technique_id)))?;
            if sub.course_outcome_id != tech.course_outcome_id {
                return Err(EngineError::InvalidInput(format!(
                    "Sub-CPMK {} and technique '{}' belong to different CPMK",
                    sub.code, tech.name
                )));
            }
            if queries::find_sub_assessment(conn, sub.id, tech.id)?.is_some() {
                return Err(EngineError::Duplicate {
                    kind: LinkKind::SubCpmkTechnique,
                    detail: format!("{} is already mapped to '{}'", sub.code, tech.name),
                });
            }
            check_bipartite(&ledger, sub.id, tech.id, *weight, None)?;
        }
    }
    Ok(())
}

pub fn validate_update(conn: &Connection, kind: LinkKind, id: i64, update: &LinkUpdate) -> EngineResult<()> {
    let ledger = WeightLedger::new(conn);
    match kind {
        LinkKind::CplMapping => {
            let m = queries::get_outcome_mapping(conn, id)?
                .ok_or_else(|| EngineError::NotFound(format!("CPL mapping {}", id)))?;
            let weight = update.weight.unwrap_or(m.weight);
            check_weight(weight)?;
            check_budget(&ledger, Scope::CplMappings(m.course_outcome_id), weight, Some(id))?;
        }
        LinkKind::Technique => {
            let t = queries::get_technique(conn, id)?
                .ok_or_else(|| EngineError::NotFound(format!("technique {}", id)))?;
            let weight = update.weight.unwrap_or(t.weight);
            check_weight(weight)?;
            if let Some(name) = &update.name {
                require_text(name, "technique name")?;
                if let Some(other) = queries::find_technique_by_name(conn, t.course_outcome_id, name)? {
                    if other.id != id {
                        return Err(EngineError::Duplicate {
                            kind: LinkKind::Technique,
                            detail: format!("technique '{}' already exists", name.trim()),
                        });
                    }
                }
            }
            check_budget(&ledger, Scope::Techniques(t.course_outcome_id), weight, Some(id))?;
        }
        LinkKind::SubCpmk => {
            let s = queries::get_sub_outcome(conn, id)?
                .ok_or_else(|| EngineError::NotFound(format!("Sub-CPMK {}", id)))?;
            let weight = update.weight.unwrap_or(s.weight);
            check_weight(weight)?;
            if let Some(code) = &update.code {
                require_text(code, "Sub-CPMK code")?;
                if let Some(other) = queries::find_sub_outcome_by_code(conn, s.course_outcome_id, code)? {
                    if other.id != id {
                        return Err(EngineError::Duplicate {
                            kind: LinkKind::SubCpmk,
                            detail: format!("Sub-CPMK {} already exists", code.trim()),
                        });
                    }
                }
            }
            check_budget(&ledger, Scope::SubOutcomes(s.course_outcome_id), weight, Some(id))?;
            // its own technique mappings must still fit underneath
            let distributed = ledger.total_committed(Scope::SubOutcomeAssessments(id), None)?;
            if weight + WEIGHT_EPSILON < distributed {
                return Err(EngineError::InvalidWeight(format!(
                    "Sub-CPMK {} already distributes {} to techniques",
                    s.code,
                    crate::error::fmt_pct(distributed)
                )));
            }
        }
        LinkKind::SubCpmkTechnique => {
            let m = queries::get_sub_assessment(conn, id)?
                .ok_or_else(|| EngineError::NotFound(format!("Sub-CPMK mapping {}", id)))?;
            let weight = update.weight.unwrap_or(m.weight);
            check_weight(weight)?;
            check_bipartite(&ledger, m.sub_outcome_id, m.technique_id, weight, Some(id))?;
        }
    }
    Ok(())
}

pub fn validate_delete(conn: &Connection, target: DeleteTarget) -> EngineResult<()> {
    match target {
        DeleteTarget::Outcome(id) => {
            queries::get_outcome(conn, id)?
                .filter(|o| o.is_active)
                .ok_or_else(|| EngineError::NotFound(format!("CPL {}", id)))?;
            let count = queries::count_outcome_grades(conn, id)?;
            if count > 0 {
                return Err(EngineError::InUse { count });
            }
        }
        DeleteTarget::CourseOutcome(id) => {
            validate_course_outcome_edit(conn, id)?;
        }
        DeleteTarget::Link(kind, id) => {
            let exists = match kind {
                LinkKind::CplMapping => queries::get_outcome_mapping(conn, id)?.is_some(),
                LinkKind::Technique => queries::get_technique(conn, id)?.is_some(),
                LinkKind::SubCpmk => queries::get_sub_outcome(conn, id)?.is_some(),
                LinkKind::SubCpmkTechnique => queries::get_sub_assessment(conn, id)?.is_some(),
            };
            if !exists {
                return Err(EngineError::NotFound(format!("{} {}", kind, id)));
            }
        }
    }
    Ok(())
}

/// A graded CPMK is frozen: every edit and delete is refused with the
/// number of grade records depending on it.
pub fn validate_course_outcome_edit(conn: &Connection, id: i64) -> EngineResult<CourseOutcome> {
    let cpmk = active_course_outcome(conn, id)?.ok_or_else(|| EngineError::NotFound(format!("CPMK {}", id)))?;
    let count = queries::count_course_outcome_grades(conn, id)?;
    if count > 0 {
        return Err(EngineError::InUse { count });
    }
    Ok(cpmk)
}

/// Sub-CPMK mappings an update to technique `id` would invalidate.
/// Zero when the update changes neither weight nor identity.
pub fn pending_cascade(conn: &Connection, id: i64, update: &LinkUpdate) -> EngineResult<i64> {
    let t = queries::get_technique(conn, id)?.ok_or_else(|| EngineError::NotFound(format!("technique {}", id)))?;
    let weight_changed = update.weight.is_some_and(|w| (w - t.weight).abs() > WEIGHT_EPSILON);
    let name_changed = update.name.as_deref().is_some_and(|n| n.trim().to_lowercase() != t.name.trim().to_lowercase());
    let ref_changed = update.resolved_reference_type(t.reference_type.as_deref()) != t.reference_type;
    if !(weight_changed || name_changed || ref_changed) {
        return Ok(0);
    }
    queries::count_technique_assessments(conn, id)
}

fn insert_link(conn: &Connection, link: &LinkProposal) -> EngineResult<i64> {
    match link {
        LinkProposal::CplMapping { course_outcome_id, outcome_id, weight } => {
            insertions::insert_outcome_mapping(conn, *course_outcome_id, *outcome_id, *weight)
        }
        LinkProposal::Technique { course_outcome_id, name, reference_type, weight } => {
            insertions::insert_technique(conn, *course_outcome_id, name, reference_type.as_deref(), *weight)
        }
        LinkProposal::SubCpmk { course_outcome_id, code, description, weight } => {
            insertions::insert_sub_outcome(conn, *course_outcome_id, code, description, *weight)
        }
        LinkProposal::SubCpmkTechnique { sub_outcome_id, technique_id, weight } => {
            insertions::insert_sub_assessment(conn, *sub_outcome_id, *technique_id, *weight)
        }
    }
}

/// Result of a committed link update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateReceipt {
    pub id: i64,
    /// Sub-CPMK mappings removed because their technique changed.
    pub cascaded: i64,
}

/// Validate and apply an update in one IMMEDIATE transaction.
///
/// Changing a technique that already has Sub-CPMK mappings deletes them.
/// Without `confirm` nothing is written and `ConfirmationRequired` carries
/// the count that would be deleted.
pub fn commit_update(conn: &mut Connection, kind: LinkKind, id: i64, update: &LinkUpdate, confirm: bool) -> EngineResult<UpdateReceipt> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    validate_update(&tx, kind, id, update)?;

    let mut cascaded = 0;
    match kind {
        LinkKind::CplMapping | LinkKind::SubCpmkTechnique => {
            if let Some(w) = update.weight {
                insertions::update_link_weight(&tx, kind, id, w)?;
            }
        }
        LinkKind::Technique => {
            let pending = pending_cascade(&tx, id, update)?;
            if pending > 0 && !confirm {
                return Err(EngineError::ConfirmationRequired { mappings: pending });
            }
            if pending > 0 {
                cascaded = insertions::delete_technique_assessments(&tx, id)? as i64;
            }
            let t = queries::get_technique(&tx, id)?.ok_or_else(|| EngineError::NotFound(format!("technique {}", id)))?;
            let name = update.name.clone().unwrap_or(t.name);
            let reference_type = update.resolved_reference_type(t.reference_type.as_deref());
            insertions::update_technique_row(&tx, id, &name, reference_type.as_deref(), update.weight.unwrap_or(t.weight))?;
        }
        LinkKind::SubCpmk => {
            let s = queries::get_sub_outcome(&tx, id)?.ok_or_else(|| EngineError::NotFound(format!("Sub-CPMK {}", id)))?;
            let code = update.code.clone().unwrap_or(s.code);
            let description = update.description.clone().unwrap_or(s.description);
            insertions::update_sub_outcome_row(&tx, id, &code, &description, update.weight.unwrap_or(s.weight))?;
        }
    }
    tx.commit()?;
    tracing::info!(kind = %kind, id, cascaded, "link updated");
    Ok(UpdateReceipt { id, cascaded })
}

/// Validate and apply a delete in one IMMEDIATE transaction.
pub fn commit_delete(conn: &mut Connection, target: DeleteTarget) -> EngineResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    validate_delete(&tx, target)?;
    match target {
        DeleteTarget::Outcome(id) => {
            let dropped = insertions::soft_delete_outcome(&tx, id)?;
            tracing::info!(outcome = id, dropped_links = dropped, "CPL deactivated");
        }
        DeleteTarget::CourseOutcome(id) => {
            insertions::soft_delete_course_outcome(&tx, id)?;
            tracing::info!(course_outcome = id, "CPMK deactivated");
        }
        DeleteTarget::Link(kind, id) => {
            insertions::delete_link(&tx, kind, id)?;
            tracing::info!(kind = %kind, id, "link deleted");
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_weight_bounds() {
        assert!(check_weight(0.5).is_ok());
        assert!(check_weight(100.0).is_ok());
        for bad in [0.0, -1.0, 100.01, f64::NAN, f64::INFINITY] {
            assert!(matches!(check_weight(bad), Err(EngineError::InvalidWeight(_))), "{} accepted", bad);
        }
    }

    #[test]
    fn test_proposal_json_shape() {
        let p: LinkProposal = serde_json::from_str(
            r#"{"kind": "sub-cpmk-technique", "sub_outcome_id": 2, "technique_id": 3, "weight": 5}"#,
        )
        .unwrap();
        assert_eq!(p.kind(), LinkKind::SubCpmkTechnique);
        assert_eq!(p.weight(), 5.0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!LinkState::Proposed.is_terminal());
        assert!(!LinkState::Validated.is_terminal());
        assert!(LinkState::Committed { id: 1 }.is_terminal());
        assert!(LinkState::Rejected { reason: "DUPLICATE".into(), detail: None }.is_terminal());
    }
}
