//! Actor-aware operations used by the HTTP handlers and the importer.
//!
//! Every mutation follows the same order: resolve the owning scope,
//! authorize the actor, then validate and write inside one IMMEDIATE
//! transaction.

use rusqlite::{Connection, TransactionBehavior};

use crate::access::{self, Action, Actor, EntityScope, Resource};
use crate::config::AppConfig;
use crate::db::{insertions, queries};
use crate::error::{EngineError, EngineResult, ForbiddenKind, LinkKind};
use crate::models::{
    CourseOutcome, CourseOutcomeUpdate, GradeRecord, GraduateProfile, NewCourse, NewCourseOutcome,
    NewFaculty, NewGrade, NewOutcome, NewProfile, NewProgram, NewUser, Outcome, OutcomeUpdate, Role,
    MAX_WEIGHT,
};
use crate::reporter::{self, Achievement, ReportScope, ScoredEntry, TrendReport, WeightSummary};
use crate::validator::{self, DeleteTarget, LinkProposal, LinkState, LinkUpdate, Proposal, UpdateReceipt};

fn require_admin(actor: &Actor) -> EngineResult<()> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        tracing::warn!(actor = actor.id, role = actor.role.as_str(), "master data write denied");
        Err(EngineError::Forbidden(ForbiddenKind::MasterData))
    }
}

fn require_text(value: &str, field: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

fn check_percentage(value: f64, field: &str) -> EngineResult<()> {
    if !value.is_finite() || !(0.0..=MAX_WEIGHT).contains(&value) {
        return Err(EngineError::InvalidInput(format!("{} must be between 0 and 100, got {}", field, value)));
    }
    Ok(())
}

fn immediate(conn: &mut Connection) -> EngineResult<rusqlite::Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

// --- Master data ---

pub fn create_faculty(conn: &Connection, actor: &Actor, f: &NewFaculty) -> EngineResult<i64> {
    require_admin(actor)?;
    require_text(&f.code, "faculty code")?;
    require_text(&f.name, "faculty name")?;
    let id = insertions::insert_faculty(conn, f)?;
    tracing::info!(faculty = id, code = %f.code, "faculty created");
    Ok(id)
}

pub fn create_program(conn: &Connection, actor: &Actor, p: &NewProgram) -> EngineResult<i64> {
    require_admin(actor)?;
    require_text(&p.code, "program code")?;
    require_text(&p.name, "program name")?;
    if !queries::faculty_exists(conn, p.faculty_id)? {
        return Err(EngineError::InvalidInput(format!("faculty {} does not exist", p.faculty_id)));
    }
    let id = insertions::insert_program(conn, p)?;
    tracing::info!(program = id, code = %p.code, "program created");
    Ok(id)
}

pub fn create_user(conn: &Connection, actor: &Actor, u: &NewUser) -> EngineResult<i64> {
    require_admin(actor)?;
    require_text(&u.name, "user name")?;
    if let Some(pid) = u.program_id {
        if queries::get_program(conn, pid)?.is_none() {
            return Err(EngineError::InvalidInput(format!("program {} does not exist", pid)));
        }
    } else if u.role == Role::Kaprodi {
        return Err(EngineError::InvalidInput("kaprodi must belong to a program".to_string()));
    }
    let id = insertions::insert_user(conn, u)?;
    tracing::info!(user = id, role = u.role.as_str(), "user created");
    Ok(id)
}

pub fn create_course(conn: &mut Connection, actor: &Actor, c: &NewCourse) -> EngineResult<i64> {
    access::authorize_write(actor, Resource::Course, Action::Create, &EntityScope::Program(c.program_id))?;
    require_text(&c.code, "course code")?;
    require_text(&c.name, "course name")?;
    let tx = immediate(conn)?;
    if queries::get_program(&tx, c.program_id)?.is_none() {
        return Err(EngineError::NotFound(format!("program {}", c.program_id)));
    }
    if queries::find_course_by_code(&tx, c.program_id, &c.code)?.is_some() {
        return Err(EngineError::InvalidInput(format!("course {} already exists", c.code.trim())));
    }
    let id = insertions::insert_course(&tx, c)?;
    tx.commit()?;
    tracing::info!(course = id, code = %c.code, "course created");
    Ok(id)
}

/// Make `user_id` pengampu of a course. Admin, or the kaprodi of the
/// course's program.
pub fn assign_lecturer(conn: &Connection, actor: &Actor, course_id: i64, user_id: i64) -> EngineResult<()> {
    let course = queries::get_course(conn, course_id)?
        .ok_or_else(|| EngineError::NotFound(format!("course {}", course_id)))?;
    access::authorize_write(actor, Resource::Course, Action::Edit, &EntityScope::Program(course.program_id))?;
    let user = queries::get_user(conn, user_id)?
        .ok_or_else(|| EngineError::InvalidInput(format!("user {} does not exist", user_id)))?;
    if user.role != Role::Dosen {
        return Err(EngineError::InvalidInput(format!("user {} is not a dosen", user_id)));
    }
    insertions::assign_lecturer(conn, user_id, course_id)?;
    tracing::info!(course = course_id, lecturer = user_id, "pengampu assigned");
    Ok(())
}

// --- CPL ---

pub fn create_outcome(conn: &mut Connection, actor: &Actor, cfg: &AppConfig, o: &NewOutcome) -> EngineResult<Outcome> {
    access::authorize_write(actor, Resource::Outcome, Action::Create, &EntityScope::Program(o.program_id))?;
    require_text(&o.code, "CPL code")?;
    require_text(&o.description, "CPL description")?;
    let target = o.target.unwrap_or(cfg.default_target);
    check_percentage(target, "target")?;

    let tx = immediate(conn)?;
    if queries::get_program(&tx, o.program_id)?.is_none() {
        return Err(EngineError::NotFound(format!("program {}", o.program_id)));
    }
    if queries::find_outcome_by_code(&tx, o.program_id, &o.code)?.is_some() {
        return Err(EngineError::InvalidInput(format!("CPL {} already exists", o.code.trim())));
    }
    let id = insertions::insert_outcome(&tx, o.program_id, &o.code, &o.description, o.category.as_deref(), target)?;
    let created = queries::get_outcome(&tx, id)?.ok_or_else(|| EngineError::Internal(format!("CPL {} vanished", id)))?;
    tx.commit()?;
    tracing::info!(outcome = id, code = %created.code, target, "CPL created");
    Ok(created)
}

pub fn update_outcome(conn: &mut Connection, actor: &Actor, id: i64, u: &OutcomeUpdate) -> EngineResult<Outcome> {
    let current = queries::get_outcome(conn, id)?
        .filter(|o| o.is_active)
        .ok_or_else(|| EngineError::NotFound(format!("CPL {}", id)))?;
    access::authorize_write(actor, Resource::Outcome, Action::Edit, &EntityScope::Program(current.program_id))?;

    let code = u.code.clone().unwrap_or_else(|| current.code.clone());
    let description = u.description.clone().unwrap_or_else(|| current.description.clone());
    let category = u.category.clone().or_else(|| current.category.clone());
    let target = u.target.unwrap_or(current.target);
    require_text(&code, "CPL code")?;
    require_text(&description, "CPL description")?;
    check_percentage(target, "target")?;

    let tx = immediate(conn)?;
    if let Some(other) = queries::find_outcome_by_code(&tx, current.program_id, &code)? {
        if other.id != id {
            return Err(EngineError::InvalidInput(format!("CPL {} already exists", code.trim())));
        }
    }
    insertions::update_outcome_row(&tx, id, &code, &description, category.as_deref(), target)?;
    let updated = queries::get_outcome(&tx, id)?.ok_or_else(|| EngineError::NotFound(format!("CPL {}", id)))?;
    tx.commit()?;
    tracing::info!(outcome = id, "CPL updated");
    Ok(updated)
}

pub fn delete_outcome(conn: &mut Connection, actor: &Actor, id: i64) -> EngineResult<()> {
    let current = queries::get_outcome(conn, id)?
        .filter(|o| o.is_active)
        .ok_or_else(|| EngineError::NotFound(format!("CPL {}", id)))?;
    access::authorize_write(actor, Resource::Outcome, Action::Delete, &EntityScope::Program(current.program_id))?;
    validator::commit_delete(conn, DeleteTarget::Outcome(id))
}

pub fn list_outcomes(conn: &Connection, actor: &Actor, program_id: i64) -> EngineResult<Vec<Outcome>> {
    access::authorize_read(actor, Resource::Outcome, &EntityScope::Program(program_id))?;
    queries::list_outcomes(conn, program_id)
}

// --- CPMK ---

pub fn create_course_outcome(conn: &mut Connection, actor: &Actor, c: &NewCourseOutcome) -> EngineResult<CourseOutcome> {
    let scope = access::course_scope(conn, c.course_id)?;
    access::authorize_write(actor, Resource::CourseOutcome, Action::Create, &scope)?;
    require_text(&c.code, "CPMK code")?;
    require_text(&c.description, "CPMK description")?;
    let levels = clean_levels(&c.taxonomy_levels)?;

    let tx = immediate(conn)?;
    if queries::find_course_outcome_by_code(&tx, c.course_id, &c.code)?.is_some() {
        return Err(EngineError::InvalidInput(format!("CPMK {} already exists", c.code.trim())));
    }
    let id = insertions::insert_course_outcome(&tx, c.course_id, &c.code, &c.description, &levels)?;
    let created = queries::get_course_outcome(&tx, id)?
        .ok_or_else(|| EngineError::Internal(format!("CPMK {} vanished", id)))?;
    tx.commit()?;
    tracing::info!(course_outcome = id, code = %created.code, "CPMK created");
    Ok(created)
}

fn clean_levels(levels: &[String]) -> EngineResult<Vec<String>> {
    let cleaned: Vec<String> = levels
        .iter()
        .map(|l| l.trim().to_uppercase())
        .filter(|l| !l.is_empty())
        .collect();
    if cleaned.is_empty() {
        return Err(EngineError::InvalidInput("at least one taxonomy level is required".to_string()));
    }
    Ok(cleaned)
}

/// Edit a CPMK. Refused with `IN_USE` once grades exist; the course never changes.
pub fn update_course_outcome(conn: &mut Connection, actor: &Actor, id: i64, u: &CourseOutcomeUpdate) -> EngineResult<CourseOutcome> {
    let scope = access::course_outcome_scope(conn, id)?;
    access::authorize_write(actor, Resource::CourseOutcome, Action::Edit, &scope)?;

    let tx = immediate(conn)?;
    let current = validator::validate_course_outcome_edit(&tx, id)?;
    if u.course_id.is_some_and(|c| c != current.course_id) {
        return Err(EngineError::InvalidInput("a CPMK cannot move to another course".to_string()));
    }
    let code = u.code.clone().unwrap_or_else(|| current.code.clone());
    let description = u.description.clone().unwrap_or_else(|| current.description.clone());
    let levels = match &u.taxonomy_levels {
        Some(l) => clean_levels(l)?,
        None => current.taxonomy_levels.clone(),
    };
    require_text(&code, "CPMK code")?;
    require_text(&description, "CPMK description")?;
    if let Some(other) = queries::find_course_outcome_by_code(&tx, current.course_id, &code)? {
        if other.id != id {
            return Err(EngineError::InvalidInput(format!("CPMK {} already exists", code.trim())));
        }
    }
    insertions::update_course_outcome_row(&tx, id, &code, &description, &levels)?;
    let updated = queries::get_course_outcome(&tx, id)?.ok_or_else(|| EngineError::NotFound(format!("CPMK {}", id)))?;
    tx.commit()?;
    tracing::info!(course_outcome = id, "CPMK updated");
    Ok(updated)
}

pub fn delete_course_outcome(conn: &mut Connection, actor: &Actor, id: i64) -> EngineResult<()> {
    let scope = access::course_outcome_scope(conn, id)?;
    access::authorize_write(actor, Resource::CourseOutcome, Action::Delete, &scope)?;
    validator::commit_delete(conn, DeleteTarget::CourseOutcome(id))
}

pub fn list_course_outcomes(conn: &Connection, actor: &Actor, course_id: i64) -> EngineResult<Vec<CourseOutcome>> {
    let scope = access::course_scope(conn, course_id)?;
    access::authorize_read(actor, Resource::CourseOutcome, &scope)?;
    queries::list_course_outcomes(conn, course_id)
}

pub fn weight_summary(conn: &Connection, actor: &Actor, course_outcome_id: i64) -> EngineResult<WeightSummary> {
    let scope = access::course_outcome_scope(conn, course_outcome_id)?;
    access::authorize_read(actor, Resource::CourseOutcome, &scope)?;
    reporter::weight_summary(conn, course_outcome_id)
}

// --- Weighted links ---

fn link_resource(kind: LinkKind) -> Resource {
    match kind {
        LinkKind::CplMapping => Resource::OutcomeMapping,
        LinkKind::Technique => Resource::Technique,
        LinkKind::SubCpmk => Resource::SubOutcome,
        LinkKind::SubCpmkTechnique => Resource::SubOutcomeAssessment,
    }
}

/// Owning scope of a proposed link. A missing parent is a weight error,
/// the same answer the validator gives.
fn proposal_scope(conn: &Connection, link: &LinkProposal) -> EngineResult<EntityScope> {
    let cpmk_id = match link {
        LinkProposal::CplMapping { course_outcome_id, .. }
        | LinkProposal::Technique { course_outcome_id, .. }
        | LinkProposal::SubCpmk { course_outcome_id, .. } => *course_outcome_id,
        LinkProposal::SubCpmkTechnique { sub_outcome_id, .. } => queries::get_sub_outcome(conn, *sub_outcome_id)?
            .map(|s| s.course_outcome_id)
            .ok_or_else(|| EngineError::InvalidWeight(format!("Sub-CPMK {} does not exist", sub_outcome_id)))?,
    };
    match access::course_outcome_scope(conn, cpmk_id) {
        Err(EngineError::NotFound(_)) => Err(EngineError::InvalidWeight(format!("CPMK {} does not exist", cpmk_id))),
        other => other,
    }
}

/// Owning scope of an existing link.
fn link_scope(conn: &Connection, kind: LinkKind, id: i64) -> EngineResult<EntityScope> {
    let cpmk_id = match kind {
        LinkKind::CplMapping => queries::get_outcome_mapping(conn, id)?.map(|m| m.course_outcome_id),
        LinkKind::Technique => queries::get_technique(conn, id)?.map(|t| t.course_outcome_id),
        LinkKind::SubCpmk => queries::get_sub_outcome(conn, id)?.map(|s| s.course_outcome_id),
        LinkKind::SubCpmkTechnique => match queries::get_sub_assessment(conn, id)? {
            Some(m) => queries::get_sub_outcome(conn, m.sub_outcome_id)?.map(|s| s.course_outcome_id),
            None => None,
        },
    };
    let cpmk_id = cpmk_id.ok_or_else(|| EngineError::NotFound(format!("{} {}", kind, id)))?;
    access::course_outcome_scope(conn, cpmk_id)
}

/// Create a weighted link. Returns the new link id.
pub fn propose_link(conn: &mut Connection, actor: &Actor, link: LinkProposal) -> EngineResult<i64> {
    let scope = proposal_scope(conn, &link)?;
    access::authorize_write(actor, link_resource(link.kind()), Action::Create, &scope)?;
    let mut proposal = Proposal::new(link);
    proposal.validate(conn)?;
    proposal.commit(conn)
}

/// Dry run: the state a proposal would reach, without writing.
/// Authorization failures are still errors.
pub fn check_link(conn: &Connection, actor: &Actor, link: LinkProposal) -> EngineResult<LinkState> {
    let scope = proposal_scope(conn, &link)?;
    access::authorize_write(actor, link_resource(link.kind()), Action::Create, &scope)?;
    let mut proposal = Proposal::new(link);
    match proposal.validate(conn) {
        Ok(()) => Ok(proposal.state().clone()),
        Err(e) if e.is_expected() => Ok(proposal.state().clone()),
        Err(e) => Err(e),
    }
}

pub fn update_link(
    conn: &mut Connection,
    actor: &Actor,
    kind: LinkKind,
    id: i64,
    update: &LinkUpdate,
    confirm: bool,
) -> EngineResult<UpdateReceipt> {
    let scope = link_scope(conn, kind, id)?;
    access::authorize_write(actor, link_resource(kind), Action::Edit, &scope)?;
    validator::commit_update(conn, kind, id, update, confirm)
}

pub fn delete_link(conn: &mut Connection, actor: &Actor, kind: LinkKind, id: i64) -> EngineResult<()> {
    let scope = link_scope(conn, kind, id)?;
    access::authorize_write(actor, link_resource(kind), Action::Delete, &scope)?;
    validator::commit_delete(conn, DeleteTarget::Link(kind, id))
}

// --- Nilai ---

pub fn record_grade(conn: &mut Connection, actor: &Actor, g: &NewGrade) -> EngineResult<GradeRecord> {
    let scope = access::course_outcome_scope(conn, g.course_outcome_id)?;
    access::authorize_write(actor, Resource::Grade, Action::Create, &scope)?;
    check_percentage(g.score, "score")?;
    require_text(&g.period, "period")?;

    let tx = immediate(conn)?;
    queries::get_course_outcome(&tx, g.course_outcome_id)?
        .filter(|c| c.is_active)
        .ok_or_else(|| EngineError::NotFound(format!("CPMK {}", g.course_outcome_id)))?;
    match queries::get_user(&tx, g.student_id)? {
        Some(u) if u.role == Role::Mahasiswa => {}
        _ => return Err(EngineError::InvalidInput(format!("user {} is not a mahasiswa", g.student_id))),
    }
    let id = insertions::insert_grade(&tx, g.student_id, g.course_outcome_id, g.score, &g.period)?;
    let created = queries::get_grade(&tx, id)?.ok_or_else(|| EngineError::Internal(format!("grade {} vanished", id)))?;
    tx.commit()?;
    tracing::info!(grade = id, student = g.student_id, course_outcome = g.course_outcome_id, "nilai recorded");
    Ok(created)
}

pub fn delete_grade(conn: &Connection, actor: &Actor, id: i64) -> EngineResult<()> {
    let grade = queries::get_grade(conn, id)?.ok_or_else(|| EngineError::NotFound(format!("grade {}", id)))?;
    let scope = access::course_outcome_scope(conn, grade.course_outcome_id)?;
    access::authorize_write(actor, Resource::Grade, Action::Delete, &scope)?;
    insertions::delete_grade(conn, id)?;
    tracing::info!(grade = id, "nilai deleted");
    Ok(())
}

// --- Profil lulusan ---

pub fn create_profile(conn: &mut Connection, actor: &Actor, cfg: &AppConfig, p: &NewProfile) -> EngineResult<GraduateProfile> {
    access::authorize_write(actor, Resource::Profile, Action::Create, &EntityScope::Program(p.program_id))?;
    require_text(&p.code, "profile code")?;
    require_text(&p.name, "profile name")?;
    let target = p.target.unwrap_or(cfg.default_target);
    check_percentage(target, "target")?;

    let tx = immediate(conn)?;
    if queries::get_program(&tx, p.program_id)?.is_none() {
        return Err(EngineError::NotFound(format!("program {}", p.program_id)));
    }
    for oid in &p.outcome_ids {
        match queries::get_outcome(&tx, *oid)? {
            Some(o) if o.is_active && o.program_id == p.program_id => {}
            _ => return Err(EngineError::InvalidInput(format!("CPL {} is not an active CPL of this program", oid))),
        }
    }
    let id = insertions::insert_profile(&tx, p.program_id, p.curriculum.as_deref(), &p.code, &p.name, target, &p.outcome_ids)?;
    let created = queries::get_profile(&tx, id)?.ok_or_else(|| EngineError::Internal(format!("profile {} vanished", id)))?;
    tx.commit()?;
    tracing::info!(profile = id, outcomes = p.outcome_ids.len(), "profil lulusan created");
    Ok(created)
}

pub fn profile_achievement(conn: &Connection, actor: &Actor, profile_id: i64, student_id: i64) -> EngineResult<f64> {
    let profile = queries::get_profile(conn, profile_id)?
        .ok_or_else(|| EngineError::NotFound(format!("profile {}", profile_id)))?;
    let scope = EntityScope::Student { program_id: Some(profile.program_id), student_id };
    access::authorize_read(actor, Resource::Profile, &scope)?;
    reporter::profile_achievement(conn, profile_id, student_id)
}

// --- Reports ---

fn readable_outcome(conn: &Connection, actor: &Actor, outcome_id: i64) -> EngineResult<Outcome> {
    let outcome = queries::get_outcome(conn, outcome_id)?
        .filter(|o| o.is_active)
        .ok_or_else(|| EngineError::NotFound(format!("CPL {}", outcome_id)))?;
    access::authorize_read(actor, Resource::Outcome, &EntityScope::Program(outcome.program_id))?;
    Ok(outcome)
}

pub fn outcome_achievement(
    conn: &Connection,
    actor: &Actor,
    cfg: &AppConfig,
    outcome_id: i64,
    scope: &ReportScope,
) -> EngineResult<Achievement> {
    readable_outcome(conn, actor, outcome_id)?;
    reporter::outcome_achievement(conn, outcome_id, scope, cfg.student_pass_threshold)
}

pub fn outcome_trend(conn: &Connection, actor: &Actor, outcome_id: i64, program_id: Option<i64>) -> EngineResult<TrendReport> {
    readable_outcome(conn, actor, outcome_id)?;
    reporter::outcome_trend(conn, outcome_id, program_id)
}

pub fn top_outcomes(conn: &Connection, actor: &Actor, program_id: i64, n: usize) -> EngineResult<Vec<ScoredEntry>> {
    access::authorize_read(actor, Resource::Outcome, &EntityScope::Program(program_id))?;
    reporter::top_outcomes(conn, program_id, n)
}
