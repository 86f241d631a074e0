//! Access policy: who may read or write which entity instance.
//!
//! The actor is loaded from persistence for every request and passed in
//! explicitly; there is no process-wide permission cache.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

use crate::db::queries;
use crate::error::{EngineError, EngineResult, ForbiddenKind};
use crate::models::Role;

/// Authenticated caller, as supplied by the identity layer.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub program_id: Option<i64>,
    /// Courses the actor is pengampu of (only meaningful for dosen).
    pub taught_course_ids: HashSet<i64>,
}

impl Actor {
    pub fn admin(id: i64) -> Self {
        Actor { id, role: Role::Admin, program_id: None, taught_course_ids: HashSet::new() }
    }
}

/// Ownership of the entity being touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityScope {
    /// Program-level entity (CPL, profil lulusan).
    Program(i64),
    /// Anything living under a course (CPMK and its weighted links, nilai).
    Course { program_id: i64, course_id: i64 },
    /// A student's own records.
    Student { program_id: Option<i64>, student_id: i64 },
}

impl EntityScope {
    pub fn program_id(&self) -> Option<i64> {
        match *self {
            EntityScope::Program(p) => Some(p),
            EntityScope::Course { program_id, .. } => Some(program_id),
            EntityScope::Student { program_id, .. } => program_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Course,
    Outcome,
    CourseOutcome,
    OutcomeMapping,
    Technique,
    SubOutcome,
    SubOutcomeAssessment,
    Profile,
    Grade,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Edit,
    Delete,
}

/// Load the actor for `user_id`, including the pengampu set.
pub fn load_actor(conn: &Connection, user_id: i64) -> EngineResult<Option<Actor>> {
    let user = match queries::get_user(conn, user_id)? {
        Some(u) => u,
        None => return Ok(None),
    };
    let taught_course_ids = if user.role == Role::Dosen {
        queries::taught_course_ids(conn, user.id)?
    } else {
        HashSet::new()
    };
    Ok(Some(Actor { id: user.id, role: user.role, program_id: user.program_id, taught_course_ids }))
}

pub fn can_write(actor: &Actor, scope: &EntityScope) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Kaprodi => actor.program_id.is_some() && actor.program_id == scope.program_id(),
        Role::Dosen => match scope {
            EntityScope::Course { course_id, .. } => actor.taught_course_ids.contains(course_id),
            _ => false,
        },
        Role::Mahasiswa => false,
    }
}

pub fn can_read(actor: &Actor, scope: &EntityScope) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Kaprodi => actor.program_id.is_some() && actor.program_id == scope.program_id(),
        Role::Dosen => {
            let same_program = actor.program_id.is_some() && actor.program_id == scope.program_id();
            match scope {
                EntityScope::Course { course_id, .. } => same_program || actor.taught_course_ids.contains(course_id),
                _ => same_program,
            }
        }
        Role::Mahasiswa => matches!(scope, EntityScope::Student { student_id, .. } if *student_id == actor.id),
    }
}

/// Distinct denial code for each resource/action pair.
pub fn forbidden_kind(resource: Resource, action: Action) -> ForbiddenKind {
    match (resource, action) {
        (Resource::Course, _) => ForbiddenKind::Mk,
        (Resource::Outcome, _) => ForbiddenKind::Cpl,
        (Resource::CourseOutcome, Action::Create) => ForbiddenKind::Cpmk,
        (Resource::CourseOutcome, Action::Edit) => ForbiddenKind::EditCpmk,
        (Resource::CourseOutcome, Action::Delete) => ForbiddenKind::DeleteCpmk,
        (Resource::OutcomeMapping, _) => ForbiddenKind::Pemetaan,
        (Resource::Technique, _) => ForbiddenKind::Teknik,
        (Resource::SubOutcome, _) | (Resource::SubOutcomeAssessment, _) => ForbiddenKind::SubCpmk,
        (Resource::Profile, _) => ForbiddenKind::Profil,
        (Resource::Grade, _) => ForbiddenKind::Nilai,
        (Resource::Import, _) => ForbiddenKind::Import,
    }
}

pub fn authorize_write(actor: &Actor, resource: Resource, action: Action, scope: &EntityScope) -> EngineResult<()> {
    if can_write(actor, scope) {
        return Ok(());
    }
    let kind = forbidden_kind(resource, action);
    tracing::warn!(actor = actor.id, role = actor.role.as_str(), code = kind.code(), "write denied");
    Err(EngineError::Forbidden(kind))
}

/// Gate for a mapping import into `program_id`. Kaprodi and admin pass as
/// for any program write; a dosen of the program may start one, and each
/// row is then checked against the courses it teaches.
pub fn authorize_mapping_import(actor: &Actor, program_id: i64) -> EngineResult<()> {
    let dosen_of_program = actor.role == Role::Dosen && actor.program_id == Some(program_id);
    if dosen_of_program {
        return Ok(());
    }
    authorize_write(actor, Resource::Import, Action::Create, &EntityScope::Program(program_id))
}

/// Read checks report the resource's generic denial code.
pub fn authorize_read(actor: &Actor, resource: Resource, scope: &EntityScope) -> EngineResult<()> {
    if can_read(actor, scope) {
        return Ok(());
    }
    Err(EngineError::Forbidden(forbidden_kind(resource, Action::Edit)))
}

// --- Scope resolution ---

pub fn course_scope(conn: &Connection, course_id: i64) -> EngineResult<EntityScope> {
    let course = queries::get_course(conn, course_id)?
        .ok_or_else(|| EngineError::NotFound(format!("course {}", course_id)))?;
    Ok(EntityScope::Course { program_id: course.program_id, course_id: course.id })
}

pub fn course_outcome_scope(conn: &Connection, course_outcome_id: i64) -> EngineResult<EntityScope> {
    let (course_id, program_id) = queries::course_outcome_owner(conn, course_outcome_id)?
        .ok_or_else(|| EngineError::NotFound(format!("CPMK {}", course_outcome_id)))?;
    Ok(EntityScope::Course { program_id, course_id })
}
