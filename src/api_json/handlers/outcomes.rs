//! CPL and CPMK endpoints.

use actix_web::{web, Responder};
use serde_json::json;

use crate::api_json::{created, ok, run_as, AuthenticatedUser};
use crate::config::AppConfig;
use crate::models::{CourseOutcomeUpdate, NewCourseOutcome, NewOutcome, OutcomeUpdate};
use crate::service;

pub async fn list_outcomes_handler(cfg: web::Data<AppConfig>, user: AuthenticatedUser, path: web::Path<i64>) -> impl Responder {
    let program_id = path.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::list_outcomes(conn, actor, program_id)).await {
        Ok(list) => ok(list, "CPL list"),
        Err(resp) => resp,
    }
}

pub async fn create_outcome_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewOutcome>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, cfg| service::create_outcome(conn, actor, cfg, &body)).await {
        Ok(o) => created(o, "CPL created"),
        Err(resp) => resp,
    }
}

pub async fn update_outcome_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: web::Json<OutcomeUpdate>,
) -> impl Responder {
    let id = path.into_inner();
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::update_outcome(conn, actor, id, &body)).await {
        Ok(o) => ok(o, "CPL updated"),
        Err(resp) => resp,
    }
}

pub async fn delete_outcome_handler(cfg: web::Data<AppConfig>, user: AuthenticatedUser, path: web::Path<i64>) -> impl Responder {
    let id = path.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::delete_outcome(conn, actor, id)).await {
        Ok(()) => ok(json!({"id": id}), "CPL deleted"),
        Err(resp) => resp,
    }
}

pub async fn list_course_outcomes_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> impl Responder {
    let course_id = path.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::list_course_outcomes(conn, actor, course_id)).await {
        Ok(list) => ok(list, "CPMK list"),
        Err(resp) => resp,
    }
}

pub async fn create_course_outcome_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewCourseOutcome>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::create_course_outcome(conn, actor, &body)).await {
        Ok(c) => created(c, "CPMK created"),
        Err(resp) => resp,
    }
}

pub async fn update_course_outcome_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: web::Json<CourseOutcomeUpdate>,
) -> impl Responder {
    let id = path.into_inner();
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::update_course_outcome(conn, actor, id, &body)).await {
        Ok(c) => ok(c, "CPMK updated"),
        Err(resp) => resp,
    }
}

pub async fn delete_course_outcome_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::delete_course_outcome(conn, actor, id)).await {
        Ok(()) => ok(json!({"id": id}), "CPMK deleted"),
        Err(resp) => resp,
    }
}

/// Total and remaining bobot of one CPMK.
pub async fn course_outcome_weights_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::weight_summary(conn, actor, id)).await {
        Ok(summary) => ok(summary, "weight summary"),
        Err(resp) => resp,
    }
}
