//! Nilai and profil lulusan endpoints.

use actix_web::{web, Responder};
use serde_json::json;

use crate::api_json::{created, ok, run_as, AuthenticatedUser};
use crate::config::AppConfig;
use crate::models::{NewGrade, NewProfile};
use crate::service;

pub async fn record_grade_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewGrade>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::record_grade(conn, actor, &body)).await {
        Ok(g) => created(g, "nilai recorded"),
        Err(resp) => resp,
    }
}

pub async fn delete_grade_handler(cfg: web::Data<AppConfig>, user: AuthenticatedUser, path: web::Path<i64>) -> impl Responder {
    let id = path.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::delete_grade(conn, actor, id)).await {
        Ok(()) => ok(json!({"id": id}), "nilai deleted"),
        Err(resp) => resp,
    }
}

pub async fn create_profile_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewProfile>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, cfg| service::create_profile(conn, actor, cfg, &body)).await {
        Ok(p) => created(p, "profil lulusan created"),
        Err(resp) => resp,
    }
}

pub async fn profile_student_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<(i64, i64)>,
) -> impl Responder {
    let (profile_id, student_id) = path.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::profile_achievement(conn, actor, profile_id, student_id)).await {
        Ok(score) => ok(
            json!({"profile_id": profile_id, "student_id": student_id, "achievement": score}),
            "profile achievement",
        ),
        Err(resp) => resp,
    }
}
