use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::api_json::{created, ok, run_as, AuthenticatedUser};
use crate::config::AppConfig;
use crate::models::{NewCourse, NewFaculty, NewProgram, NewUser};
use crate::service;

pub async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ok", "service": "capaian"}))
}

pub async fn create_faculty_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewFaculty>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::create_faculty(conn, actor, &body)).await {
        Ok(id) => created(json!({"id": id}), "faculty created"),
        Err(resp) => resp,
    }
}

pub async fn create_program_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewProgram>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::create_program(conn, actor, &body)).await {
        Ok(id) => created(json!({"id": id}), "program created"),
        Err(resp) => resp,
    }
}

pub async fn create_course_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewCourse>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::create_course(conn, actor, &body)).await {
        Ok(id) => created(json!({"id": id}), "course created"),
        Err(resp) => resp,
    }
}

pub async fn create_user_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<NewUser>,
) -> impl Responder {
    let body = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::create_user(conn, actor, &body)).await {
        Ok(id) => created(json!({"id": id}), "user created"),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
pub struct LecturerRequest {
    pub user_id: i64,
}

pub async fn assign_lecturer_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: web::Json<LecturerRequest>,
) -> impl Responder {
    let course_id = path.into_inner();
    let lecturer = body.user_id;
    match run_as(&cfg, user, move |conn, actor, _| service::assign_lecturer(conn, actor, course_id, lecturer)).await {
        Ok(()) => ok(json!({"course_id": course_id, "user_id": lecturer}), "pengampu assigned"),
        Err(resp) => resp,
    }
}
