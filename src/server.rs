use actix_cors::Cors;
use actix_web::error::InternalError;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use serde_json::json;

use crate::api_json::handlers::*;
use crate::config::AppConfig;

fn bad_request(detail: String) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({"error": "INVALID_INPUT", "detail": detail}))
}

/// Malformed JSON bodies and query strings answer with the same error shape
/// as validation failures.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        let detail = err.to_string();
        InternalError::from_response(err, bad_request(detail)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        let detail = err.to_string();
        InternalError::from_response(err, bad_request(detail)).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _| {
        let detail = err.to_string();
        InternalError::from_response(err, bad_request(detail)).into()
    }));
}

/// Every route of the service. Shared by `run_server` and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    extractor_configs(cfg);
    cfg.route("/health", web::get().to(health_handler))
        .route("/faculties", web::post().to(create_faculty_handler))
        .route("/programs", web::post().to(create_program_handler))
        .route("/courses", web::post().to(create_course_handler))
        .route("/users", web::post().to(create_user_handler))
        .route("/courses/{id}/lecturers", web::post().to(assign_lecturer_handler))
        .route("/programs/{id}/outcomes", web::get().to(list_outcomes_handler))
        .route("/outcomes", web::post().to(create_outcome_handler))
        .route("/outcomes/{id}", web::put().to(update_outcome_handler))
        .route("/outcomes/{id}", web::delete().to(delete_outcome_handler))
        .route("/courses/{id}/course-outcomes", web::get().to(list_course_outcomes_handler))
        .route("/course-outcomes", web::post().to(create_course_outcome_handler))
        .route("/course-outcomes/{id}", web::put().to(update_course_outcome_handler))
        .route("/course-outcomes/{id}", web::delete().to(delete_course_outcome_handler))
        .route("/course-outcomes/{id}/weights", web::get().to(course_outcome_weights_handler))
        .route("/links/validate", web::post().to(validate_link_handler))
        .route("/links", web::post().to(create_link_handler))
        .route("/links/{kind}/{id}", web::put().to(update_link_handler))
        .route("/links/{kind}/{id}", web::delete().to(delete_link_handler))
        .route("/grades", web::post().to(record_grade_handler))
        .route("/grades/{id}", web::delete().to(delete_grade_handler))
        .route("/profiles", web::post().to(create_profile_handler))
        .route("/profiles/{id}/students/{sid}", web::get().to(profile_student_handler))
        .route("/reports/outcomes/{id}/achievement", web::get().to(achievement_handler))
        .route("/reports/outcomes/{id}/trend", web::get().to(trend_handler))
        .route("/reports/programs/{id}/top", web::get().to(top_outcomes_handler))
        .route("/import/outcomes", web::post().to(import_outcomes_handler))
        .route("/import/mappings", web::post().to(import_mappings_handler));
}

fn cors(origin: Option<&str>) -> Cors {
    match origin {
        Some(o) => Cors::default().allowed_origin(o).allow_any_method().allow_any_header(),
        None => Cors::permissive(),
    }
}

pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let data = web::Data::new(config);
    tracing::info!(bind = %bind_addr, db = %data.db_path.display(), "starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors(data.cors_origin.as_deref()))
            .app_data(data.clone())
            .configure(configure)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
