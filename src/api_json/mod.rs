//! JSON API plumbing shared by the handlers: the identity extractor, the
//! blocking-pool runner and the error -> status mapping.
//!
//! Success bodies are `{data, message?}`; errors are `{error, detail?}`
//! where `error` is the stable code from `EngineError::code`.

pub mod handlers;

use actix_web::dev::Payload;
use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::future::{ready, Ready};

use crate::access::{load_actor, Actor};
use crate::config::AppConfig;
use crate::db::open_connection;
use crate::error::{EngineError, EngineResult};

/// Header carrying the acting user's id, set by the identity layer in front
/// of this service.
pub const USER_HEADER: &str = "X-User-Id";

/// Caller id taken from `X-User-Id`. The full actor is loaded later, on
/// the blocking pool, for every request.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub i64);

fn unauthenticated(detail: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({"error": "UNAUTHENTICATED", "detail": detail}))
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let parsed = req
            .headers()
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok());
        ready(match parsed {
            Some(id) => Ok(AuthenticatedUser(id)),
            None => Err(InternalError::from_response(
                "missing or invalid X-User-Id",
                unauthenticated("missing or invalid X-User-Id"),
            )
            .into()),
        })
    }
}

pub fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::InvalidInput(_)
        | EngineError::InvalidWeight(_)
        | EngineError::Duplicate { .. }
        | EngineError::OverBudget { .. } => StatusCode::BAD_REQUEST,
        EngineError::Forbidden(_) | EngineError::InUse { .. } => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ConfirmationRequired { .. } => StatusCode::CONFLICT,
        EngineError::Database(_) | EngineError::Io(_) | EngineError::Json(_) | EngineError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn error_response(e: &EngineError) -> HttpResponse {
    let status = status_for(e);
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    }
    let mut body = json!({"error": e.code()});
    if let Some(d) = e.detail() {
        body["detail"] = json!(d);
    }
    HttpResponse::build(status).json(body)
}

/// 200 with `{data, message}`.
pub fn ok<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({"data": data, "message": message}))
}

/// 201 with `{data, message}`.
pub fn created<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Created().json(json!({"data": data, "message": message}))
}

/// Run `f` on the blocking pool with a fresh connection and the actor
/// loaded for `user`. Any failure is already turned into a response.
pub async fn run_as<T, F>(cfg: &web::Data<AppConfig>, user: AuthenticatedUser, f: F) -> Result<T, HttpResponse>
where
    F: FnOnce(&mut Connection, &Actor, &AppConfig) -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    let cfg = cfg.get_ref().clone();
    let res = web::block(move || -> EngineResult<Option<T>> {
        let mut conn = open_connection(&cfg)?;
        let actor = match load_actor(&conn, user.0)? {
            Some(a) => a,
            None => return Ok(None),
        };
        f(&mut conn, &actor, &cfg).map(Some)
    })
    .await;

    match res {
        Ok(Ok(Some(v))) => Ok(v),
        Ok(Ok(None)) => {
            tracing::warn!(user = user.0, "unknown user");
            Err(unauthenticated("unknown user"))
        }
        Ok(Err(e)) => Err(error_response(&e)),
        Err(e) => {
            tracing::error!(error = %e, "blocking task failed");
            Err(HttpResponse::InternalServerError().json(json!({"error": "INTERNAL"})))
        }
    }
}
