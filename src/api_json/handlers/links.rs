//! Weighted link endpoints: `/links` and `/links/{kind}/{id}`.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::api_json::{created, error_response, ok, run_as, AuthenticatedUser};
use crate::config::AppConfig;
use crate::error::{EngineError, LinkKind};
use crate::service;
use crate::validator::{LinkProposal, LinkUpdate};

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

fn parse_kind(raw: &str) -> Result<LinkKind, HttpResponse> {
    LinkKind::parse(raw).ok_or_else(|| error_response(&EngineError::InvalidInput(format!("unknown link kind '{}'", raw))))
}

/// Dry run: reports the state the proposal would reach.
pub async fn validate_link_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<LinkProposal>,
) -> impl Responder {
    let link = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::check_link(conn, actor, link)).await {
        Ok(state) => ok(state, "validation finished"),
        Err(resp) => resp,
    }
}

pub async fn create_link_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    body: web::Json<LinkProposal>,
) -> impl Responder {
    let link = body.into_inner();
    let kind = link.kind();
    match run_as(&cfg, user, move |conn, actor, _| service::propose_link(conn, actor, link)).await {
        Ok(id) => created(json!({"id": id, "kind": kind}), "link created"),
        Err(resp) => resp,
    }
}

pub async fn update_link_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<(String, i64)>,
    query: web::Query<ConfirmQuery>,
    body: web::Json<LinkUpdate>,
) -> impl Responder {
    let (raw_kind, id) = path.into_inner();
    let kind = match parse_kind(&raw_kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let confirm = query.confirm;
    let update = body.into_inner();
    match run_as(&cfg, user, move |conn, actor, _| service::update_link(conn, actor, kind, id, &update, confirm)).await {
        Ok(receipt) => ok(receipt, "link updated"),
        Err(resp) => resp,
    }
}

pub async fn delete_link_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<(String, i64)>,
) -> impl Responder {
    let (raw_kind, id) = path.into_inner();
    let kind = match parse_kind(&raw_kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match run_as(&cfg, user, move |conn, actor, _| service::delete_link(conn, actor, kind, id)).await {
        Ok(()) => ok(json!({"id": id, "kind": kind}), "link deleted"),
        Err(resp) => resp,
    }
}
