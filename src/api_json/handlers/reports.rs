use actix_web::{web, Responder};
use serde::Deserialize;

use crate::api_json::{ok, run_as, AuthenticatedUser};
use crate::config::AppConfig;
use crate::reporter::ReportScope;
use crate::service;

const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    #[serde(default)]
    pub program_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    #[serde(default)]
    pub n: Option<usize>,
}

pub async fn achievement_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    query: web::Query<ReportScope>,
) -> impl Responder {
    let outcome_id = path.into_inner();
    let scope = query.into_inner();
    match run_as(&cfg, user, move |conn, actor, cfg| service::outcome_achievement(conn, actor, cfg, outcome_id, &scope)).await {
        Ok(a) => ok(a, "CPL achievement"),
        Err(resp) => resp,
    }
}

pub async fn trend_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    query: web::Query<TrendQuery>,
) -> impl Responder {
    let outcome_id = path.into_inner();
    let program_id = query.program_id;
    match run_as(&cfg, user, move |conn, actor, _| service::outcome_trend(conn, actor, outcome_id, program_id)).await {
        Ok(t) => ok(t, "CPL trend"),
        Err(resp) => resp,
    }
}

pub async fn top_outcomes_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    query: web::Query<TopQuery>,
) -> impl Responder {
    let program_id = path.into_inner();
    let n = query.n.unwrap_or(DEFAULT_TOP_N);
    match run_as(&cfg, user, move |conn, actor, _| service::top_outcomes(conn, actor, program_id, n)).await {
        Ok(list) => ok(list, "top CPL"),
        Err(resp) => resp,
    }
}
