mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use capaian::access::load_actor;
use capaian::config::AppConfig;
use capaian::db::open_connection;
use capaian::models::NewGrade;
use capaian::service;
use capaian::validator::LinkProposal;
use serde_json::{json, Value};
use tempfile::TempDir;

struct Env {
    _dir: TempDir,
    cfg: AppConfig,
    ids: common::SeedIds,
}

fn env() -> Env {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = AppConfig { db_path: dir.path().join("capaian.db"), ..AppConfig::default() };
    let conn = open_connection(&cfg).expect("open db");
    let ids = common::seed(&conn);
    Env { _dir: dir, cfg, ids }
}

macro_rules! app {
    ($cfg:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($cfg.clone()))
                .configure(capaian::server::configure),
        )
        .await
    };
}

fn uid(id: i64) -> (&'static str, String) {
    ("X-User-Id", id.to_string())
}

#[actix_web::test]
async fn test_health_is_open() {
    let env = env();
    let app = app!(env.cfg);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_identity_is_required() {
    let env = env();
    let app = app!(env.cfg);

    let req = test::TestRequest::get().uri(&format!("/programs/{}/outcomes", env.ids.program_id)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "UNAUTHENTICATED");

    let req = test::TestRequest::get()
        .uri(&format!("/programs/{}/outcomes", env.ids.program_id))
        .insert_header(uid(9999))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_create_outcome_by_role() {
    let env = env();
    let app = app!(env.cfg);
    let body = json!({"program_id": env.ids.program_id, "code": "CPL-01", "description": "Mampu menganalisis"});

    let req = test::TestRequest::post()
        .uri("/outcomes")
        .insert_header(uid(env.ids.kaprodi_id))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["data"]["code"], "CPL-01");
    assert_eq!(created["data"]["target"], 75.0);

    let req = test::TestRequest::post()
        .uri("/outcomes")
        .insert_header(uid(env.ids.mahasiswa_id))
        .set_json(&json!({"program_id": env.ids.program_id, "code": "CPL-02", "description": "x"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "FORBIDDEN_CPL");
}

/// CPL and CPMK created directly, then linked over HTTP.
fn cpl_and_cpmk(env: &Env) -> (i64, i64) {
    let mut conn = open_connection(&env.cfg).unwrap();
    let admin = load_actor(&conn, env.ids.admin_id).unwrap().unwrap();
    let cpl = service::create_outcome(
        &mut conn,
        &admin,
        &env.cfg,
        &capaian::models::NewOutcome {
            program_id: env.ids.program_id,
            code: "CPL-01".into(),
            description: "Mampu menganalisis".into(),
            category: None,
            target: None,
        },
    )
    .unwrap();
    let cpmk = service::create_course_outcome(
        &mut conn,
        &admin,
        &capaian::models::NewCourseOutcome {
            course_id: env.ids.course_id,
            code: "CPMK-1".into(),
            description: "Mampu menjelaskan".into(),
            taxonomy_levels: vec!["C2".into()],
        },
    )
    .unwrap();
    (cpl.id, cpmk.id)
}

#[actix_web::test]
async fn test_link_over_budget_reports_remaining() {
    let env = env();
    let (cpl, cpmk) = cpl_and_cpmk(&env);
    let app = app!(env.cfg);
    let link = |w: f64| json!({"kind": "cpl-mapping", "course_outcome_id": cpmk, "outcome_id": cpl, "weight": w});

    let req = test::TestRequest::post()
        .uri("/links")
        .insert_header(uid(env.ids.kaprodi_id))
        .set_json(&link(60.0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // same pair again is a duplicate; dry run on another CPL shows the budget
    let req = test::TestRequest::post()
        .uri("/links")
        .insert_header(uid(env.ids.kaprodi_id))
        .set_json(&link(10.0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "DUPLICATE");

    let technique = json!({"kind": "technique", "course_outcome_id": cpmk, "name": "UTS", "weight": 70.0});
    let req = test::TestRequest::post()
        .uri("/links")
        .insert_header(uid(env.ids.dosen_id))
        .set_json(&technique)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let too_much = json!({"kind": "technique", "course_outcome_id": cpmk, "name": "UAS", "weight": 40.0});
    let req = test::TestRequest::post()
        .uri("/links")
        .insert_header(uid(env.ids.dosen_id))
        .set_json(&too_much)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "OVER_BUDGET");
    assert_eq!(err["detail"], "Sisa Bobot Teknik Penilaian: 30");
}

#[actix_web::test]
async fn test_graded_course_outcome_is_frozen() {
    let env = env();
    let (_, cpmk) = cpl_and_cpmk(&env);
    {
        let mut conn = open_connection(&env.cfg).unwrap();
        let admin = load_actor(&conn, env.ids.admin_id).unwrap().unwrap();
        let g = NewGrade { student_id: env.ids.mahasiswa_id, course_outcome_id: cpmk, score: 80.0, period: "2024/2025-1".into() };
        service::record_grade(&mut conn, &admin, &g).unwrap();
    }
    let app = app!(env.cfg);
    let req = test::TestRequest::put()
        .uri(&format!("/course-outcomes/{}", cpmk))
        .insert_header(uid(env.ids.kaprodi_id))
        .set_json(&json!({"description": "Mampu menjelaskan ulang"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "IN_USE");
    assert_eq!(err["detail"], "1");
}

#[actix_web::test]
async fn test_technique_change_needs_confirmation() {
    let env = env();
    let (_, cpmk) = cpl_and_cpmk(&env);
    let technique = {
        let mut conn = open_connection(&env.cfg).unwrap();
        let admin = load_actor(&conn, env.ids.admin_id).unwrap().unwrap();
        let t = service::propose_link(
            &mut conn,
            &admin,
            LinkProposal::Technique { course_outcome_id: cpmk, name: "Tugas".into(), reference_type: None, weight: 40.0 },
        )
        .unwrap();
        let s = service::propose_link(
            &mut conn,
            &admin,
            LinkProposal::SubCpmk { course_outcome_id: cpmk, code: "SUB-1".into(), description: String::new(), weight: 50.0 },
        )
        .unwrap();
        service::propose_link(
            &mut conn,
            &admin,
            LinkProposal::SubCpmkTechnique { sub_outcome_id: s, technique_id: t, weight: 20.0 },
        )
        .unwrap();
        t
    };
    let app = app!(env.cfg);

    let req = test::TestRequest::put()
        .uri(&format!("/links/technique/{}", technique))
        .insert_header(uid(env.ids.dosen_id))
        .set_json(&json!({"weight": 35.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "CONFIRMATION_REQUIRED");
    assert_eq!(err["detail"], "1");

    let req = test::TestRequest::put()
        .uri(&format!("/links/technique/{}?confirm=true", technique))
        .insert_header(uid(env.ids.dosen_id))
        .set_json(&json!({"weight": 35.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["cascaded"], 1);
}

#[actix_web::test]
async fn test_malformed_requests_are_invalid_input() {
    let env = env();
    let app = app!(env.cfg);

    let req = test::TestRequest::put()
        .uri("/links/bogus/1")
        .insert_header(uid(env.ids.admin_id))
        .set_json(&json!({"weight": 10.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "INVALID_INPUT");

    let req = test::TestRequest::post()
        .uri("/links")
        .insert_header(uid(env.ids.admin_id))
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"kind\": \"technique\", \"weight\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "INVALID_INPUT");
}
