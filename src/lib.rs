//! `capaian`: CPL/CPMK weighted mapping and validation engine.
//!
//! Leaf components are `ledger` (remaining bobot per scope), `validator`
//! (gatekeeper for weighted links), `reporter` (read-only dashboards) and
//! `access` (role and scope checks). `service` ties them to persistence,
//! `excel` and `api_json` expose them.
pub mod access;
pub mod api_json;
pub mod config;
pub mod db;
pub mod error;
pub mod excel;
pub mod ledger;
pub mod models;
pub mod reporter;
pub mod server;
pub mod service;
pub mod validator;

pub use config::AppConfig;
pub use error::{EngineError, EngineResult};
/// Runs the HTTP server (re-exported for `main`).
pub use server::run_server;
