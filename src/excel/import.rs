//! Bulk import of CPL lists and CPMK->CPL mappings from spreadsheet rows.
//!
//! Rows are committed one by one through the service layer; a failing row
//! is reported and the import moves on.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use super::io::normalize_header;
use crate::access::{self, Action, Actor, EntityScope, Resource};
use crate::config::AppConfig;
use crate::db::queries;
use crate::error::{EngineError, EngineResult};
use crate::models::NewOutcome;
use crate::service;
use crate::validator::LinkProposal;

pub const OUTCOME_SHEET: &str = "CPL";
pub const MAPPING_SHEET: &str = "Pemetaan CPMK-CPL";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub message: String,
    pub success: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ImportReport {
    fn finish(mut self, what: &str) -> Self {
        self.message = if self.errors.is_empty() {
            format!("{} {} imported", self.success, what)
        } else {
            format!("{} {} imported, {} rows failed", self.success, what, self.errors.len())
        };
        self
    }
}

/// Header name -> column index, keyed by normalized header.
struct Columns(HashMap<String, usize>);

impl Columns {
    fn from_header(header: &[String]) -> Self {
        Columns(header.iter().enumerate().map(|(i, h)| (normalize_header(h), i)).collect())
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.0.get(&normalize_header(n)).copied())
    }

    fn require(&self, names: &[&str]) -> EngineResult<usize> {
        self.find(names)
            .ok_or_else(|| EngineError::InvalidInput(format!("missing column '{}'", names[0])))
    }
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("")
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

/// "40", "40%" and "40,5" are all accepted.
pub fn parse_weight(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_end_matches('%').trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn describe(e: &EngineError) -> String {
    match e {
        EngineError::OverBudget { .. } | EngineError::InUse { .. } => match e.detail() {
            Some(d) => format!("{} ({})", e, d),
            None => e.to_string(),
        },
        _ => e.to_string(),
    }
}

/// Import the `CPL` sheet into `program_id`. Columns: kode cpl, deskripsi,
/// and optionally kategori and target.
pub fn import_outcome_rows(
    conn: &mut Connection,
    actor: &Actor,
    cfg: &AppConfig,
    program_id: i64,
    rows: &[Vec<String>],
) -> EngineResult<ImportReport> {
    access::authorize_write(actor, Resource::Import, Action::Create, &EntityScope::Program(program_id))?;
    let header = rows
        .first()
        .ok_or_else(|| EngineError::InvalidInput(format!("sheet '{}' is empty", OUTCOME_SHEET)))?;
    let cols = Columns::from_header(header);
    let code_col = cols.require(&["kode cpl", "kode"])?;
    let desc_col = cols.require(&["deskripsi", "deskripsi cpl"])?;
    let cat_col = cols.find(&["kategori"]);
    let target_col = cols.find(&["target"]);

    let mut report = ImportReport::default();
    for (i, row) in rows.iter().enumerate().skip(1) {
        if is_blank(row) {
            continue;
        }
        let row_no = i + 1;
        let code = cell(row, Some(code_col));
        let raw_target = cell(row, target_col);
        let target = if raw_target.is_empty() {
            None
        } else {
            match parse_weight(raw_target) {
                Some(t) => Some(t),
                None => {
                    report.errors.push(format!("Row {} ({}): invalid target '{}'", row_no, code, raw_target));
                    continue;
                }
            }
        };
        let category = Some(cell(row, cat_col)).filter(|c| !c.is_empty()).map(str::to_string);
        let new = NewOutcome {
            program_id,
            code: code.to_string(),
            description: cell(row, Some(desc_col)).to_string(),
            category,
            target,
        };
        match service::create_outcome(conn, actor, cfg, &new) {
            Ok(_) => report.success += 1,
            Err(e) if e.is_expected() => report.errors.push(format!("Row {} ({}): {}", row_no, code, describe(&e))),
            Err(e) => return Err(e),
        }
    }
    tracing::info!(program = program_id, success = report.success, failed = report.errors.len(), "CPL import done");
    Ok(report.finish("CPL"))
}

/// Import the `Pemetaan CPMK-CPL` sheet into `program_id`. Columns: kode mk,
/// kode cpmk, kode cpl, bobot. Course and CPL codes resolve inside that
/// program only.
pub fn import_mapping_rows(
    conn: &mut Connection,
    actor: &Actor,
    program_id: i64,
    rows: &[Vec<String>],
) -> EngineResult<ImportReport> {
    access::authorize_mapping_import(actor, program_id)?;
    if queries::get_program(conn, program_id)?.is_none() {
        return Err(EngineError::NotFound(format!("program {}", program_id)));
    }
    let header = rows
        .first()
        .ok_or_else(|| EngineError::InvalidInput(format!("sheet '{}' is empty", MAPPING_SHEET)))?;
    let cols = Columns::from_header(header);
    let mc = MappingColumns {
        mk: cols.require(&["kode mk", "kode matakuliah"])?,
        cpmk: cols.require(&["kode cpmk"])?,
        cpl: cols.require(&["kode cpl"])?,
        weight: cols.require(&["bobot", "bobot (%)"])?,
    };

    let mut report = ImportReport::default();
    for (i, row) in rows.iter().enumerate().skip(1) {
        if is_blank(row) {
            continue;
        }
        let row_no = i + 1;
        let label = format!("{} -> {}", cell(row, Some(mc.cpmk)), cell(row, Some(mc.cpl)));
        match import_mapping_row(conn, actor, program_id, &mc, row) {
            Ok(_) => report.success += 1,
            Err(e) if e.is_expected() => report.errors.push(format!("Row {} ({}): {}", row_no, label, describe(&e))),
            Err(e) => return Err(e),
        }
    }
    tracing::info!(program = program_id, actor = actor.id, success = report.success, failed = report.errors.len(), "mapping import done");
    Ok(report.finish("mappings"))
}

struct MappingColumns {
    mk: usize,
    cpmk: usize,
    cpl: usize,
    weight: usize,
}

fn import_mapping_row(
    conn: &mut Connection,
    actor: &Actor,
    program_id: i64,
    cols: &MappingColumns,
    row: &[String],
) -> EngineResult<i64> {
    let mk = cell(row, Some(cols.mk));
    let course = queries::find_course_by_code(conn, program_id, mk)?
        .ok_or_else(|| EngineError::InvalidInput(format!("course {} not found in program {}", mk, program_id)))?;
    let cpmk_code = cell(row, Some(cols.cpmk));
    let cpmk = queries::find_course_outcome_by_code(conn, course.id, cpmk_code)?
        .ok_or_else(|| EngineError::InvalidInput(format!("CPMK {} not found in {}", cpmk_code, course.code)))?;
    let cpl_code = cell(row, Some(cols.cpl));
    let outcome = queries::find_outcome_by_code(conn, program_id, cpl_code)?
        .ok_or_else(|| EngineError::InvalidInput(format!("CPL {} not found", cpl_code)))?;
    let raw = cell(row, Some(cols.weight));
    let weight = parse_weight(raw).ok_or_else(|| EngineError::InvalidWeight(format!("bobot '{}' is not a number", raw)))?;

    service::propose_link(
        conn,
        actor,
        LinkProposal::CplMapping { course_outcome_id: cpmk.id, outcome_id: outcome.id, weight },
    )
}
