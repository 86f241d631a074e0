//! Error types for the capaian engine.
//!
//! Every expected rejection (bad weight, duplicate pair, budget overflow,
//! graded entity, authorization) is a variant with a structured payload.
//! The HTTP layer maps `code()` to a status; nothing parses the message text.

use serde::Serialize;
use thiserror::Error;

use crate::ledger::Scope;

/// Kind of weighted link handled by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    /// CPMK -> CPL
    CplMapping,
    /// CPMK -> teknik penilaian
    Technique,
    /// CPMK -> Sub-CPMK
    SubCpmk,
    /// Sub-CPMK -> teknik penilaian
    SubCpmkTechnique,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::CplMapping => "cpl-mapping",
            LinkKind::Technique => "technique",
            LinkKind::SubCpmk => "sub-cpmk",
            LinkKind::SubCpmkTechnique => "sub-cpmk-technique",
        }
    }

    pub fn parse(s: &str) -> Option<LinkKind> {
        match s.trim().to_lowercase().as_str() {
            "cpl-mapping" | "cpl" => Some(LinkKind::CplMapping),
            "technique" | "teknik" => Some(LinkKind::Technique),
            "sub-cpmk" => Some(LinkKind::SubCpmk),
            "sub-cpmk-technique" | "sub-cpmk-teknik" => Some(LinkKind::SubCpmkTechnique),
            _ => None,
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization denials, one per resource/action pair the UI localizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ForbiddenKind {
    Mk,
    Cpl,
    Cpmk,
    EditCpmk,
    DeleteCpmk,
    Pemetaan,
    Teknik,
    SubCpmk,
    Profil,
    Nilai,
    Import,
    /// Faculties, programs and user accounts.
    MasterData,
}

impl ForbiddenKind {
    pub fn code(&self) -> &'static str {
        match self {
            ForbiddenKind::Mk => "FORBIDDEN_MK",
            ForbiddenKind::Cpl => "FORBIDDEN_CPL",
            ForbiddenKind::Cpmk => "FORBIDDEN_CPMK",
            ForbiddenKind::EditCpmk => "FORBIDDEN_EDIT_CPMK",
            ForbiddenKind::DeleteCpmk => "FORBIDDEN_DELETE_CPMK",
            ForbiddenKind::Pemetaan => "FORBIDDEN_PEMETAAN",
            ForbiddenKind::Teknik => "FORBIDDEN_TEKNIK",
            ForbiddenKind::SubCpmk => "FORBIDDEN_SUB_CPMK",
            ForbiddenKind::Profil => "FORBIDDEN_PROFIL",
            ForbiddenKind::Nilai => "FORBIDDEN_NILAI",
            ForbiddenKind::Import => "FORBIDDEN_IMPORT",
            ForbiddenKind::MasterData => "FORBIDDEN_MASTER_DATA",
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid weight: {0}")]
    InvalidWeight(String),

    #[error("duplicate {kind} link: {detail}")]
    Duplicate { kind: LinkKind, detail: String },

    #[error("weight {requested} exceeds remaining {remaining} in {scope}")]
    OverBudget {
        scope: Scope,
        requested: f64,
        remaining: f64,
        /// The other side of a bipartite check and its remainder, if any.
        counterpart: Option<(Scope, f64)>,
    },

    #[error("referenced by {count} grade records")]
    InUse { count: i64 },

    #[error("forbidden: {}", .0.code())]
    Forbidden(ForbiddenKind),

    #[error("{0} not found")]
    NotFound(String),

    #[error("update would delete {mappings} sub-CPMK mappings")]
    ConfirmationRequired { mappings: i64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Stable machine-readable code, surfaced as `error` in HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::InvalidWeight(_) => "INVALID_WEIGHT",
            EngineError::Duplicate { .. } => "DUPLICATE",
            EngineError::OverBudget { .. } => "OVER_BUDGET",
            EngineError::InUse { .. } => "IN_USE",
            EngineError::Forbidden(kind) => kind.code(),
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::ConfirmationRequired { .. } => "CONFIRMATION_REQUIRED",
            EngineError::Database(_)
            | EngineError::Io(_)
            | EngineError::Json(_)
            | EngineError::Internal(_) => "INTERNAL",
        }
    }

    /// Human readable detail for the caller. Counts are rendered literally.
    pub fn detail(&self) -> Option<String> {
        match self {
            EngineError::InvalidInput(d) | EngineError::InvalidWeight(d) => Some(d.clone()),
            EngineError::Duplicate { detail, .. } => Some(detail.clone()),
            EngineError::OverBudget { scope, remaining, counterpart, .. } => {
                let mut d = format!("{}: {}", scope.remaining_label(), fmt_pct(*remaining));
                if let Some((other, rem)) = counterpart {
                    d.push_str(&format!("; {}: {}", other.remaining_label(), fmt_pct(*rem)));
                }
                Some(d)
            }
            EngineError::InUse { count } => Some(count.to_string()),
            EngineError::NotFound(what) => Some(what.clone()),
            EngineError::ConfirmationRequired { mappings } => Some(mappings.to_string()),
            _ => None,
        }
    }

    /// Whether the caller can fix the request and resubmit.
    pub fn is_expected(&self) -> bool {
        self.code() != "INTERNAL"
    }
}

/// Prints whole percentages without a trailing `.0`.
pub fn fmt_pct(v: f64) -> String {
    if (v.fract()).abs() < 1e-9 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}
