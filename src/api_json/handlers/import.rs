//! Spreadsheet upload endpoints. The first multipart field is stored in the
//! temp dir, read with calamine on the blocking pool, then removed.

use actix_multipart::Multipart;
use actix_web::web::Bytes;
use actix_web::{web, HttpResponse, Responder};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::api_json::{error_response, run_as, AuthenticatedUser};
use crate::config::AppConfig;
use crate::error::EngineError;
use crate::excel::{self, MAPPING_SHEET, OUTCOME_SHEET};

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub program_id: i64,
}

/// Save the first file field of `payload` to a fresh temp path. A partial
/// file is removed when the upload fails midway.
async fn save_upload(mut payload: Multipart, user: AuthenticatedUser) -> Result<PathBuf, EngineError> {
    let field_res = match payload.next().await {
        Some(f) => f,
        None => return Err(EngineError::InvalidInput("no file uploaded".to_string())),
    };
    let field = field_res.map_err(|e| EngineError::InvalidInput(format!("multipart error: {}", e)))?;
    let path = std::env::temp_dir().join(format!(
        "capaian-import-{}-{}.xlsx",
        user.0,
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    store_stream(field, &path).await?;
    Ok(path)
}

/// Write every chunk of `stream` to `path`. On failure the partial file is
/// removed before the error is returned.
async fn store_stream<S, E>(mut stream: S, path: &Path) -> Result<(), EngineError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    let written = async {
        let mut f = tokio::fs::File::create(path).await?;
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| EngineError::InvalidInput(format!("upload stream error: {}", e)))?;
            f.write_all(&bytes).await?;
        }
        f.flush().await?;
        Ok::<(), EngineError>(())
    }
    .await;
    if written.is_err() {
        remove_upload(path).await;
    }
    written
}

async fn remove_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove upload");
    }
}

fn missing_sheet(sheet: &str) -> EngineError {
    EngineError::InvalidInput(format!("sheet '{}' not found", sheet))
}

pub async fn import_outcomes_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    query: web::Query<ImportQuery>,
    payload: Multipart,
) -> impl Responder {
    let path = match save_upload(payload, user).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let program_id = query.program_id;
    let file = path.clone();
    let result = run_as(&cfg, user, move |conn, actor, cfg| {
        let rows = excel::read_sheet_rows(&file, OUTCOME_SHEET)?.ok_or_else(|| missing_sheet(OUTCOME_SHEET))?;
        excel::import_outcome_rows(conn, actor, cfg, program_id, &rows)
    })
    .await;
    remove_upload(&path).await;

    match result {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(resp) => resp,
    }
}

pub async fn import_mappings_handler(
    cfg: web::Data<AppConfig>,
    user: AuthenticatedUser,
    query: web::Query<ImportQuery>,
    payload: Multipart,
) -> impl Responder {
    let path = match save_upload(payload, user).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let program_id = query.program_id;
    let file = path.clone();
    let result = run_as(&cfg, user, move |conn, actor, _| {
        let rows = excel::read_sheet_rows(&file, MAPPING_SHEET)?.ok_or_else(|| missing_sheet(MAPPING_SHEET))?;
        excel::import_mapping_rows(conn, actor, program_id, &rows)
    })
    .await;
    remove_upload(&path).await;

    match result {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(resp) => resp,
    }
}
