// --- capaian: CPL/CPMK mapping service ---

use capaian::{db, run_server, AppConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("capaian=info".parse()?))
        .init();

    let config = AppConfig::from_env();
    {
        let conn = db::open_connection(&config)?;
        db::init_schema(&conn)?;
    }
    tracing::info!(db = %config.db_path.display(), "schema ready");

    run_server(config).await?;
    Ok(())
}
