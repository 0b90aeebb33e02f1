use std::fs;
use std::path::Path;

use tracing::info;

use super::Context;
use crate::capacity::DailySchedule;
use crate::config::ServiceConfig;
use crate::store::{SqliteStore, Store};

pub fn run_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if force || !config_path.exists() {
        let config = ServiceConfig::default();
        fs::write(config_path, config.to_toml()?)?;
        println!("Wrote default config to {}", config_path.display());
    }

    let config = ServiceConfig::load(config_path)?;
    fs::create_dir_all(&config.data_dir)?;

    let db_path = config.db_path();
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    println!("Tenant registry ready at {}", db_path.display());
    if config.mysql.is_none() && config.postgres.is_none() {
        println!(
            "No admin endpoints configured. Add [mysql] / [postgres] sections to {} \
             or set ADMIN_MYSQL_* / ADMIN_PSQL_* variables.",
            config_path.display()
        );
    }
    Ok(())
}

pub async fn run_sweep(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let report = ctx.enforcer().sweep().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Measured {}, skipped {}, warned {}, breached {}, cleared {}, failed {}",
            report.measured,
            report.skipped,
            report.warned,
            report.breached,
            report.cleared,
            report.failed
        );
    }
    Ok(())
}

pub async fn run_serve(ctx: &Context) -> anyhow::Result<()> {
    let schedule = DailySchedule::from_config(&ctx.config.capacity)?;
    info!(
        "capacity enforcer running daily at {} (UTC{})",
        ctx.config.capacity.run_at, ctx.config.capacity.utc_offset
    );

    ctx.enforcer()
        .run(schedule, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
            }
        })
        .await;
    Ok(())
}
