use outflux_config::shared::MigratorConfig;
use outflux_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_migrator_config;
use crate::core::start_migrator_with_config;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let migrator_config = load_migrator_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(migrator_config))?;

    Ok(())
}

async fn async_main(migrator_config: MigratorConfig) -> anyhow::Result<()> {
    if let Err(err) = start_migrator_with_config(migrator_config).await {
        error!("an error occurred in the migrator: {err}");

        return Err(err);
    }

    Ok(())
}
