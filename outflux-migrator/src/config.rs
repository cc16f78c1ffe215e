use outflux_config::load_config;
use outflux_config::shared::MigratorConfig;

/// Loads the [`MigratorConfig`] and validates it.
pub fn load_migrator_config() -> anyhow::Result<MigratorConfig> {
    let config = load_config::<MigratorConfig>()?;
    config.validate()?;

    Ok(config)
}
