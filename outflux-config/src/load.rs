use std::path::Path;

use serde::de::DeserializeOwned;

use crate::environment::Environment;

const CONFIGURATION_DIR: &str = "configuration";
const BASE_CONFIG_FILE: &str = "base.yaml";

/// `APP_SOURCE__DATABASE=telegraf` overrides `source.database`.
const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_SEPARATOR: &str = "__";

/// `APP_MEASURES=cpu,mem` fills a list key.
const LIST_SEPARATOR: &str = ",";

/// A configuration root that can be loaded with [`load_config`].
pub trait Config {
    /// Keys whose environment override is split on `,` into a list.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Loads `T` from the `configuration` directory under the working directory.
///
/// Sources are layered: `base.yaml`, then the optional `{environment}.yaml`, then `APP_`
/// variables. Later sources win.
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: Config + DeserializeOwned,
{
    let working_dir = std::env::current_dir().map_err(|err| {
        config::ConfigError::Message(format!("cannot resolve working directory: {err}"))
    })?;

    load_config_from(&working_dir.join(CONFIGURATION_DIR))
}

/// Loads `T` from the YAML files in `directory` and the `APP_` variables.
pub fn load_config_from<T>(directory: &Path) -> Result<T, config::ConfigError>
where
    T: Config + DeserializeOwned,
{
    let environment = Environment::load()
        .map_err(|err| config::ConfigError::Message(format!("invalid APP_ENVIRONMENT: {err}")))?;
    let overlay = directory.join(format!("{environment}.yaml"));

    config::Config::builder()
        .add_source(config::File::from(directory.join(BASE_CONFIG_FILE)))
        .add_source(config::File::from(overlay).required(false))
        .add_source(environment_overrides::<T>())
        .build()?
        .try_deserialize::<T>()
}

fn environment_overrides<T: Config>() -> config::Environment {
    let mut source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if T::LIST_PARSE_KEYS.is_empty() {
        return source;
    }

    source = source.try_parsing(true).list_separator(LIST_SEPARATOR);
    for key in T::LIST_PARSE_KEYS {
        source = source.with_list_parse_key(key);
    }

    source
}
