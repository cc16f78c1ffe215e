use std::fmt;
use std::io::Error;

/// Variable selecting which `configuration/{environment}.yaml` overlay the migrator reads.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

const PROD_ENV_NAME: &str = "prod";
const STAGING_ENV_NAME: &str = "staging";
const DEV_ENV_NAME: &str = "dev";

/// Where the migrator runs.
///
/// `dev` migrates into the in-memory destination and logs to the terminal. `staging` and
/// `prod` write to TimescaleDB and log JSON to rolling files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Staging,
    Dev,
}

impl Environment {
    /// Reads `APP_ENVIRONMENT`, falling back to [`Environment::Dev`] when it is unset.
    pub fn load() -> Result<Environment, Error> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(name) => name.try_into(),
            Err(_) => Ok(Environment::Dev),
        }
    }

    /// Exports this environment as `APP_ENVIRONMENT` for the rest of the process.
    pub fn set(&self) {
        // Only called from test setup, before worker threads read the environment.
        unsafe { std::env::set_var(APP_ENVIRONMENT_ENV_NAME, self.to_string()) }
    }

    /// Staging runs with the production logging setup.
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod | Self::Staging)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Environment::Prod => PROD_ENV_NAME,
            Environment::Staging => STAGING_ENV_NAME,
            Environment::Dev => DEV_ENV_NAME,
        };
        f.write_str(name)
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        match name.to_lowercase().as_str() {
            PROD_ENV_NAME => Ok(Self::Prod),
            STAGING_ENV_NAME => Ok(Self::Staging),
            DEV_ENV_NAME => Ok(Self::Dev),
            other => Err(Error::other(format!(
                "unknown environment `{other}`, expected one of \
                 {DEV_ENV_NAME}, {STAGING_ENV_NAME}, {PROD_ENV_NAME}",
            ))),
        }
    }
}
