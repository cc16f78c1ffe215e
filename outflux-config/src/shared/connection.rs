use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio_postgres::{Config as TokioPgConnectOptions, config::SslMode as TokioPgSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Connection settings for the InfluxDB 1.x HTTP API used as migration source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InfluxConnectionConfig {
    /// Base URL of the InfluxDB server, e.g. `http://localhost:8086`.
    pub url: String,
    /// Database that holds the measures to migrate.
    pub database: String,
    /// Username for basic authentication, if the server requires it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password for basic authentication. Redacted in debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SerializableSecretString>,
}

impl InfluxConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::EmptyName("source.url"));
        }

        if self.database.trim().is_empty() {
            return Err(ValidationError::EmptyName("source.database"));
        }

        Ok(())
    }
}

/// Configuration for connecting to the Postgres/TimescaleDB destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. Redacted in debug output.
    pub password: Option<SerializableSecretString>,
    /// TLS configuration for secure connections.
    #[serde(default)]
    pub tls: TlsConfig,
}

/// TLS settings for secure Postgres connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    /// Whether TLS is enabled for the connection.
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Validates the [`TlsConfig`].
    ///
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled but no
    /// certificates are provided.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts a connection configuration into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Connect options without a database, used for server level administration.
    fn without_db(&self) -> Output;

    /// Connect options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> TokioPgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            TokioPgSslMode::Require
        } else {
            TokioPgSslMode::Prefer
        };
        let mut config = TokioPgConnectOptions::new();
        config
            .host(self.host.clone())
            .port(self.port)
            .user(self.username.clone())
            // Certificates are handled by the rustls connector, only the mode is set here.
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }

    fn with_db(&self) -> TokioPgConnectOptions {
        let mut options: TokioPgConnectOptions = self.without_db();
        options.dbname(self.name.clone());
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_enabled_without_certs_is_rejected() {
        let tls = TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        };
        assert!(matches!(
            tls.validate(),
            Err(ValidationError::MissingTrustedRootCerts)
        ));
    }

    #[test]
    fn with_db_sets_database_name() {
        let config = PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "metrics".to_string(),
            username: "postgres".to_string(),
            password: None,
            tls: TlsConfig::default(),
        };
        let options: TokioPgConnectOptions = config.with_db();
        assert_eq!(options.get_dbname(), Some("metrics"));
        assert_eq!(options.get_ports(), &[5432]);
    }

    #[test]
    fn influx_config_requires_database() {
        let config = InfluxConnectionConfig {
            url: "http://localhost:8086".to_string(),
            database: " ".to_string(),
            username: None,
            password: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyName("source.database"))
        ));
    }
}
