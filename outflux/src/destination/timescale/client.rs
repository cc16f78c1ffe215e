use std::io::BufReader;

use outflux_config::shared::{IntoConnectOptions, PgConnectionConfig};
use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, Connection, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, error, info};

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// Spawns a background task driving a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        if let Err(e) = connection.await {
            error!("an error occurred during the postgres connection: {}", e);
            return;
        }

        info!("postgres connection terminated successfully")
    }
    .instrument(span);

    tokio::spawn(task);
}

/// Keeps server reported errors, like failed authentication, and treats the rest as a failure
/// to reach the server.
fn connect_error(err: tokio_postgres::Error) -> EtlError {
    if err.code().is_some() {
        return err.into();
    }

    etl_error!(
        ErrorKind::DestinationConnectionFailed,
        "Failed to connect to PostgreSQL",
        err
    )
}

/// Connects to the destination database, over TLS when enabled in `config`.
pub async fn connect(config: &PgConnectionConfig) -> EtlResult<Client> {
    config.tls.validate()?;

    let options: Config = config.with_db();
    if !config.tls.enabled {
        let (client, connection) = options.connect(NoTls).await.map_err(connect_error)?;
        spawn_postgres_connection::<NoTls>(connection);

        info!(host = %config.host, database = %config.name, "connected to postgres without tls");

        return Ok(client);
    }

    let mut root_store = rustls::RootCertStore::empty();
    let mut root_certs_reader = BufReader::new(config.tls.trusted_root_certs.as_bytes());
    for cert in rustls_pemfile::certs(&mut root_certs_reader) {
        let cert = cert?;
        root_store.add(cert)?;
    }

    let tls_config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let (client, connection) = options
        .connect(MakeRustlsConnect::new(tls_config))
        .await
        .map_err(connect_error)?;
    spawn_postgres_connection::<MakeRustlsConnect>(connection);

    info!(host = %config.host, database = %config.name, "connected to postgres with tls");

    Ok(client)
}
