use std::error;
use std::fmt;

use outflux_config::shared::ValidationError;

/// Convenient result type for migration operations using [`EtlError`] as the error type.
pub type EtlResult<T> = Result<T, EtlError>;

/// Main error type of the migration pipeline.
///
/// [`EtlError`] can represent a single error, an error with additional detail, an error
/// attributed to the pipe stage that produced it, or multiple aggregated errors.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
///
/// Users should not interact with this type directly but use [`EtlError`] methods instead.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Error returned by the pipe stage with the given id
    Stage(String, Box<EtlError>),
    /// Multiple aggregated errors
    Many(Vec<EtlError>),
}

/// Specific categories of errors that can occur while migrating a measure.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,
    DestinationConnectionFailed,

    // Query & Protocol Errors
    SourceQueryFailed,
    SourceProtocolError,
    DestinationQueryFailed,

    // Schema Errors
    InvalidSchema,
    SchemaIncompatible,
    DestinationSchemaError,
    UnsupportedType,

    // Data & Transformation Errors
    ConversionError,
    InvalidData,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    DeserializationError,

    // Security & Authentication Errors
    EncryptionError,
    AuthenticationError,
    PermissionDenied,

    // Transaction Errors
    DestinationTransactionFailed,

    // Cancellation Errors
    Cancelled,
    DuplicateSubscriber,
    UnknownSubscriber,
    AlreadyClosed,

    // State & Workflow Errors
    InvalidState,
    StagePanic,

    // Unknown / Uncategorized
    Unknown,
}

impl EtlError {
    /// Creates an [`EtlError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<EtlError>) -> EtlError {
        EtlError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Attributes this error to the pipe stage identified by `stage_id`.
    pub fn with_stage(self, stage_id: impl Into<String>) -> EtlError {
        EtlError {
            repr: ErrorRepr::Stage(stage_id.into(), Box::new(self)),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Stage attributed errors report the kind of the wrapped error. For multiple errors,
    /// returns the kind of the first error or [`ErrorKind::Unknown`] if the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Stage(_, ref inner) => inner.kind(),
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Stage(_, ref inner) => inner.kinds(),
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Stage(_, ref inner) => inner.detail(),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Returns the ids of the stages this error is attributed to, in order of appearance.
    pub fn stage_ids(&self) -> Vec<&str> {
        match self.repr {
            ErrorRepr::Stage(ref id, ref inner) => {
                let mut ids = vec![id.as_str()];
                ids.extend(inner.stage_ids());
                ids
            }
            ErrorRepr::Many(ref errors) => errors.iter().flat_map(|e| e.stage_ids()).collect(),
            _ => Vec::new(),
        }
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Stage(id_a, inner_a), ErrorRepr::Stage(id_b, inner_b)) => {
                id_a == id_b && inner_a == inner_b
            }
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)
            }
            ErrorRepr::Stage(ref id, ref inner) => write!(f, "[{id}] {inner}"),
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {}

impl From<(ErrorKind, &'static str)> for EtlError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for EtlError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    fn from(errors: Vec<E>) -> EtlError {
        EtlError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`serde_json::Error`] to [`EtlError`].
///
/// JSON only reaches the pipeline as InfluxDB responses, so malformed input is a
/// [`ErrorKind::SourceProtocolError`].
impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax | serde_json::error::Category::Eof => (
                ErrorKind::SourceProtocolError,
                "Malformed JSON in source response",
            ),
            serde_json::error::Category::Data => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

impl From<chrono::ParseError> for EtlError {
    fn from(err: chrono::ParseError) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConversionError,
                "Timestamp parsing failed",
                err.to_string(),
            ),
        }
    }
}

impl From<ValidationError> for EtlError {
    fn from(err: ValidationError) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConfigError,
                "Invalid configuration",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`reqwest::Error`] to [`EtlError`].
///
/// The HTTP client is only used to talk to the InfluxDB source.
impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::SourceConnectionFailed,
                "InfluxDB connection failed",
            )
        } else if err.is_status() {
            match err.status().map(|status| status.as_u16()) {
                Some(401) => (ErrorKind::AuthenticationError, "InfluxDB authentication failed"),
                Some(403) => (ErrorKind::PermissionDenied, "InfluxDB permission denied"),
                _ => (ErrorKind::SourceQueryFailed, "InfluxDB query failed"),
            }
        } else if err.is_decode() || err.is_body() {
            (
                ErrorKind::SourceProtocolError,
                "InfluxDB response could not be read",
            )
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "InfluxDB request could not be built")
        } else {
            (ErrorKind::SourceConnectionFailed, "InfluxDB request failed")
        };

        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Converts [`tokio_postgres::Error`] to [`EtlError`] with appropriate error kind.
///
/// Postgres is only used as the migration destination. Errors are classified by their
/// SQLSTATE code.
impl From<tokio_postgres::Error> for EtlError {
    fn from(err: tokio_postgres::Error) -> EtlError {
        let (kind, description) = match err.code() {
            Some(sqlstate) => {
                use tokio_postgres::error::SqlState;

                match *sqlstate {
                    // Connection errors (08xxx)
                    SqlState::CONNECTION_EXCEPTION
                    | SqlState::CONNECTION_DOES_NOT_EXIST
                    | SqlState::CONNECTION_FAILURE
                    | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                    | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION => (
                        ErrorKind::DestinationConnectionFailed,
                        "PostgreSQL connection error",
                    ),

                    // Resource errors (53xxx)
                    SqlState::OUT_OF_MEMORY
                    | SqlState::TOO_MANY_CONNECTIONS
                    | SqlState::DISK_FULL => (
                        ErrorKind::DestinationConnectionFailed,
                        "PostgreSQL resource limitation",
                    ),

                    // Operator intervention errors (57xxx)
                    SqlState::OPERATOR_INTERVENTION
                    | SqlState::QUERY_CANCELED
                    | SqlState::ADMIN_SHUTDOWN
                    | SqlState::CRASH_SHUTDOWN
                    | SqlState::CANNOT_CONNECT_NOW
                    | SqlState::IDLE_SESSION_TIMEOUT => (
                        ErrorKind::DestinationConnectionFailed,
                        "PostgreSQL operator intervention",
                    ),

                    // Authentication errors (28xxx)
                    SqlState::INVALID_AUTHORIZATION_SPECIFICATION
                    | SqlState::INVALID_PASSWORD => (
                        ErrorKind::AuthenticationError,
                        "PostgreSQL authentication failed",
                    ),

                    SqlState::INSUFFICIENT_PRIVILEGE => {
                        (ErrorKind::PermissionDenied, "PostgreSQL permission denied")
                    }

                    // Transaction errors (40xxx, 25xxx)
                    SqlState::T_R_SERIALIZATION_FAILURE
                    | SqlState::T_R_DEADLOCK_DETECTED
                    | SqlState::INVALID_TRANSACTION_STATE
                    | SqlState::ACTIVE_SQL_TRANSACTION
                    | SqlState::NO_ACTIVE_SQL_TRANSACTION
                    | SqlState::IN_FAILED_SQL_TRANSACTION
                    | SqlState::IDLE_IN_TRANSACTION_SESSION_TIMEOUT => (
                        ErrorKind::DestinationTransactionFailed,
                        "PostgreSQL transaction error",
                    ),

                    // Data integrity violations (23xxx)
                    SqlState::NOT_NULL_VIOLATION
                    | SqlState::FOREIGN_KEY_VIOLATION
                    | SqlState::UNIQUE_VIOLATION
                    | SqlState::CHECK_VIOLATION => {
                        (ErrorKind::InvalidData, "PostgreSQL constraint violation")
                    }

                    // Data conversion errors (22xxx)
                    SqlState::INVALID_TEXT_REPRESENTATION
                    | SqlState::INVALID_DATETIME_FORMAT
                    | SqlState::DATETIME_FIELD_OVERFLOW
                    | SqlState::NUMERIC_VALUE_OUT_OF_RANGE
                    | SqlState::INVALID_BINARY_REPRESENTATION
                    | SqlState::UNTRANSLATABLE_CHARACTER
                    | SqlState::CHARACTER_NOT_IN_REPERTOIRE
                    | SqlState::INVALID_JSON_TEXT => (
                        ErrorKind::ConversionError,
                        "PostgreSQL data conversion error",
                    ),

                    // Schema/object errors (42xxx)
                    SqlState::UNDEFINED_TABLE
                    | SqlState::UNDEFINED_COLUMN
                    | SqlState::UNDEFINED_FUNCTION
                    | SqlState::UNDEFINED_SCHEMA
                    | SqlState::UNDEFINED_OBJECT
                    | SqlState::DUPLICATE_TABLE
                    | SqlState::DUPLICATE_COLUMN
                    | SqlState::DATATYPE_MISMATCH
                    | SqlState::DEPENDENT_OBJECTS_STILL_EXIST
                    | SqlState::FEATURE_NOT_SUPPORTED => (
                        ErrorKind::DestinationSchemaError,
                        "PostgreSQL schema error",
                    ),

                    SqlState::SYNTAX_ERROR | SqlState::SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION => (
                        ErrorKind::DestinationQueryFailed,
                        "PostgreSQL syntax error",
                    ),

                    _ => (ErrorKind::DestinationQueryFailed, "PostgreSQL error"),
                }
            }
            // No SQL state means the failure happened on the client side or on the socket.
            None => client_error_kind(err.is_closed(), error::Error::source(&err)),
        };

        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Classifies a Postgres client error that carries no SQLSTATE.
///
/// Cell encoding failures surface as the [`EtlError`] raised by the `ToSql` impl, socket
/// failures as [`std::io::Error`]. Anything else failed while running a statement.
fn client_error_kind(
    is_closed: bool,
    source: Option<&(dyn error::Error + 'static)>,
) -> (ErrorKind, &'static str) {
    if is_closed {
        return (
            ErrorKind::DestinationConnectionFailed,
            "PostgreSQL connection closed",
        );
    }

    match source {
        Some(source) if source.is::<EtlError>() => (
            ErrorKind::ConversionError,
            "PostgreSQL value encoding failed",
        ),
        Some(source) if source.is::<std::io::Error>() => (
            ErrorKind::DestinationConnectionFailed,
            "PostgreSQL I/O error",
        ),
        _ => (
            ErrorKind::DestinationTransactionFailed,
            "PostgreSQL client error",
        ),
    }
}

impl From<rustls::Error> for EtlError {
    fn from(err: rustls::Error) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::EncryptionError,
                "TLS configuration failed",
                err.to_string(),
            ),
        }
    }
}
