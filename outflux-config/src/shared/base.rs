use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A size-like setting that must be strictly positive was zero.
    #[error("`{0}` must be greater than zero")]
    ZeroValue(&'static str),
    /// A time bound could not be parsed as an RFC3339 timestamp.
    #[error("`{field}` is not a valid RFC3339 timestamp: {value}")]
    InvalidTimeBound { field: &'static str, value: String },
    /// The lower time bound is after the upper time bound.
    #[error("`from` ({from}) must not be after `to` ({to})")]
    InvertedTimeRange { from: String, to: String },
    /// A name that ends up as an identifier was empty.
    #[error("`{0}` cannot be empty")]
    EmptyName(&'static str),
    /// Two JSON columns would be produced with the same name.
    #[error("`tags_column` and `fields_column` must differ, both are '{0}'")]
    DuplicateJsonColumn(String),
}
