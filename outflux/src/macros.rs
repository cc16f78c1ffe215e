//! Macros for building and returning [`crate::error::EtlError`] values.

/// Creates an [`crate::error::EtlError`] from error kind and description, with an optional
/// detail that is converted with `to_string()`.
#[macro_export]
macro_rules! etl_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::EtlError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::EtlError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Returns early from the current function with an [`crate::error::EtlError`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::etl_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::etl_error!($kind, $desc, $detail))
    };
}
