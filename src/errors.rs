/// Stable numeric code attached to an error variant, reported to API clients.
///
/// Derived with `invitee_macros::InviteeBusinessError` and `#[code(N)]` on variants.
pub trait InviteeBusinessErrCode {
    fn code(&self) -> Option<u32>;
}

impl InviteeBusinessErrCode for std::convert::Infallible {
    fn code(&self) -> Option<u32> {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InviteeError {
    #[error("{source}")]
    Oracle {
        #[from]
        source: crate::services::oracle::OracleError,
    },
    #[error("{source}")]
    IOError {
        #[from]
        source: std::io::Error,
    },
    #[error("{source}")]
    ConfigError {
        #[from]
        source: Box<figment::Error>,
    },
    #[error("Sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[cfg(feature = "migrate")]
    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
}
