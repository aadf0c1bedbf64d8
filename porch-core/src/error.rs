use thiserror::Error;

/// Domain error taxonomy. Every caller-distinguishable condition gets its own
/// variant; only `Store` is opaque.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("operation not permitted")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("edit window has expired")]
    EditWindowExpired,

    #[error("cannot leave a group as its only active admin")]
    LastAdminGuard,

    #[error("storage error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Stable machine-readable code surfaced in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized => "unauthorized",
            Error::Forbidden => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Validation(_) => "validation",
            Error::EditWindowExpired => "edit_window_expired",
            Error::LastAdminGuard => "last_admin_guard",
            Error::Store(_) => "storage",
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Error::NotFound("record"),
            other => Error::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            Error::Unauthorized,
            Error::Forbidden,
            Error::NotFound("group"),
            Error::Conflict("already a member"),
            Error::validation("content too long"),
            Error::EditWindowExpired,
            Error::LastAdminGuard,
            Error::Store("down".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: Error = diesel::result::Error::NotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
