use std::error::Error as StdError;
use std::fmt;

/// Boxed error used wherever a cause chain crosses crate boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An error that carries a message meant for the person running hoist.
///
/// The technical cause (if any) stays reachable through [`StdError::source`],
/// so `--debug` output can still print the full chain.
#[derive(Debug)]
pub struct UserError {
    message: String,
    cause: Option<BoxError>,
}

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for UserError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Attach a user-facing message to `err`.
///
/// If any error in the chain already carries a message, `err` is returned
/// unchanged so the innermost, most specific message wins.
pub fn attach_user_message(err: BoxError, message: impl Into<String>) -> BoxError {
    if user_message(&*err).is_some() {
        return err;
    }
    Box::new(UserError::with_cause(message, err))
}

/// The first user-facing message found while walking the source chain.
pub fn user_message<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a str> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(user) = e.downcast_ref::<UserError>() {
            return Some(user.message());
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer {
        source: UserError,
    }

    #[test]
    fn finds_message_below_typed_wrapper() {
        let err = Outer {
            source: UserError::new("please log in"),
        };
        assert_eq!(user_message(&err), Some("please log in"));
    }

    #[test]
    fn plain_errors_have_no_message() {
        let err = std::io::Error::other("boom");
        assert_eq!(user_message(&err), None);
    }
}
