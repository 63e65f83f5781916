//! Errors that know how to present themselves to the user who caused them.
//!
//! A [`ResponsiveError`] anywhere in an error's source chain makes the error
//! eligible for an automatic reply from the error-handling pipeline. All
//! other errors are only ever logged.

use crate::types::{AllowedMentions, BoxError};
use std::error::Error;
use std::fmt;

/// A user-facing error carrying the message to reply with.
#[derive(Debug)]
pub struct ResponsiveError {
    message: String,
    allowed_mentions: Option<AllowedMentions>,
    source: Option<BoxError>,
}

impl ResponsiveError {
    /// Creates a responsive error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            allowed_mentions: None,
            source: None,
        }
    }

    /// Wraps a feature error, using its `Display` output as the message.
    pub fn from_error<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            allowed_mentions: None,
            source: Some(Box::new(error)),
        }
    }

    /// Overrides the mention policy used when replying.
    #[must_use]
    pub const fn with_allowed_mentions(mut self, allowed_mentions: AllowedMentions) -> Self {
        self.allowed_mentions = Some(allowed_mentions);
        self
    }

    /// The message shown to the user.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The mention policy for the reply. Defaults to pinging nobody.
    pub fn allowed_mentions(&self) -> AllowedMentions {
        self.allowed_mentions.unwrap_or_else(AllowedMentions::none)
    }
}

impl fmt::Display for ResponsiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ResponsiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|error| error as &(dyn Error + 'static))
    }
}

/// Walks the source chain of `error` looking for a [`ResponsiveError`].
pub fn find_responsive<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a ResponsiveError> {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(responsive) = error.downcast_ref::<ResponsiveError>() {
            return Some(responsive);
        }
        current = error.source();
    }
    None
}
