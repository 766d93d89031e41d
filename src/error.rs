//! The error type shared by every operation in the crate.
//!
//! Plumbing code (files, config, JSON on disk) uses `anyhow` with `.context(...)` and lands in
//! `Error::Other`. Everything a caller may want to react to has its own variant.

use std::fmt::{Display, Formatter};

/// Errors surfaced by the auth, extraction, transport and ledger layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The identity host (OAuth SDK) could not be used.
    #[error("Unable to initialize authentication: {0}")]
    AuthInitError(String),

    /// A token could not be obtained without user interaction.
    #[error("Silent token refresh failed: {0}")]
    SilentRefreshFailed(String),

    /// Another refresh or redirect is already outstanding.
    #[error("An authorization request is already in progress")]
    AuthBusy,

    /// The identity provider returned an error, or the redirect did not match the pending request.
    #[error("Authorization was rejected: {0}")]
    AuthRejected(String),

    /// The language-model backend answered with a non-success status.
    #[error("{provider} request failed: {message}")]
    ProviderError { provider: String, message: String },

    /// The language-model backend answered without any content.
    #[error("Empty response from {0}")]
    EmptyResponse(String),

    /// No JSON object could be located in the response, or it did not parse.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unable to read from the sheet: {message}")]
    ReadError { message: String },

    #[error("Unable to write to the sheet: {message}")]
    WriteError { message: String },

    #[error("Unable to copy the file: {message}")]
    CopyError { message: String },

    /// Every candidate row in the bounded window is occupied.
    #[error("{0}")]
    NoSpaceAvailable(NoSpace),

    /// The ledger configuration is incomplete.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Describes which bounded sections were exhausted, so the message can tell the user that the
/// ledger itself needs more rows.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NoSpace {
    pub sections: Vec<String>,
    pub min_row: u32,
    pub max_row: u32,
}

impl Display for NoSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.sections.as_slice() {
            [one] => write!(
                f,
                "No space available: section '{one}' is full between rows {} and {}",
                self.min_row, self.max_row
            ),
            many => {
                let names = many
                    .iter()
                    .map(|s| format!("'{s}'"))
                    .collect::<Vec<_>>()
                    .join(" and ");
                write!(
                    f,
                    "No space available: sections {names} are all full between rows {} and {}",
                    self.min_row, self.max_row
                )
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(e.into())
    }
}

/// Adds the `read_err`, `write_err` and `copy_err` conversions to any `Result` whose error is
/// displayable, so transport code can tag failures with the right variant.
pub(crate) trait IntoResult<T> {
    fn read_err(self) -> Result<T>;
    fn write_err(self) -> Result<T>;
    fn copy_err(self) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Display,
{
    fn read_err(self) -> Result<T> {
        self.map_err(|e| Error::ReadError {
            message: format!("{e:#}"),
        })
    }

    fn write_err(self) -> Result<T> {
        self.map_err(|e| Error::WriteError {
            message: format!("{e:#}"),
        })
    }

    fn copy_err(self) -> Result<T> {
        self.map_err(|e| Error::CopyError {
            message: format!("{e:#}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_space_single_section_message() {
        let e = Error::NoSpaceAvailable(NoSpace {
            sections: vec!["Gastos".into()],
            min_row: 12,
            max_row: 118,
        });
        let message = e.to_string();
        assert!(message.contains("'Gastos'"));
        assert!(message.contains("12"));
        assert!(message.contains("118"));
    }

    #[test]
    fn test_no_space_both_sections_message() {
        let e = Error::NoSpaceAvailable(NoSpace {
            sections: vec!["Fijos".into(), "Gastos Extra".into()],
            min_row: 12,
            max_row: 118,
        });
        let message = e.to_string();
        assert!(message.contains("'Fijos' and 'Gastos Extra'"));
        assert!(message.contains("all full"));
        assert!(message.contains("118"));
    }

    #[test]
    fn test_read_err_keeps_message() {
        let r: std::result::Result<(), &str> = Err("403 forbidden");
        match r.read_err() {
            Err(Error::ReadError { message }) => assert_eq!(message, "403 forbidden"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
