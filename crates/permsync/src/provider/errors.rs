use std::fmt;

use thiserror::Error;

use crate::codehost::ClientError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no account provided")]
    NoAccount,

    #[error("not a code host of the account: want {want:?} but have {have:?}")]
    AccountHostMismatch { want: String, have: String },

    #[error("no token found in the external account data")]
    NoToken,

    #[error("no repository provided")]
    NoRepository,

    #[error("not a code host of the repository: want {want:?} but have {have:?}")]
    RepoHostMismatch { want: String, have: String },

    #[error("split nameWithOwner: invalid repository name {0:?}")]
    InvalidRepoName(String),

    /// A code host call failed; `context` names the step.
    #[error("{context}: {source}")]
    Client {
        context: &'static str,
        #[source]
        source: ClientError,
    },
}

impl ProviderError {
    pub(crate) fn client(context: &'static str, source: ClientError) -> Self {
        Self::Client { context, source }
    }
}

/// A fetch failure, together with whatever was collected before it.
///
/// Precondition failures carry no partial result. Code host failures carry
/// everything merged so far, which callers may keep or discard.
#[derive(Debug)]
pub struct FetchError<T> {
    pub partial: Option<T>,
    pub error: ProviderError,
}

impl<T> FetchError<T> {
    pub(crate) fn precondition(error: ProviderError) -> Self {
        Self {
            partial: None,
            error,
        }
    }

    pub(crate) fn with_partial(partial: T, error: ProviderError) -> Self {
        Self {
            partial: Some(partial),
            error,
        }
    }

    pub fn into_parts(self) -> (Option<T>, ProviderError) {
        (self.partial, self.error)
    }
}

impl<T> fmt::Display for FetchError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<T: fmt::Debug> std::error::Error for FetchError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_messages() {
        let err = ProviderError::AccountHostMismatch {
            want: "https://ghe.example.com/".into(),
            have: "https://github.com/".into(),
        };
        assert_eq!(
            err.to_string(),
            r#"not a code host of the account: want "https://ghe.example.com/" but have "https://github.com/""#
        );
        assert_eq!(
            ProviderError::NoToken.to_string(),
            "no token found in the external account data"
        );
    }

    #[test]
    fn fetch_error_displays_wrapped_context() {
        let err: FetchError<Vec<u8>> = FetchError::with_partial(
            vec![1],
            ProviderError::client("list repos for group", ClientError::http(500, "u", "boom")),
        );
        assert!(err.to_string().starts_with("list repos for group: "));
        let (partial, _) = err.into_parts();
        assert_eq!(partial, Some(vec![1]));
    }
}
