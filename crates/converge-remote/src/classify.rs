//! Recognition of transient remote errors.

use crate::error::{ErrorCategory, RemoteError};

/// Decides whether a [`RemoteError`] is known to resolve itself after a short
/// delay (IAM propagation, "resource still in use", throttling).
///
/// Throttling and connection errors are always transient. Service errors are
/// transient when their code is listed, when their message contains a listed
/// fragment, or when a code/fragment pair matches. Not-found and conflict
/// errors are never transient here; the guard and the mutator own those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransientClassifier {
    codes: Vec<String>,
    message_fragments: Vec<String>,
    code_messages: Vec<(String, String)>,
}

impl TransientClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat every error carrying one of these codes as transient.
    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Treat every error whose message contains `fragment` as transient.
    pub fn with_message_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.message_fragments.push(fragment.into());
        self
    }

    /// Treat errors with `code` as transient only if the message contains `fragment`.
    pub fn with_code_and_message(
        mut self,
        code: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        self.code_messages.push((code.into(), fragment.into()));
        self
    }

    pub fn is_transient(&self, err: &RemoteError) -> bool {
        match err.category() {
            ErrorCategory::Transient => true,
            ErrorCategory::NotFound | ErrorCategory::Conflict => false,
            _ => {
                let code = err.code();
                let message = err.message();
                self.codes.iter().any(|c| c == code)
                    || self
                        .message_fragments
                        .iter()
                        .any(|fragment| message.contains(fragment.as_str()))
                    || self
                        .code_messages
                        .iter()
                        .any(|(c, fragment)| c == code && message.contains(fragment.as_str()))
            }
        }
    }
}
