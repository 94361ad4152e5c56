/// Structural decode failures. Either one ends the current snapshot;
/// the session itself carries on.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },
    #[error("invalid utf-8 in string field at offset {offset}")]
    InvalidUtf8 { offset: usize },
}
