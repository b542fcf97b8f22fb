use thiserror::Error;

/// Errors surfaced by the file- and stream-facing API.
///
/// The codecs themselves never error: malformed input degrades into a
/// partial tree or [`Value::Null`](crate::Value::Null).
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The encryption flag is reserved in the wire format; no cipher is
    /// wired in.
    #[error("encryption is reserved and not implemented")]
    Encryption,
}
