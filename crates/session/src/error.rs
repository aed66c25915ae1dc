use std::fmt;

/// Session-level failure: everything above the wire codec — allocation,
/// state-machine sequencing, and buffer capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The wire codec rejected a packet; session logic never inspects the
    /// codec error further than "drop it".
    Codec,
    /// No even port was free in the configured range.
    PortsExhausted,
    /// A session operation was attempted against a session that has not
    /// finished its handshake, or has already been torn down.
    InvalidState,
    /// The jitter buffer's backing queue is at `STFU_QLEN` capacity and
    /// the oldest frame has not yet been read.
    QueueFull,
    /// A DTMF digit was requested while another digit's event train is
    /// still being sent.
    DigitInProgress,
    /// `create_own_ssrc` was called while an own SSRC is already set, or
    /// the requested SSRC collides with an existing participant.
    AlreadyExists,
    /// A lookup (e.g. `delete_own_ssrc` with none set) found nothing.
    NotFound,
    /// A hex-encoded master key failed to decode or had the wrong length.
    CryptError,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<codec::Error> for Error {
    fn from(err: codec::Error) -> Self {
        match err {
            codec::Error::CryptError => Self::CryptError,
            _ => Self::Codec,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
