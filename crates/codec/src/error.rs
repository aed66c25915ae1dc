use std::array::TryFromSliceError;

/// Wire-level decode/encode failure.
///
/// Mirrors the invariants enumerated in the data model: a value is only
/// ever constructed at the point a contract in the header layout is
/// violated, never speculatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Buffer too short, version mismatch, bad padding count, or a
    /// marker/payload-type combination that collides with an RTCP type.
    InvalidPacket,
    /// The compound packet's record lengths do not sum to the buffer
    /// length, or the residue at the end is not exactly zero bytes.
    InvalidCompound,
    /// A builder `add_*` call would overflow the configured/max buffer.
    NotEnoughBytesLeft,
    /// A builder method was called out of sequence (e.g. `add_report_block`
    /// before `start_sender_report`/`start_receiver_report`).
    InvalidState,
    /// A hex-encoded master key failed to decode, or decoded to a length
    /// other than `crypto::MASTER_KEY_LEN`.
    CryptError,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_: TryFromSliceError) -> Self {
        Self::InvalidPacket
    }
}

pub type Result<T> = std::result::Result<T, Error>;
