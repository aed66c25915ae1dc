//! Session-layer state for an RTP/RTCP media leg: the endpoint state
//! machine, adaptive jitter buffer, RFC 4733 DTMF engine, RTCP
//! participant table, even-port allocator, a minimal STUN keep-alive,
//! and the SRTP authentication envelope. Wire parsing itself lives in
//! `rtpcore-codec`; this crate is what holds state across packets.

pub mod dtmf_engine;
pub mod endpoint;
pub mod error;
pub mod flags;
pub mod ice;
pub mod jitter;
pub mod participants;
pub mod ports;
pub mod srtp;
pub mod timer;
pub mod vad;

pub use endpoint::{SessionEndpoint, SessionEndpointOptions, SessionObserver, SessionState};
pub use error::{Error, Result};
pub use participants::ParticipantEvents;
