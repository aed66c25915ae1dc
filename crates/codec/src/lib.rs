//! Wire-level codec for RTP headers, compound RTCP packets and the RFC
//! 4733 telephony-event payload.
//!
//! This crate has no knowledge of sockets, timers or session state; it
//! only turns bytes into structured values and back, the same split the
//! teacher codec keeps between message parsing and the transport that
//! carries the messages.

pub mod crypto;
pub mod dtmf;
pub mod error;
pub mod rtcp;
pub mod rtp;

pub use error::{Error, Result};
