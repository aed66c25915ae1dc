//! Session behavior flags, one bit per independently-toggleable behavior.
//! Grouping these in a bitset instead of a dozen `bool` fields matches how
//! the original synchronous RTP session tracked per-channel behavior
//! switches that get flipped at arbitrary points in the call lifecycle.

use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! flags {
    ($($(#[$meta:meta])* $name:ident = $bit:expr;)*) => {
        $($(#[$meta])* pub const $name: u32 = 1 << $bit;)*
    };
}

flags! {
    /// Media is flowing both directions; cleared once a teardown begins.
    IO = 0;
    /// SRTP protection is active on this endpoint.
    SECURE = 1;
    /// A dedicated timer thread paces `read_frame`, rather than blocking
    /// recv.
    USE_TIMER = 2;
    /// `read_frame` must not block even when `USE_TIMER` is unset.
    NOBLOCK = 3;
    /// The jitter buffer may grow/shrink its queue length automatically.
    AUTOADJ = 4;
    /// Voice-activity-detected silence suppression is in effect.
    VAD = 5;
    /// Comfort-noise payload is synthesized during read-side underrun.
    AUTO_CNG = 6;
    /// RFC 2833 telephony events are decoded out of the media stream
    /// instead of being handed to the caller as payload.
    PASS_RFC2833 = 7;
    /// Bypass the jitter buffer entirely and hand frames to the caller as
    /// they arrive.
    RAW_WRITE = 8;
    /// Requests that a blocking `read_frame` return at the next poll.
    BREAK = 9;
    /// `read_frame` should wait for the configured jitter queue depth
    /// before returning the first frame.
    DATAWAIT = 10;
    /// Tolerate a peer that double-counts the RFC 2833 duration field,
    /// a known interop quirk with some gateways.
    GOOGLEHACK = 11;
    /// Suppress the marker bit on the first packet of an outbound DTMF
    /// digit, to interoperate with peers that choke on it.
    BUGGY_2833 = 12;
}

/// Atomically-toggleable flag set; cloneable handles share the same bits.
#[derive(Debug, Default)]
pub struct SessionFlags(AtomicU32);

impl SessionFlags {
    pub fn new(initial: u32) -> Self {
        Self(AtomicU32::new(initial))
    }

    pub fn set(&self, mask: u32) {
        self.0.fetch_or(mask, Ordering::SeqCst);
    }

    pub fn clear(&self, mask: u32) {
        self.0.fetch_and(!mask, Ordering::SeqCst);
    }

    pub fn test(&self, mask: u32) -> bool {
        self.0.load(Ordering::SeqCst) & mask == mask
    }

    pub fn bits(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_and_test_round_trip() {
        let flags = SessionFlags::new(IO);
        assert!(flags.test(IO));
        assert!(!flags.test(SECURE));

        flags.set(SECURE);
        assert!(flags.test(SECURE));

        flags.clear(IO);
        assert!(!flags.test(IO));
        assert!(flags.test(SECURE));
    }
}
