//! SRTP authentication envelope.
//!
//! This crate's SRTP boundary is the same one the teacher codec draws
//! around STUN message-integrity: attach/verify an HMAC-SHA1 tag derived
//! from a session master key. Confidentiality ciphers (AES-CM, AEAD) are
//! a codec/negotiation concern out of scope here (see Non-goals); what
//! this module guarantees is that a packet wasn't forged or altered in
//! transit once a master key has been agreed out-of-band.

use codec::crypto::{hmac_sha1, parse_hex_key, tags_equal, HMAC_SHA1_TAG_LEN};
use codec::Error as CodecError;

/// SRTP truncates the 20-byte HMAC-SHA1 output to 10 bytes (RFC 3711 §4.2).
pub const AUTH_TAG_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct SrtpContext {
    master_key: Vec<u8>,
}

impl SrtpContext {
    /// Builds a context from a hex-encoded master key, as handed off by
    /// whatever negotiated the session (out of scope for this crate).
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CodecError> {
        Ok(Self {
            master_key: parse_hex_key(hex_key)?,
        })
    }

    pub fn from_bytes(master_key: Vec<u8>) -> Self {
        Self { master_key }
    }

    /// Appends a truncated authentication tag over `packet` in place.
    pub fn protect(&self, packet: &mut Vec<u8>) -> Result<(), CodecError> {
        let tag = hmac_sha1(&self.master_key, &[packet.as_slice()])?;
        packet.extend_from_slice(&tag[..AUTH_TAG_LEN]);
        Ok(())
    }

    /// Verifies and strips the trailing authentication tag, returning the
    /// plain RTP/RTCP bytes. Fails closed: any length or tag mismatch is
    /// `Err`, never a best-effort pass-through.
    pub fn unprotect<'a>(&self, packet: &'a [u8]) -> Result<&'a [u8], CodecError> {
        if packet.len() < AUTH_TAG_LEN {
            return Err(CodecError::InvalidPacket);
        }

        let split = packet.len() - AUTH_TAG_LEN;
        let (body, tag) = packet.split_at(split);
        let expected = hmac_sha1(&self.master_key, &[body])?;

        if !tags_equal(tag, &expected[..AUTH_TAG_LEN]) {
            return Err(CodecError::InvalidPacket);
        }

        Ok(body)
    }
}

const _: () = assert!(AUTH_TAG_LEN <= HMAC_SHA1_TAG_LEN);

#[cfg(test)]
mod tests {
    use super::*;

    /// 30 bytes hex-encoded, matching `codec::crypto::MASTER_KEY_LEN`.
    const VALID_KEY_HEX: &str =
        "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d";

    #[test]
    fn protect_then_unprotect_round_trips() {
        let ctx = SrtpContext::from_hex_key(VALID_KEY_HEX).unwrap();
        let mut packet = b"rtp-header-and-payload".to_vec();
        let original = packet.clone();

        ctx.protect(&mut packet).unwrap();
        assert_eq!(packet.len(), original.len() + AUTH_TAG_LEN);

        let unprotected = ctx.unprotect(&packet).unwrap();
        assert_eq!(unprotected, original);
    }

    #[test]
    fn from_hex_key_rejects_wrong_length_key() {
        assert_eq!(SrtpContext::from_hex_key("aabb").unwrap_err(), CodecError::CryptError);
    }

    #[test]
    fn unprotect_rejects_tampered_packet() {
        let ctx = SrtpContext::from_hex_key(VALID_KEY_HEX).unwrap();
        let mut packet = b"payload".to_vec();
        ctx.protect(&mut packet).unwrap();

        let last = packet.len() - 1;
        packet[last] ^= 0xFF;
        assert!(ctx.unprotect(&packet).is_err());
    }

    #[test]
    fn unprotect_rejects_truncated_packet() {
        let ctx = SrtpContext::from_bytes(vec![1, 2, 3]);
        assert!(ctx.unprotect(&[0u8; 2]).is_err());
    }
}
