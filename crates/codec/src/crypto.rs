//! HMAC-SHA1 authentication tag and hex master-key parsing.
//!
//! Mirrors the teacher codec's free-standing `hmac_sha1` helper rather than
//! wrapping it in a type: the caller owns key material, this module only
//! turns bytes into a tag or a tag-shaped comparison.

use crate::error::{Error, Result};
use hmac::{Hmac, Mac};
use sha1::Sha1;

pub const HMAC_SHA1_TAG_LEN: usize = 20;

/// SRTP master key length in bytes (RFC 3711 §8.2's 30-byte default
/// `AES_CM_128_HMAC_SHA1_80` key length), per spec.md §4.3/§8.
pub const MASTER_KEY_LEN: usize = 30;

/// Computes an HMAC-SHA1 tag over the concatenation of `sources`.
///
/// Splitting the message into fragments lets a caller authenticate a
/// header and payload without copying them into one buffer first, the
/// same shape the teacher codec uses for STUN message-integrity.
///
/// # Examples
///
/// ```
/// use rtpcore_codec::crypto::hmac_sha1;
///
/// let tag = hmac_sha1(b"key", &[b"hello ", b"world"]).unwrap();
/// assert_eq!(tag.len(), 20);
/// ```
pub fn hmac_sha1(key: &[u8], sources: &[&[u8]]) -> Result<[u8; HMAC_SHA1_TAG_LEN]> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| Error::InvalidPacket)?;
    for source in sources {
        mac.update(source);
    }

    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; HMAC_SHA1_TAG_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Parses a hex-encoded SRTP master key into raw bytes. Session negotiation
/// out-of-band is expected to hand this crate the key already hex-encoded,
/// matching how the teacher passes long-term credential material around as
/// text. Anything that isn't exactly `2 * MASTER_KEY_LEN` hex digits is
/// `CryptError`, per spec.md §4.3's "exactly `2·MASTER_KEY_LEN` hex digits;
/// anything else returns `CryptError`".
pub fn parse_hex_key(hex_str: &str) -> Result<Vec<u8>> {
    let key = hex::decode(hex_str.trim()).map_err(|_| Error::CryptError)?;
    if key.len() != MASTER_KEY_LEN {
        return Err(Error::CryptError);
    }
    Ok(key)
}

/// Constant-time tag comparison; do not replace with `==`.
pub fn tags_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_KEY_HEX: &str =
        "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d";

    #[test]
    fn parses_hex_key() {
        let key = parse_hex_key(VALID_KEY_HEX).unwrap();
        assert_eq!(key.len(), MASTER_KEY_LEN);
        assert_eq!(key[0], 0x00);
        assert_eq!(key[MASTER_KEY_LEN - 1], 0x1d);
    }

    #[test]
    fn rejects_bad_hex() {
        assert_eq!(parse_hex_key("not-hex"), Err(Error::CryptError));
    }

    #[test]
    fn rejects_wrong_length_key() {
        assert_eq!(parse_hex_key("deadbeef"), Err(Error::CryptError));
    }

    #[test]
    fn tag_comparison_is_length_and_content_sensitive() {
        assert!(tags_equal(&[1, 2, 3], &[1, 2, 3]));
        assert!(!tags_equal(&[1, 2, 3], &[1, 2, 4]));
        assert!(!tags_equal(&[1, 2], &[1, 2, 3]));
    }
}
