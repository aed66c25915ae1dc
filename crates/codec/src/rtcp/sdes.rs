//! Source Description (SDES) packet (RFC 3550 §6.5).

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

pub const SDES_CNAME: u8 = 1;
pub const SDES_NAME: u8 = 2;
pub const SDES_EMAIL: u8 = 3;
pub const SDES_PHONE: u8 = 4;
pub const SDES_LOC: u8 = 5;
pub const SDES_TOOL: u8 = 6;
pub const SDES_NOTE: u8 = 7;
pub const SDES_PRIV: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdesItem {
    pub kind: u8,
    pub text: String,
    /// Only set when `kind == SDES_PRIV`: the vendor-extension prefix name
    /// (RFC 3550 §6.5.7). PRIV's wire format packs a length-delimited
    /// prefix ahead of the value, so it's carried here rather than folded
    /// into `text`.
    pub priv_prefix: Option<String>,
}

impl SdesItem {
    pub fn new(kind: u8, text: impl Into<String>) -> Self {
        Self { kind, text: text.into(), priv_prefix: None }
    }

    /// Builds a PRIV item (RFC 3550 §6.5.7): `prefix` must fit the item's
    /// own 8-bit sub-length (`<= 255` bytes) and `1 + prefix.len() +
    /// value.len()` must fit the item's 8-bit length (`<= 255` bytes).
    pub fn new_priv(prefix: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        let value = value.into();
        if prefix.len() > 255 || 1 + prefix.len() + value.len() > 255 {
            return Err(Error::InvalidPacket);
        }
        Ok(Self { kind: SDES_PRIV, text: value, priv_prefix: Some(prefix) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub items: Vec<SdesItem>,
}

impl SdesChunk {
    /// Decodes one SSRC/CNAME chunk starting at `buf[0]`. Returns the chunk
    /// and the number of bytes consumed, rounded up to a 4-byte boundary as
    /// required by the chunk alignment rule.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 4 {
            return Err(Error::InvalidPacket);
        }

        let ssrc = u32::from_be_bytes(buf[0..4].try_into()?);
        let mut pos = 4;
        let mut items = Vec::new();

        loop {
            if pos >= buf.len() {
                return Err(Error::InvalidPacket);
            }

            let kind = buf[pos];
            if kind == 0 {
                pos += 1;
                break;
            }

            if pos + 2 > buf.len() {
                return Err(Error::InvalidPacket);
            }

            let len = buf[pos + 1] as usize;
            let start = pos + 2;
            let end = start + len;
            if end > buf.len() {
                return Err(Error::InvalidPacket);
            }

            if kind == SDES_PRIV {
                if start >= end {
                    return Err(Error::InvalidPacket);
                }
                let prefix_len = buf[start] as usize;
                let prefix_start = start + 1;
                let prefix_end = prefix_start + prefix_len;
                if prefix_end > end {
                    return Err(Error::InvalidPacket);
                }
                let prefix = String::from_utf8(buf[prefix_start..prefix_end].to_vec())
                    .map_err(|_| Error::InvalidPacket)?;
                let text = String::from_utf8(buf[prefix_end..end].to_vec())
                    .map_err(|_| Error::InvalidPacket)?;
                items.push(SdesItem { kind, text, priv_prefix: Some(prefix) });
            } else {
                let text = String::from_utf8(buf[start..end].to_vec()).map_err(|_| Error::InvalidPacket)?;
                items.push(SdesItem { kind, text, priv_prefix: None });
            }
            pos = end;
        }

        let consumed = pos.div_ceil(4) * 4;
        Ok((Self { ssrc, items }, consumed))
    }

    pub fn encode(&self, out: &mut BytesMut) {
        let start = out.len();
        out.put_u32(self.ssrc);

        for item in &self.items {
            out.put_u8(item.kind);
            if item.kind == SDES_PRIV {
                let prefix = item.priv_prefix.as_deref().unwrap_or("");
                out.put_u8((1 + prefix.len() + item.text.len()) as u8);
                out.put_u8(prefix.len() as u8);
                out.extend_from_slice(prefix.as_bytes());
                out.extend_from_slice(item.text.as_bytes());
            } else {
                out.put_u8(item.text.len() as u8);
                out.extend_from_slice(item.text.as_bytes());
            }
        }

        out.put_u8(0);

        let written = out.len() - start;
        let padded = written.div_ceil(4) * 4;
        for _ in written..padded {
            out.put_u8(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_cname_with_padding() {
        let chunk = SdesChunk {
            ssrc: 0x1234,
            items: vec![SdesItem::new(SDES_CNAME, "alice@example.com")],
        };

        let mut out = BytesMut::new();
        chunk.encode(&mut out);
        assert_eq!(out.len() % 4, 0);

        let (decoded, consumed) = SdesChunk::decode(&out).unwrap();
        assert_eq!(decoded, chunk);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn round_trips_priv_item_with_prefix_and_value() {
        let chunk = SdesChunk {
            ssrc: 0xbeef,
            items: vec![
                SdesItem::new(SDES_CNAME, "bob@example.com"),
                SdesItem::new_priv("com.example.app", "session-42").unwrap(),
            ],
        };

        let mut out = BytesMut::new();
        chunk.encode(&mut out);

        let (decoded, consumed) = SdesChunk::decode(&out).unwrap();
        assert_eq!(decoded, chunk);
        assert_eq!(consumed, out.len());
        assert_eq!(decoded.items[1].priv_prefix.as_deref(), Some("com.example.app"));
        assert_eq!(decoded.items[1].text, "session-42");
    }

    #[test]
    fn rejects_priv_item_too_long_to_fit_its_length_byte() {
        assert_eq!(
            SdesItem::new_priv("x".repeat(200), "y".repeat(100)).unwrap_err(),
            Error::InvalidPacket
        );
    }
}
