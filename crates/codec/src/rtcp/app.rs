//! Application-defined packet (RFC 3550 §6.7). The header's count field
//! carries the APP subtype rather than a report/chunk count, unlike every
//! other RTCP record type; the four-byte name and data are passed through
//! unexamined.

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct App {
    /// The header count field (5 bits), repurposed by RFC 3550 §6.7 as a
    /// subtype rather than a record count.
    pub subtype: u8,
    pub ssrc: u32,
    pub name: [u8; 4],
    pub data: Vec<u8>,
}

impl App {
    pub fn decode(subtype: u8, buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(Error::InvalidPacket);
        }

        let ssrc = u32::from_be_bytes(buf[0..4].try_into()?);
        let name = buf[4..8].try_into()?;
        let data = buf[8..].to_vec();

        Ok(Self { subtype, ssrc, name, data })
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32(self.ssrc);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.data);

        let written = 8 + self.data.len();
        let padded = written.div_ceil(4) * 4;
        for _ in written..padded {
            out.put_u8(0);
        }
    }
}
