//! BYE packet (RFC 3550 §6.6).

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bye {
    pub sources: Vec<u32>,
    pub reason: Option<String>,
}

impl Bye {
    pub fn decode(buf: &[u8], source_count: u8) -> Result<Self> {
        let sources_len = source_count as usize * 4;
        if buf.len() < sources_len {
            return Err(Error::InvalidPacket);
        }

        let mut sources = Vec::with_capacity(source_count as usize);
        for i in 0..source_count as usize {
            let off = i * 4;
            sources.push(u32::from_be_bytes(buf[off..off + 4].try_into()?));
        }

        let rest = &buf[sources_len..];
        let reason = if rest.is_empty() {
            None
        } else {
            let len = rest[0] as usize;
            if 1 + len > rest.len() {
                return Err(Error::InvalidPacket);
            }
            Some(String::from_utf8(rest[1..1 + len].to_vec()).map_err(|_| Error::InvalidPacket)?)
        };

        Ok(Self { sources, reason })
    }

    pub fn encode(&self, out: &mut BytesMut) {
        for source in &self.sources {
            out.put_u32(*source);
        }

        if let Some(reason) = &self.reason {
            out.put_u8(reason.len() as u8);
            out.extend_from_slice(reason.as_bytes());
        }

        let written = self.sources.len() * 4 + self.reason.as_ref().map_or(0, |r| 1 + r.len());
        let padded = written.div_ceil(4) * 4;
        for _ in written..padded {
            out.put_u8(0);
        }
    }

    pub fn source_count(&self) -> u8 {
        self.sources.len() as u8
    }
}
