//! RTCP compound packet codec (RFC 3550 §6).
//!
//! A compound packet is a back-to-back run of individually-length-prefixed
//! RTCP packets with no framing between them; the only way to find where
//! one ends and the next begins is to trust each packet's own 16-bit
//! length field. [`decode_compound`] walks the run and rejects anything
//! that doesn't account for every byte of the buffer, mirroring the
//! strict-accounting style of `ChannelData::decode`.

pub mod app;
pub mod bye;
pub mod builder;
pub mod report;
pub mod sdes;

pub use app::App;
pub use bye::Bye;
pub use builder::RtcpCompoundBuilder;
pub use report::{ReceiverReport, ReportBlock, SenderInfo, SenderReport};
pub use sdes::{SdesChunk, SdesItem, SDES_CNAME, SDES_NOTE};

use crate::error::{Error, Result};

pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;

const RTCP_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(Vec<SdesChunk>),
    Bye(Bye),
    App(App),
    /// A well-formed but unrecognized payload type; carried through
    /// unexamined so unknown extensions don't break compound parsing.
    Unknown { payload_type: u8, count: u8, body: Vec<u8> },
}

/// Parses a full RTCP compound packet.
///
/// Per RFC 3550 §6.1 the first packet in a compound packet must be a
/// sender or receiver report; this is enforced here rather than left as a
/// caller convention; `Error::InvalidCompound` covers that case too.
///
/// # Examples
///
/// ```
/// use rtpcore_codec::rtcp::{
///     decode_compound, RtcpCompoundBuilder, RtcpPacket, ReceiverReport,
/// };
///
/// let mut builder = RtcpCompoundBuilder::new();
/// builder.add_receiver_report(ReceiverReport { ssrc: 7, reports: vec![] });
/// let bytes = builder.build().unwrap();
///
/// let packets = decode_compound(&bytes).unwrap();
/// assert!(matches!(packets[0], RtcpPacket::ReceiverReport(_)));
/// ```
pub fn decode_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>> {
    if buf.is_empty() {
        return Err(Error::InvalidCompound);
    }

    let mut offset = 0;
    let mut packets = Vec::new();

    while offset < buf.len() {
        if offset + RTCP_HEADER_LEN > buf.len() {
            return Err(Error::InvalidCompound);
        }

        let first = buf[offset];
        let version = (first >> 6) & 0x03;
        let padding = (first >> 5) & 0x01 != 0;
        let count = first & 0x1F;
        let payload_type = buf[offset + 1];
        let length_words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
        let packet_len = (length_words + 1) * 4;

        if version != 2 || offset + packet_len > buf.len() {
            return Err(Error::InvalidCompound);
        }

        let body = &buf[offset + RTCP_HEADER_LEN..offset + packet_len];

        let packet = match payload_type {
            PT_SR => {
                if body.len() < 4 + report::SENDER_INFO_LEN {
                    return Err(Error::InvalidCompound);
                }
                let ssrc = u32::from_be_bytes(body[0..4].try_into()?);
                let sender_info = SenderInfo::decode(&body[4..4 + report::SENDER_INFO_LEN])?;
                let mut reports = Vec::with_capacity(count as usize);
                let mut pos = 4 + report::SENDER_INFO_LEN;
                for _ in 0..count {
                    if pos > body.len() {
                        return Err(Error::InvalidCompound);
                    }
                    reports.push(ReportBlock::decode(&body[pos..])?);
                    pos += report::REPORT_BLOCK_LEN;
                }
                RtcpPacket::SenderReport(SenderReport { ssrc, sender_info, reports })
            }
            PT_RR => {
                if body.len() < 4 {
                    return Err(Error::InvalidCompound);
                }
                let ssrc = u32::from_be_bytes(body[0..4].try_into()?);
                let mut reports = Vec::with_capacity(count as usize);
                let mut pos = 4;
                for _ in 0..count {
                    if pos > body.len() {
                        return Err(Error::InvalidCompound);
                    }
                    reports.push(ReportBlock::decode(&body[pos..])?);
                    pos += report::REPORT_BLOCK_LEN;
                }
                RtcpPacket::ReceiverReport(ReceiverReport { ssrc, reports })
            }
            PT_SDES => {
                let mut chunks = Vec::with_capacity(count as usize);
                let mut pos = 0;
                for _ in 0..count {
                    if pos > body.len() {
                        return Err(Error::InvalidCompound);
                    }
                    let (chunk, consumed) = SdesChunk::decode(&body[pos..])?;
                    chunks.push(chunk);
                    pos += consumed;
                }
                RtcpPacket::SourceDescription(chunks)
            }
            PT_BYE => RtcpPacket::Bye(Bye::decode(body, count)?),
            PT_APP => RtcpPacket::App(App::decode(count, body)?),
            other => RtcpPacket::Unknown {
                payload_type: other,
                count,
                body: body.to_vec(),
            },
        };

        if offset == 0 && !matches!(packet, RtcpPacket::SenderReport(_) | RtcpPacket::ReceiverReport(_)) {
            return Err(Error::InvalidCompound);
        }

        let is_last = offset + packet_len == buf.len();
        if padding && !is_last {
            return Err(Error::InvalidCompound);
        }

        packets.push(packet);
        offset += packet_len;
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_compound_not_starting_with_report() {
        let mut builder = RtcpCompoundBuilder::new();
        // force a malformed compound by hand: a lone BYE as the first packet
        let mut bye_only = bytes::BytesMut::new();
        bye_only.extend_from_slice(&[(2u8 << 6) | 1, PT_BYE, 0, 1]);
        bye_only.extend_from_slice(&1u32.to_be_bytes());
        let _ = &mut builder;
        assert_eq!(decode_compound(&bye_only), Err(Error::InvalidCompound));
    }

    #[test]
    fn rejects_padding_bit_set_on_a_non_final_record() {
        // SR with the padding bit set, followed by a BYE: padding must only
        // ever appear on the compound's last record (RFC 3550 §6.1).
        let mut compound = bytes::BytesMut::new();
        compound.extend_from_slice(&[(2u8 << 6) | (1 << 5), PT_SR, 0, 6]);
        compound.extend_from_slice(&1u32.to_be_bytes());
        compound.extend_from_slice(&[0u8; 24]);
        compound.extend_from_slice(&[2u8 << 6, PT_BYE, 0, 1]);
        compound.extend_from_slice(&1u32.to_be_bytes());
        assert_eq!(decode_compound(&compound), Err(Error::InvalidCompound));
    }

    #[test]
    fn rejects_truncated_compound() {
        assert_eq!(decode_compound(&[0x80, PT_RR, 0, 5]), Err(Error::InvalidCompound));
    }
}
