//! RTP header pack/unpack (RFC 3550 §5.1).
//!
//! Bit-fields in the first header octet are extracted with explicit
//! shift/mask rather than a struct overlay, so behavior does not depend on
//! host endianness (see DESIGN.md, "raw struct overlays").

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

pub const RTP_HEADER_LEN: usize = 12;

/// The first-octet marker+payload-type byte values that collide with the
/// RTCP SR/RR packet-type indicators. A packet whose second octet equals
/// one of these is routed away as invalid rather than accepted as media.
const RTCP_SR_MARKER_COLLISION: u8 = 200;
const RTCP_RR_MARKER_COLLISION: u8 = 201;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl Default for RtpHeader {
    fn default() -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
        }
    }
}

/// Borrowed view of a decoded RTP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub header: RtpHeader,
    pub csrcs_offset: usize,
    pub csrcs_count: u8,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    pub fn csrcs(&self, buf: &'a [u8]) -> impl Iterator<Item = u32> + 'a {
        let start = self.csrcs_offset;
        (0..self.csrcs_count as usize).map(move |i| {
            let off = start + i * 4;
            u32::from_be_bytes(buf[off..off + 4].try_into().unwrap())
        })
    }
}

/// Decodes a wire RTP packet.
///
/// Succeeds iff `buf.len() >= 12`, `version == 2`, the computed payload
/// offset does not exceed `buf.len()`, the padding count (when padding is
/// set) is within `[1, remaining_len]`, and the marker/payload-type byte
/// does not collide with an RTCP SR/RR indicator.
///
/// # Examples
///
/// ```
/// use rtpcore_codec::rtp::{decode_rtp, encode_rtp, RtpHeader};
/// use bytes::BytesMut;
///
/// let header = RtpHeader {
///     marker: true,
///     payload_type: 0,
///     sequence_number: 42,
///     timestamp: 160,
///     ssrc: 0xdead_beef,
///     ..Default::default()
/// };
///
/// let mut buf = BytesMut::new();
/// encode_rtp(&header, &[], b"hello", &mut buf).unwrap();
///
/// let packet = decode_rtp(&buf).unwrap();
/// assert_eq!(packet.header, header);
/// assert_eq!(packet.payload, b"hello");
/// ```
pub fn decode_rtp(buf: &[u8]) -> Result<RtpPacket<'_>> {
    if buf.len() < RTP_HEADER_LEN {
        return Err(Error::InvalidPacket);
    }

    let first = buf[0];
    let version = (first >> 6) & 0x03;
    let padding = (first >> 5) & 0x01 == 1;
    let extension = (first >> 4) & 0x01 == 1;
    let csrc_count = first & 0x0F;

    if version != 2 {
        return Err(Error::InvalidPacket);
    }

    let second = buf[1];
    if second == RTCP_SR_MARKER_COLLISION || second == RTCP_RR_MARKER_COLLISION {
        return Err(Error::InvalidPacket);
    }

    let marker = (second >> 7) & 0x01 == 1;
    let payload_type = second & 0x7F;
    let sequence_number = u16::from_be_bytes(buf[2..4].try_into()?);
    let timestamp = u32::from_be_bytes(buf[4..8].try_into()?);
    let ssrc = u32::from_be_bytes(buf[8..12].try_into()?);

    let csrcs_offset = RTP_HEADER_LEN;
    let mut payload_offset = csrcs_offset + csrc_count as usize * 4;
    if payload_offset > buf.len() {
        return Err(Error::InvalidPacket);
    }

    if extension {
        if payload_offset + 4 > buf.len() {
            return Err(Error::InvalidPacket);
        }

        let ext_len_words =
            u16::from_be_bytes(buf[payload_offset + 2..payload_offset + 4].try_into()?) as usize;
        payload_offset += 4 + ext_len_words * 4;
        if payload_offset > buf.len() {
            return Err(Error::InvalidPacket);
        }
    }

    let mut payload = &buf[payload_offset..];
    if padding {
        let pad_count = *payload.last().ok_or(Error::InvalidPacket)? as usize;
        if pad_count < 1 || pad_count > payload.len() {
            return Err(Error::InvalidPacket);
        }

        payload = &payload[..payload.len() - pad_count];
    }

    Ok(RtpPacket {
        header: RtpHeader {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        },
        csrcs_offset,
        csrcs_count: csrc_count,
        payload,
    })
}

/// Serializes an RTP header, CSRC list and payload into `out`.
///
/// `csrcs.len()` is written as the header's CSRC count regardless of
/// `header.csrc_count`, so callers do not need to keep the two in sync.
pub fn encode_rtp(header: &RtpHeader, csrcs: &[u32], payload: &[u8], out: &mut BytesMut) -> Result<()> {
    if csrcs.len() > 0x0F {
        return Err(Error::InvalidPacket);
    }

    out.clear();

    let first = ((header.version & 0x03) << 6)
        | ((header.padding as u8) << 5)
        | ((header.extension as u8) << 4)
        | (csrcs.len() as u8 & 0x0F);
    out.put_u8(first);

    let second = ((header.marker as u8) << 7) | (header.payload_type & 0x7F);
    out.put_u8(second);

    out.put_u16(header.sequence_number);
    out.put_u32(header.timestamp);
    out.put_u32(header.ssrc);

    for csrc in csrcs {
        out.put_u32(*csrc);
    }

    out.extend_from_slice(payload);
    Ok(())
}
