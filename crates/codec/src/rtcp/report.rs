//! Sender Report / Receiver Report payloads (RFC 3550 §6.4).

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

pub const REPORT_BLOCK_LEN: usize = 24;
pub const SENDER_INFO_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: i32,
    pub highest_seq: u32,
    pub jitter: u32,
    pub last_sr: u32,
    pub delay_since_last_sr: u32,
}

impl ReportBlock {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < REPORT_BLOCK_LEN {
            return Err(Error::InvalidPacket);
        }

        let ssrc = u32::from_be_bytes(buf[0..4].try_into()?);
        let fraction_lost = buf[4];
        let cumulative_lost = sign_extend_24(&buf[5..8]);
        let highest_seq = u32::from_be_bytes(buf[8..12].try_into()?);
        let jitter = u32::from_be_bytes(buf[12..16].try_into()?);
        let last_sr = u32::from_be_bytes(buf[16..20].try_into()?);
        let delay_since_last_sr = u32::from_be_bytes(buf[20..24].try_into()?);

        Ok(Self {
            ssrc,
            fraction_lost,
            cumulative_lost,
            highest_seq,
            jitter,
            last_sr,
            delay_since_last_sr,
        })
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32(self.ssrc);
        out.put_u8(self.fraction_lost);
        let bytes = self.cumulative_lost.to_be_bytes();
        out.extend_from_slice(&bytes[1..4]);
        out.put_u32(self.highest_seq);
        out.put_u32(self.jitter);
        out.put_u32(self.last_sr);
        out.put_u32(self.delay_since_last_sr);
    }
}

fn sign_extend_24(buf: &[u8]) -> i32 {
    let mut v = ((buf[0] as i32) << 16) | ((buf[1] as i32) << 8) | buf[2] as i32;
    if v & 0x0080_0000 != 0 {
        v |= !0x00FF_FFFFi32;
    }
    v
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenderInfo {
    pub ntp_sec: u32,
    pub ntp_frac: u32,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderInfo {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < SENDER_INFO_LEN {
            return Err(Error::InvalidPacket);
        }

        Ok(Self {
            ntp_sec: u32::from_be_bytes(buf[0..4].try_into()?),
            ntp_frac: u32::from_be_bytes(buf[4..8].try_into()?),
            rtp_timestamp: u32::from_be_bytes(buf[8..12].try_into()?),
            packet_count: u32::from_be_bytes(buf[12..16].try_into()?),
            octet_count: u32::from_be_bytes(buf[16..20].try_into()?),
        })
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32(self.ntp_sec);
        out.put_u32(self.ntp_frac);
        out.put_u32(self.rtp_timestamp);
        out.put_u32(self.packet_count);
        out.put_u32(self.octet_count);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderReport {
    pub ssrc: u32,
    pub sender_info: SenderInfo,
    pub reports: Vec<ReportBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_block_round_trips_negative_cumulative_lost() {
        let block = ReportBlock {
            ssrc: 1,
            fraction_lost: 10,
            cumulative_lost: -5,
            highest_seq: 99,
            jitter: 3,
            last_sr: 7,
            delay_since_last_sr: 8,
        };

        let mut out = BytesMut::new();
        block.encode(&mut out);
        assert_eq!(ReportBlock::decode(&out).unwrap(), block);
    }
}
