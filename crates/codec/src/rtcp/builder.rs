//! Compound packet builder.
//!
//! Walks `Idle -> Building -> Built` exactly once per instance, the same
//! shape as other encode-side state machines in this codec: the first
//! `add_sender_report`/`add_receiver_report` call is what's allowed to open
//! the compound (RFC 3550 requires it lead), everything else appends to an
//! already-open compound, and `build` seals it.

use super::{App, Bye, RtcpPacket, SdesChunk, SenderInfo, SenderReport, ReceiverReport, ReportBlock};
use super::{PT_APP, PT_BYE, PT_RR, PT_SDES, PT_SR};
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Smallest record that can legally sit in a compound packet: a 4-byte
/// header plus a bare RR SSRC, no report blocks.
pub const MIN_PACKET_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Idle,
    Building,
    Built,
}

#[derive(Debug, Default)]
pub struct RtcpCompoundBuilder {
    state_building: bool,
    built: bool,
    sections: Vec<RtcpPacket>,
    padding: bool,
    /// Total wire-byte budget for the eventual `build()`, set by `init`.
    /// `None` (from `new()`) means no caller-imposed bound.
    budget: Option<usize>,
    committed: usize,
}

impl RtcpCompoundBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the eventual output to at most `max_size` bytes. Every
    /// subsequent `add_*` call checks its section's encoded length against
    /// the remaining budget before committing it, per spec.md §4.5,
    /// returning `NotEnoughBytesLeft` (and mutating nothing) on overflow.
    pub fn init(max_size: usize) -> Result<Self> {
        if max_size < MIN_PACKET_SIZE {
            return Err(Error::NotEnoughBytesLeft);
        }
        Ok(Self { budget: Some(max_size), ..Self::default() })
    }

    fn state(&self) -> BuilderState {
        if self.built {
            BuilderState::Built
        } else if self.state_building {
            BuilderState::Building
        } else {
            BuilderState::Idle
        }
    }

    /// Encodes `section` into a scratch buffer to measure its wire length
    /// without touching builder state, so a budget check can run before any
    /// mutation.
    fn section_len(section: &RtcpPacket) -> Result<usize> {
        let mut scratch = BytesMut::new();
        encode_section(section, false, &mut scratch)?;
        Ok(scratch.len())
    }

    /// Charges `len` bytes against the remaining budget. Leaves `committed`
    /// untouched and returns `NotEnoughBytesLeft` on overflow; advances it
    /// and returns `Ok` otherwise.
    fn charge(&mut self, len: usize) -> Result<()> {
        if let Some(budget) = self.budget {
            if self.committed + len > budget {
                return Err(Error::NotEnoughBytesLeft);
            }
        }
        self.committed += len;
        Ok(())
    }

    fn push_leading(&mut self, packet: RtcpPacket) -> Result<()> {
        if self.state() == BuilderState::Built {
            return Err(Error::InvalidState);
        }
        let len = Self::section_len(&packet)?;
        self.charge(len)?;
        self.state_building = true;
        self.sections.push(packet);
        Ok(())
    }

    fn push_trailing(&mut self, packet: RtcpPacket) -> Result<()> {
        if self.state() != BuilderState::Building {
            return Err(Error::InvalidState);
        }
        let len = Self::section_len(&packet)?;
        self.charge(len)?;
        self.sections.push(packet);
        Ok(())
    }

    pub fn add_sender_report(&mut self, report: SenderReport) -> Result<&mut Self> {
        self.add_report_chunks(report.ssrc, Some(report.sender_info), report.reports)?;
        Ok(self)
    }

    pub fn add_receiver_report(&mut self, report: ReceiverReport) -> Result<&mut Self> {
        self.add_report_chunks(report.ssrc, None, report.reports)?;
        Ok(self)
    }

    /// Splits `reports` into groups of at most 31 blocks (the header's
    /// 5-bit count field), each becoming its own record under `ssrc`, per
    /// spec.md §4.5 ("additional blocks start a new SR/RR record under the
    /// same sender"). Only the first group carries `sender_info`;
    /// continuation groups (and any receiver-only call) are always RR,
    /// since sender info is carried exactly once per sender. Charging is
    /// atomic across every group: if the total would overflow the budget,
    /// nothing is committed.
    fn add_report_chunks(
        &mut self,
        ssrc: u32,
        sender_info: Option<SenderInfo>,
        reports: Vec<ReportBlock>,
    ) -> Result<()> {
        if self.state() == BuilderState::Built {
            return Err(Error::InvalidState);
        }

        let groups: Vec<&[ReportBlock]> = if reports.is_empty() {
            vec![&[]]
        } else {
            reports.chunks(31).collect()
        };

        let mut packets = Vec::with_capacity(groups.len());
        for (i, blocks) in groups.into_iter().enumerate() {
            let packet = match (i, sender_info) {
                (0, Some(info)) => RtcpPacket::SenderReport(SenderReport {
                    ssrc,
                    sender_info: info,
                    reports: blocks.to_vec(),
                }),
                _ => RtcpPacket::ReceiverReport(ReceiverReport { ssrc, reports: blocks.to_vec() }),
            };
            packets.push(packet);
        }

        let mut total = 0usize;
        for packet in &packets {
            total += Self::section_len(packet)?;
        }
        self.charge(total)?;
        self.state_building = true;
        self.sections.extend(packets);
        Ok(())
    }

    pub fn add_sdes(&mut self, chunks: Vec<SdesChunk>) -> Result<&mut Self> {
        self.push_trailing(RtcpPacket::SourceDescription(chunks))?;
        Ok(self)
    }

    /// Adds a BYE record. `bye.sources.len()` must be at most 31 (the
    /// header's 5-bit count field) and `bye.reason`, if present, at most
    /// 255 bytes (its own 8-bit length prefix), per spec.md §4.5.
    pub fn add_bye(&mut self, bye: Bye) -> Result<&mut Self> {
        if bye.sources.len() > 31 || bye.reason.as_ref().is_some_and(|r| r.len() > 255) {
            return Err(Error::NotEnoughBytesLeft);
        }
        self.push_trailing(RtcpPacket::Bye(bye))?;
        Ok(self)
    }

    /// Adds an APP record. `app.data` must already be a multiple of 4
    /// bytes and at most 65533 words, per spec.md §4.5 and RFC 3550 §6.7 —
    /// the builder validates this rather than silently padding, since a
    /// caller-supplied APP payload's length is part of its own wire
    /// contract with whatever reads it back. `app.subtype` must fit the
    /// header's 5-bit count field (`<= 31`).
    pub fn add_app(&mut self, app: App) -> Result<&mut Self> {
        if app.subtype > 31 || app.data.len() % 4 != 0 || app.data.len() / 4 > 65533 {
            return Err(Error::NotEnoughBytesLeft);
        }
        self.push_trailing(RtcpPacket::App(app))?;
        Ok(self)
    }

    /// Requests that the last record on the wire carry the padding bit, per
    /// RFC 3550 §6.1 ("padding, if present, is only on the last record").
    /// Since `build()` reorders sections into report->sdes->app->bye rank,
    /// which section ends up last depends on what was added, not call order.
    pub fn set_padding(&mut self, padding: bool) -> &mut Self {
        self.padding = padding;
        self
    }

    /// Serializes every queued section and seals the builder, regardless of
    /// the order sections were added in: RTCP record order on the wire is
    /// always report (SR/RR) -> SDES -> APP -> BYE, per spec.md §4.5 and
    /// `rtcpcompoundpacketbuilder.cpp`'s canonical ordering. A second call
    /// returns `Error::InvalidState`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rtpcore_codec::rtcp::{RtcpCompoundBuilder, SenderReport, SenderInfo};
    ///
    /// let mut builder = RtcpCompoundBuilder::new();
    /// builder
    ///     .add_sender_report(SenderReport {
    ///         ssrc: 1,
    ///         sender_info: SenderInfo::default(),
    ///         reports: vec![],
    ///     })
    ///     .unwrap();
    /// let bytes = builder.build().unwrap();
    /// assert!(!bytes.is_empty());
    /// assert!(builder.build().is_err());
    /// ```
    pub fn build(&mut self) -> Result<BytesMut> {
        if self.state() != BuilderState::Building {
            return Err(Error::InvalidState);
        }

        fn rank(section: &RtcpPacket) -> u8 {
            match section {
                RtcpPacket::SenderReport(_) | RtcpPacket::ReceiverReport(_) => 0,
                RtcpPacket::SourceDescription(_) => 1,
                RtcpPacket::App(_) => 2,
                RtcpPacket::Bye(_) => 3,
                RtcpPacket::Unknown { .. } => 4,
            }
        }

        let mut ordered: Vec<&RtcpPacket> = self.sections.iter().collect();
        ordered.sort_by_key(|section| rank(section));

        let last = ordered.len().saturating_sub(1);
        let mut out = BytesMut::new();
        for (i, section) in ordered.into_iter().enumerate() {
            encode_section(section, self.padding && i == last, &mut out)?;
        }

        self.built = true;
        Ok(out)
    }
}

fn encode_section(section: &RtcpPacket, padding: bool, out: &mut BytesMut) -> Result<()> {
    let mut body = BytesMut::new();
    let (payload_type, count) = match section {
        RtcpPacket::SenderReport(report) => {
            if report.reports.len() > 31 {
                return Err(Error::NotEnoughBytesLeft);
            }
            body.put_u32(report.ssrc);
            report.sender_info.encode(&mut body);
            for block in &report.reports {
                block.encode(&mut body);
            }
            (PT_SR, report.reports.len() as u8)
        }
        RtcpPacket::ReceiverReport(report) => {
            if report.reports.len() > 31 {
                return Err(Error::NotEnoughBytesLeft);
            }
            body.put_u32(report.ssrc);
            for block in &report.reports {
                block.encode(&mut body);
            }
            (PT_RR, report.reports.len() as u8)
        }
        RtcpPacket::SourceDescription(chunks) => {
            if chunks.len() > 31 {
                return Err(Error::NotEnoughBytesLeft);
            }
            for chunk in chunks {
                chunk.encode(&mut body);
            }
            (PT_SDES, chunks.len() as u8)
        }
        RtcpPacket::Bye(bye) => {
            let count = bye.source_count();
            bye.encode(&mut body);
            (PT_BYE, count)
        }
        RtcpPacket::App(app) => {
            app.encode(&mut body);
            (PT_APP, app.subtype)
        }
        RtcpPacket::Unknown { .. } => return Err(Error::InvalidState),
    };

    if body.len() % 4 != 0 {
        return Err(Error::InvalidCompound);
    }

    let length_words = (4 + body.len()) / 4 - 1;
    if length_words > u16::MAX as usize {
        return Err(Error::NotEnoughBytesLeft);
    }

    out.put_u8((2 << 6) | ((padding as u8) << 5) | (count & 0x1F));
    out.put_u8(payload_type);
    out.put_u16(length_words as u16);
    out.extend_from_slice(&body);

    Ok(())
}
