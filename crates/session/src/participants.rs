//! RTCP participant table: per-SSRC bookkeeping, collision detection, and
//! timeout-based eviction. Shaped after the teacher's `SessionManager` — an
//! `RwLock`-guarded map, re-keyed on SSRC instead of socket identifier —
//! but the actual timeout sweeps are explicit calls the caller makes
//! periodically (RFC 3550 §6.3.5's four separate timers: general,
//! sender, BYE, SDES NOTE) rather than an internal thread, since nothing
//! about their cadence is this table's business to decide.

use crate::timer::Timer;
use ahash::HashMap;
use codec::rtcp::{App, RtcpPacket, SDES_CNAME, SDES_NOTE};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub ssrc: u32,
    pub cname: Option<String>,
    pub note: Option<String>,
    pub source: Option<SocketAddr>,
    pub last_seen: u64,
    pub last_rtcp_seen: u64,
    pub packets_received: u64,
    pub octets_received: u64,
    /// Set once an RTCP SR/RR/SDES/RTP packet has been seen from this
    /// participant, distinguishing it from a probationary CSRC-only entry.
    pub validated: bool,
    pub is_sender: bool,
    pub bye_pending: bool,
    /// Set when this SSRC has been seen as a CSRC in another participant's
    /// RTP packets (RFC 3550 §4's "contributing source"), e.g. from a
    /// mixer relaying its inputs.
    pub csrc_observed: bool,
    bye_seen: Option<u64>,
    note_seen: Option<u64>,
}

impl Participant {
    fn new(ssrc: u32, now: u64) -> Self {
        Self {
            ssrc,
            cname: None,
            note: None,
            source: None,
            last_seen: now,
            last_rtcp_seen: 0,
            packets_received: 0,
            octets_received: 0,
            validated: false,
            is_sender: false,
            bye_pending: false,
            csrc_observed: false,
            bye_seen: None,
            note_seen: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantCounts {
    pub member_count: usize,
    pub sender_count: usize,
    pub active_count: usize,
}

/// Lifecycle and collision callbacks the call layer can observe. Every
/// method has a no-op default, matching the capability-set pattern used
/// for [`crate::endpoint::SessionObserver`] — implement only the events a
/// particular caller cares about.
#[allow(unused_variables)]
pub trait ParticipantEvents: Send + Sync {
    fn on_new_source(&self, ssrc: u32) {}
    fn on_remove_source(&self, ssrc: u32) {}
    fn on_rtp_packet(&self, ssrc: u32) {}
    fn on_rtcp_compound_packet(&self, ssrc: Option<u32>) {}
    fn on_app_packet(&self, app: &App) {}
    fn on_bye_packet(&self, ssrc: u32, reason: Option<&str>) {}
    fn on_ssrc_collision(&self, ssrc: u32, source: SocketAddr) {}
    fn on_cname_collision(&self, ssrc: u32, cname: &str) {}
    fn on_timeout(&self, ssrc: u32) {}
    fn on_bye_timeout(&self, ssrc: u32) {}
    fn on_note_timeout(&self, ssrc: u32) {}
    fn on_unknown_packet_type(&self, payload_type: u8) {}
}

#[derive(Debug, Default)]
pub struct NullParticipantEvents;
impl ParticipantEvents for NullParticipantEvents {}

#[derive(Debug, Clone, Copy)]
pub struct ParticipantTableOptions {
    pub timeout_secs: u64,
}

impl Default for ParticipantTableOptions {
    fn default() -> Self {
        // Five RTCP reporting intervals of silence, the conventional
        // multiple used for participant timeout (RFC 3550 §6.3.5).
        Self { timeout_secs: 25 }
    }
}

struct Inner {
    participants: RwLock<HashMap<u32, Participant>>,
    own_ssrc: Mutex<Option<u32>>,
    timer: Timer,
    options: ParticipantTableOptions,
}

/// Shared handle to the participant table; cloning shares state, dropping
/// the last handle stops the background timer thread.
#[derive(Clone)]
pub struct ParticipantTable {
    inner: Arc<Inner>,
}

impl ParticipantTable {
    pub fn new(options: ParticipantTableOptions) -> Self {
        let inner = Arc::new(Inner {
            participants: RwLock::new(HashMap::default()),
            own_ssrc: Mutex::new(None),
            timer: Timer::new(),
            options,
        });

        let weak = Arc::downgrade(&inner);
        thread::spawn(move || {
            while let Some(inner) = weak.upgrade() {
                thread::sleep(Duration::from_secs(1));
                inner.timer.add(1);
            }
        });

        Self { inner }
    }

    pub fn now(&self) -> u64 {
        self.inner.timer.get()
    }

    pub fn own_ssrc(&self) -> Option<u32> {
        *self.inner.own_ssrc.lock()
    }

    /// Reserves `ssrc` as this session's own identifier. Fails if an own
    /// SSRC is already set, or if the value collides with a participant
    /// already learned from the network.
    pub fn create_own_ssrc(&self, ssrc: u32) -> crate::error::Result<()> {
        use crate::error::Error;
        let mut own = self.inner.own_ssrc.lock();
        if own.is_some() {
            return Err(Error::AlreadyExists);
        }

        let now = self.inner.timer.get();
        let mut table = self.inner.participants.write();
        if table.contains_key(&ssrc) {
            return Err(Error::AlreadyExists);
        }

        let mut participant = Participant::new(ssrc, now);
        participant.validated = true;
        table.insert(ssrc, participant);
        *own = Some(ssrc);
        Ok(())
    }

    pub fn delete_own_ssrc(&self) -> crate::error::Result<()> {
        use crate::error::Error;
        let mut own = self.inner.own_ssrc.lock();
        let ssrc = own.take().ok_or(Error::NotFound)?;
        self.inner.participants.write().remove(&ssrc);
        Ok(())
    }

    /// Marks the own participant (if any) as a sender, to be called once
    /// per outbound RTP packet.
    pub fn sent_rtp_packet(&self) {
        let Some(ssrc) = self.own_ssrc() else { return };
        if let Some(p) = self.inner.participants.write().get_mut(&ssrc) {
            p.is_sender = true;
        }
    }

    /// Records activity from `ssrc` arriving as RTP. Returns `true` if
    /// this call detects a collision: either the SSRC is our own (RFC 3550
    /// §8.2 — nothing ever arrives from the network claiming our own
    /// identity legitimately) or it is already bound to a different source
    /// address than the one reporting now; on collision the new address is
    /// NOT installed and no other state is mutated. On a non-colliding
    /// (validated) packet, each id in `csrcs` is resolved to its own
    /// participant record and marked `csrc_observed`, per spec.md §4.6
    /// ("validated participants additionally resolve each CSRC, marking
    /// those records as CSRC-observed").
    pub fn process_rtp(
        &self,
        ssrc: u32,
        source: SocketAddr,
        payload_len: usize,
        csrcs: impl Iterator<Item = u32>,
        events: &dyn ParticipantEvents,
    ) -> bool {
        if self.own_ssrc() == Some(ssrc) {
            log::warn!("ssrc collision: ssrc={ssrc}, source={source}");
            events.on_ssrc_collision(ssrc, source);
            return true;
        }

        let now = self.inner.timer.get();
        let mut table = self.inner.participants.write();
        let is_new = !table.contains_key(&ssrc);
        let entry = table.entry(ssrc).or_insert_with(|| Participant::new(ssrc, now));

        let collision = entry.source.is_some_and(|existing| existing != source);
        if collision {
            drop(table);
            log::warn!("ssrc collision: ssrc={ssrc}, source={source}");
            events.on_ssrc_collision(ssrc, source);
            return true;
        }

        entry.source = Some(source);
        entry.validated = true;
        entry.last_seen = now;
        entry.packets_received += 1;
        entry.octets_received += payload_len as u64;

        for csrc in csrcs {
            table
                .entry(csrc)
                .or_insert_with(|| Participant::new(csrc, now))
                .csrc_observed = true;
        }
        drop(table);

        if is_new {
            log::debug!("new source: ssrc={ssrc}, source={source}");
            events.on_new_source(ssrc);
        }
        events.on_rtp_packet(ssrc);
        false
    }

    /// Backwards-compatible alias for [`Self::process_rtp`] that drops the
    /// CSRC list and event callbacks, for callers that only care about the
    /// collision verdict.
    pub fn touch(&self, ssrc: u32, source: SocketAddr, payload_len: usize) -> bool {
        self.process_rtp(ssrc, source, payload_len, std::iter::empty(), &NullParticipantEvents)
    }

    /// Routes a decoded RTCP compound packet into participant updates,
    /// firing the matching lifecycle callback per record (RFC 3550 §6.3.3,
    /// §6.3.4, §6.5, §6.6, §6.7).
    pub fn process_rtcp(&self, packets: &[RtcpPacket], source: SocketAddr, events: &dyn ParticipantEvents) {
        let own = self.own_ssrc();
        let leading_ssrc = match packets.first() {
            Some(RtcpPacket::SenderReport(sr)) => Some(sr.ssrc),
            Some(RtcpPacket::ReceiverReport(rr)) => Some(rr.ssrc),
            _ => None,
        };
        events.on_rtcp_compound_packet(leading_ssrc);

        for packet in packets {
            match packet {
                RtcpPacket::SenderReport(sr) => self.update_rtcp_source(sr.ssrc, source, true, events),
                RtcpPacket::ReceiverReport(rr) => self.update_rtcp_source(rr.ssrc, source, false, events),
                RtcpPacket::SourceDescription(chunks) => {
                    for chunk in chunks {
                        self.update_rtcp_source(chunk.ssrc, source, false, events);
                        for item in &chunk.items {
                            match item.kind {
                                SDES_CNAME => self.set_or_collide_cname(chunk.ssrc, &item.text, events),
                                SDES_NOTE => self.set_note(chunk.ssrc, &item.text),
                                _ => {}
                            }
                        }
                    }
                }
                RtcpPacket::Bye(bye) => {
                    let now = self.inner.timer.get();
                    for &ssrc in &bye.sources {
                        if Some(ssrc) == own {
                            continue;
                        }
                        if let Some(p) = self.inner.participants.write().get_mut(&ssrc) {
                            p.bye_pending = true;
                            p.bye_seen = Some(now);
                        }
                        events.on_bye_packet(ssrc, bye.reason.as_deref());
                    }
                }
                RtcpPacket::App(app) => events.on_app_packet(app),
                RtcpPacket::Unknown { payload_type, .. } => events.on_unknown_packet_type(*payload_type),
            }
        }
    }

    fn update_rtcp_source(&self, ssrc: u32, source: SocketAddr, is_sender: bool, events: &dyn ParticipantEvents) {
        let now = self.inner.timer.get();
        let mut table = self.inner.participants.write();
        let is_new = !table.contains_key(&ssrc);
        let entry = table.entry(ssrc).or_insert_with(|| Participant::new(ssrc, now));

        let collision = entry.source.is_some_and(|existing| existing != source);
        if !collision {
            entry.source = Some(source);
        }
        entry.validated = true;
        entry.last_seen = now;
        entry.last_rtcp_seen = now;
        if is_sender {
            entry.is_sender = true;
        }
        drop(table);

        if is_new {
            log::debug!("new source: ssrc={ssrc}, source={source}");
            events.on_new_source(ssrc);
        }
        if collision {
            log::warn!("ssrc collision: ssrc={ssrc}, source={source}");
            events.on_ssrc_collision(ssrc, source);
        }
    }

    fn set_or_collide_cname(&self, ssrc: u32, cname: &str, events: &dyn ParticipantEvents) {
        let mut table = self.inner.participants.write();
        let Some(p) = table.get_mut(&ssrc) else { return };
        match &p.cname {
            Some(existing) if existing != cname => {
                drop(table);
                log::warn!("cname collision: ssrc={ssrc}, cname={cname:?}");
                events.on_cname_collision(ssrc, cname);
            }
            _ => p.cname = Some(cname.to_string()),
        }
    }

    fn set_note(&self, ssrc: u32, note: &str) {
        let now = self.inner.timer.get();
        if let Some(p) = self.inner.participants.write().get_mut(&ssrc) {
            p.note = Some(note.to_string());
            p.note_seen = Some(now);
        }
    }

    pub fn set_cname(&self, ssrc: u32, cname: String) {
        let now = self.inner.timer.get();
        let mut table = self.inner.participants.write();
        table.entry(ssrc).or_insert_with(|| Participant::new(ssrc, now)).cname = Some(cname);
    }

    /// Removes participants whose `last_seen` is older than `general`
    /// seconds (RFC 3550 §6.3.5). The own participant is never evicted.
    pub fn timeout(&self, general: u64, events: &dyn ParticipantEvents) {
        let now = self.inner.timer.get();
        let own = self.own_ssrc();
        let mut removed = Vec::new();
        self.inner.participants.write().retain(|&ssrc, p| {
            if Some(ssrc) == own {
                return true;
            }
            let alive = now.saturating_sub(p.last_seen) < general;
            if !alive {
                removed.push(ssrc);
            }
            alive
        });
        for ssrc in removed {
            log::debug!("participant timed out: ssrc={ssrc}");
            events.on_timeout(ssrc);
            events.on_remove_source(ssrc);
        }
    }

    /// Clears the sender flag on participants that haven't been heard
    /// from (via RTCP) in `sender` seconds, without removing them.
    pub fn sender_timeout(&self, sender: u64) {
        let now = self.inner.timer.get();
        for p in self.inner.participants.write().values_mut() {
            if p.is_sender && now.saturating_sub(p.last_rtcp_seen.max(p.last_seen)) >= sender {
                p.is_sender = false;
            }
        }
    }

    /// Removes participants that sent BYE more than `bye` seconds ago.
    pub fn bye_timeout(&self, bye: u64, events: &dyn ParticipantEvents) {
        let now = self.inner.timer.get();
        let mut removed = Vec::new();
        self.inner.participants.write().retain(|&ssrc, p| {
            match p.bye_seen {
                Some(seen) if now.saturating_sub(seen) >= bye => {
                    removed.push(ssrc);
                    false
                }
                _ => true,
            }
        });
        for ssrc in removed {
            events.on_bye_timeout(ssrc);
        }
    }

    /// Clears SDES NOTE items that haven't been refreshed in `note`
    /// seconds.
    pub fn note_timeout(&self, note: u64, events: &dyn ParticipantEvents) {
        let now = self.inner.timer.get();
        for (&ssrc, p) in self.inner.participants.write().iter_mut() {
            if let Some(seen) = p.note_seen {
                if now.saturating_sub(seen) >= note {
                    p.note = None;
                    p.note_seen = None;
                    events.on_note_timeout(ssrc);
                }
            }
        }
    }

    pub fn remove(&self, ssrc: u32) -> Option<Participant> {
        self.inner.participants.write().remove(&ssrc)
    }

    pub fn get(&self, ssrc: u32) -> Option<Participant> {
        self.inner.participants.read().get(&ssrc).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.participants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> ParticipantCounts {
        let table = self.inner.participants.read();
        ParticipantCounts {
            member_count: table.len(),
            sender_count: table.values().filter(|p| p.is_sender).count(),
            active_count: table.values().filter(|p| p.validated && !p.bye_pending).count(),
        }
    }
}
