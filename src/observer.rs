use std::net::SocketAddr;

use session::{ParticipantEvents, SessionObserver};

use crate::statistics::Statistics;

/// Default observer: logs every callback and feeds the process-wide
/// counters. A caller embedding this crate elsewhere is expected to
/// implement `SessionObserver` directly rather than use this one.
#[derive(Debug, Clone)]
pub struct Observer {
    statistics: Statistics,
}

impl Observer {
    pub fn new(statistics: Statistics) -> Self {
        Self { statistics }
    }
}

impl SessionObserver for Observer {
    fn on_dtmf_digit(&self, ssrc: u32, digit: char) {
        log::info!("dtmf digit: ssrc={ssrc}, digit={digit}");
        self.statistics.record_dtmf_digit();
    }

    fn on_ssrc_collision(&self, ssrc: u32, source: SocketAddr) {
        log::warn!("ssrc collision: ssrc={ssrc}, source={source}");
        self.statistics.record_ssrc_collision();
    }

    fn on_participant_timeout(&self, ssrc: u32) {
        log::info!("participant timed out: ssrc={ssrc}");
        self.statistics.record_participant_timeout();
    }

    fn on_invalid_packet(&self, _datagram: &[u8], source: SocketAddr) {
        log::debug!("invalid packet from {source}");
    }

    fn on_stream_lost(&self) {
        log::warn!("stream lost: max missed packets exceeded");
    }
}

impl ParticipantEvents for Observer {
    fn on_new_source(&self, ssrc: u32) {
        log::debug!("new rtcp participant: ssrc={ssrc}");
    }

    fn on_remove_source(&self, ssrc: u32) {
        log::debug!("rtcp participant removed: ssrc={ssrc}");
    }

    fn on_bye_packet(&self, ssrc: u32, reason: Option<&str>) {
        log::info!("bye: ssrc={ssrc}, reason={reason:?}");
        self.statistics.record_bye_packet();
    }

    fn on_cname_collision(&self, ssrc: u32, cname: &str) {
        log::warn!("cname collision: ssrc={ssrc}, cname={cname}");
    }

    fn on_timeout(&self, ssrc: u32) {
        self.on_participant_timeout(ssrc);
    }

    fn on_unknown_packet_type(&self, payload_type: u8) {
        log::debug!("unknown rtcp packet type: {payload_type}");
    }
}
