use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    dtmf_digits_received: AtomicU64,
    ssrc_collisions: AtomicU64,
    participants_timed_out: AtomicU64,
    bye_packets: AtomicU64,
}

/// Process-wide counters, cheaply cloneable and safe to share across
/// however many session endpoints a process hosts.
#[derive(Debug, Clone, Default)]
pub struct Statistics(Arc<Counters>);

impl Statistics {
    pub fn record_received(&self, bytes: usize) {
        self.0.packets_received.fetch_add(1, Ordering::Relaxed);
        self.0.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.0.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.0.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dtmf_digit(&self) {
        self.0.dtmf_digits_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ssrc_collision(&self) {
        self.0.ssrc_collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_participant_timeout(&self) {
        self.0.participants_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bye_packet(&self) {
        self.0.bye_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            packets_received: self.0.packets_received.load(Ordering::Relaxed),
            packets_sent: self.0.packets_sent.load(Ordering::Relaxed),
            bytes_received: self.0.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.0.bytes_sent.load(Ordering::Relaxed),
            dtmf_digits_received: self.0.dtmf_digits_received.load(Ordering::Relaxed),
            ssrc_collisions: self.0.ssrc_collisions.load(Ordering::Relaxed),
            participants_timed_out: self.0.participants_timed_out.load(Ordering::Relaxed),
            bye_packets: self.0.bye_packets.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatisticsSnapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub dtmf_digits_received: u64,
    pub ssrc_collisions: u64,
    pub participants_timed_out: u64,
    pub bye_packets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_clones() {
        let stats = Statistics::default();
        let handle = stats.clone();

        stats.record_received(160);
        handle.record_sent(80);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_received, 1);
        assert_eq!(snapshot.bytes_received, 160);
        assert_eq!(snapshot.packets_sent, 1);
        assert_eq!(snapshot.bytes_sent, 80);
    }
}
