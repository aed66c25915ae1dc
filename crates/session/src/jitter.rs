//! Adaptive jitter buffer.
//!
//! Three rotating queues, as in the de-jitter buffer this module is
//! modeled on: an `in_queue` that incoming frames are inserted into in
//! timestamp order, an `out_queue` that is the current playout window,
//! and an `old_queue` that still holds the previous window's leftovers
//! so a read can find a frame that arrived just before a rotation. On
//! rotation the three simply cycle: `old <- out, out <- in, in <- old`.
//!
//! The resize/drift constants below (`period_time`, `decrement_time`,
//! `max_plc`, `drift_max_dropped`) and the rotate/read algorithm are
//! carried over from the reference de-jitter buffer this replaces in
//! spirit; see DESIGN.md for the derivation.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub timestamp: u32,
    pub seq: u16,
    pub payload_type: u8,
    pub data: Vec<u8>,
    /// Set when this frame is synthesized packet-loss concealment rather
    /// than a frame that actually arrived.
    pub plc: bool,
}

/// Outcome of feeding one packet into the buffer via [`JitterBuffer::add_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    /// Accepted into the current window.
    Accepted,
    /// `samples_per_packet` has not been inferred yet; the buffer needs a
    /// few more packets with a stable timestamp delta before it can
    /// accept anything.
    NeedMoreData,
    /// The packet's timestamp is at or before a frame already delivered
    /// to the caller (or beyond the configured drift bound); dropped.
    TooLate,
    /// The marker bit forced an immediate rotation; this was the last
    /// packet of a talk spurt.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JitterReport {
    pub in_len: usize,
    pub out_len: usize,
    pub old_len: usize,
    pub qlen: usize,
    pub miss_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct JitterBufferConfig {
    pub samples_per_second: u32,
    /// `0` means infer it from the first five packets' timestamp deltas.
    pub samples_per_packet: u32,
    pub initial_qlen: usize,
    pub max_qlen: usize,
    /// `0` disables the drift bound entirely.
    pub max_drift_ms: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            samples_per_second: 8000,
            samples_per_packet: 160,
            initial_qlen: 10,
            max_qlen: 300,
            max_drift_ms: 0,
        }
    }
}

pub struct JitterBuffer {
    config: JitterBufferConfig,
    qlen: usize,
    orig_qlen: usize,
    period_time: u64,
    decrement_time: u64,
    max_plc: u32,

    in_queue: VecDeque<Frame>,
    out_queue: VecDeque<Frame>,
    old_queue: VecDeque<Frame>,

    ready: bool,
    samples_per_packet: u32,
    last_ts_diff: Option<i64>,
    same_ts_run: u32,
    last_rd_ts: u32,

    ts_offset: i64,
    ts_drift: i64,
    max_drift: i64,
    drift_dropped_packets: u32,
    drift_max_dropped: u32,

    cur_ts: u32,
    cur_ts_started: bool,
    last_wr_ts: u32,
    miss_count: u32,
    plc_pt: u8,
    plc_len: usize,

    period_packet_in_count: u64,
    period_missing_count: u64,
    period_clean_count: u64,
    consecutive_good_count: u64,
}

impl JitterBuffer {
    pub fn new(config: JitterBufferConfig) -> Self {
        let samples_per_packet = config.samples_per_packet;
        let period_time = if samples_per_packet > 0 {
            (config.samples_per_second as u64 * 20) / samples_per_packet as u64
        } else {
            u64::MAX
        };
        let decrement_time = if samples_per_packet > 0 {
            (config.samples_per_second as u64 * 15) / samples_per_packet as u64
        } else {
            u64::MAX
        };
        let max_drift = -(config.max_drift_ms as i64 * (config.samples_per_second as i64 / 1000));
        let drift_max_dropped = if config.max_drift_ms > 0 && samples_per_packet > 0 {
            (config.samples_per_second * 2) / samples_per_packet
        } else {
            0
        };

        Self {
            orig_qlen: config.initial_qlen,
            qlen: config.initial_qlen,
            period_time,
            decrement_time,
            max_plc: (config.initial_qlen / 2).max(1) as u32,
            in_queue: VecDeque::new(),
            out_queue: VecDeque::new(),
            old_queue: VecDeque::new(),
            ready: false,
            samples_per_packet,
            last_ts_diff: None,
            same_ts_run: 0,
            last_rd_ts: 0,
            ts_offset: 0,
            ts_drift: 0,
            max_drift,
            drift_dropped_packets: 0,
            drift_max_dropped,
            cur_ts: 0,
            cur_ts_started: false,
            last_wr_ts: 0,
            miss_count: 0,
            plc_pt: 0,
            plc_len: 0,
            period_packet_in_count: 0,
            period_missing_count: 0,
            period_clean_count: 0,
            consecutive_good_count: 0,
            config,
        }
    }

    pub fn qlen(&self) -> usize {
        self.qlen
    }

    pub fn samples_per_packet(&self) -> u32 {
        self.samples_per_packet
    }

    pub fn max_plc(&self) -> u32 {
        self.max_plc
    }

    /// Inserts one arriving frame in timestamp order and rotates the
    /// queues once the current window fills or `last` (the RTP marker
    /// bit) closes out a talk spurt. `now` is an optional wall-clock
    /// sample count used to track playout drift.
    pub fn add_data(&mut self, ts: u32, seq: u16, payload_type: u8, data: &[u8], now: Option<u32>, last: bool) -> PutStatus {
        if self.samples_per_packet == 0 {
            if ts != 0 && self.last_rd_ts != 0 {
                let diff = ts as i64 - self.last_rd_ts as i64;
                if self.last_ts_diff == Some(diff) {
                    self.same_ts_run += 1;
                    if self.same_ts_run == 5 && diff > 0 {
                        self.samples_per_packet = diff as u32;
                        self.period_time = (self.config.samples_per_second as u64 * 20) / diff as u64;
                        self.decrement_time = (self.config.samples_per_second as u64 * 15) / diff as u64;
                        if self.config.max_drift_ms > 0 {
                            self.drift_max_dropped = (self.config.samples_per_second * 2) / self.samples_per_packet;
                        }
                    }
                } else {
                    self.same_ts_run = 0;
                }
                self.last_ts_diff = Some(diff);
            }

            if self.samples_per_packet == 0 {
                self.last_rd_ts = ts;
                return PutStatus::NeedMoreData;
            }
        }

        if let Some(now) = now {
            if ts != 0 && self.ts_offset == 0 {
                self.ts_offset = now as i64 - ts as i64;
            }
            self.ts_drift = ts as i64 + (self.ts_offset - now as i64);

            if self.max_drift != 0 {
                if self.ts_drift < self.max_drift {
                    self.drift_dropped_packets += 1;
                    if self.drift_dropped_packets < self.drift_max_dropped {
                        return PutStatus::TooLate;
                    }
                } else {
                    self.drift_dropped_packets = 0;
                }
            }
        }

        if self.last_wr_ts != 0 && ts <= self.last_wr_ts {
            return PutStatus::TooLate;
        }

        let good_ts = self.last_rd_ts != 0 && ts == self.last_rd_ts.wrapping_add(self.samples_per_packet);
        if good_ts {
            self.period_clean_count += 1;
        }
        self.period_packet_in_count += 1;
        self.last_rd_ts = ts;

        let pos = self.in_queue.iter().position(|f| f.timestamp > ts).unwrap_or(self.in_queue.len());
        self.in_queue.insert(
            pos,
            Frame {
                timestamp: ts,
                seq,
                payload_type,
                data: data.to_vec(),
                plc: false,
            },
        );

        if self.period_missing_count > (self.qlen as u64) * 2 {
            self.resize(self.qlen + 1);
            self.reset_period_counters();
        } else if self.qlen > self.orig_qlen
            && (self.consecutive_good_count > self.decrement_time || self.period_clean_count > self.decrement_time)
        {
            self.resize(self.qlen - 1);
            self.reset_period_counters();
        } else if self.period_packet_in_count > self.period_time {
            self.period_packet_in_count = 0;
            if self.period_missing_count == 0 && self.qlen > self.orig_qlen {
                self.resize(self.qlen - 1);
            }
            self.reset_period_counters();
        }

        let rotated = last || self.in_queue.len() >= self.qlen;
        if rotated {
            self.rotate();
        }

        if last {
            PutStatus::Done
        } else {
            PutStatus::Accepted
        }
    }

    fn rotate(&mut self) {
        std::mem::swap(&mut self.old_queue, &mut self.out_queue);
        std::mem::swap(&mut self.out_queue, &mut self.in_queue);
        self.in_queue.clear();
        self.miss_count = 0;
        self.ready = true;
    }

    fn reset_period_counters(&mut self) {
        self.consecutive_good_count = 0;
        self.period_clean_count = 0;
        self.period_missing_count = 0;
        self.period_packet_in_count = 0;
    }

    /// Finds and removes the frame whose timestamp falls in
    /// `(last_wr_ts, cur_ts]` from `queue`, preferring an exact match on
    /// `cur_ts`.
    fn take_in_range(queue: &mut VecDeque<Frame>, last_wr_ts: u32, cur_ts: u32) -> Option<Frame> {
        let idx = queue
            .iter()
            .position(|f| f.timestamp == cur_ts)
            .or_else(|| queue.iter().position(|f| f.timestamp > last_wr_ts && f.timestamp < cur_ts))?;
        queue.remove(idx)
    }

    /// Advances the playout cursor by one `samples_per_packet` tick and
    /// returns either the frame due at that timestamp, a synthesized PLC
    /// frame if none arrived in time, or `None` once `max_plc`
    /// consecutive misses force a reset (a stream-lost condition, by the
    /// caller's convention).
    pub fn read_frame(&mut self) -> Option<Frame> {
        if self.samples_per_packet == 0 || !self.ready {
            return None;
        }

        if !self.cur_ts_started {
            let earliest = self
                .out_queue
                .iter()
                .chain(self.in_queue.iter())
                .chain(self.old_queue.iter())
                .map(|f| f.timestamp)
                .min();
            match earliest {
                Some(ts) => {
                    self.cur_ts = ts;
                    self.cur_ts_started = true;
                }
                None => return None,
            }
        } else {
            self.cur_ts = self.cur_ts.wrapping_add(self.samples_per_packet);
        }

        let found = Self::take_in_range(&mut self.out_queue, self.last_wr_ts, self.cur_ts)
            .or_else(|| Self::take_in_range(&mut self.in_queue, self.last_wr_ts, self.cur_ts))
            .or_else(|| Self::take_in_range(&mut self.old_queue, self.last_wr_ts, self.cur_ts));

        match found {
            Some(frame) => {
                self.cur_ts = frame.timestamp;
                self.last_wr_ts = frame.timestamp;
                self.miss_count = 0;
                self.consecutive_good_count += 1;
                if !frame.data.is_empty() {
                    self.plc_len = frame.data.len();
                }
                self.plc_pt = frame.payload_type;
                Some(frame)
            }
            None => {
                self.period_missing_count += 1;
                self.consecutive_good_count = 0;
                self.miss_count += 1;
                self.last_wr_ts = self.cur_ts;

                if self.miss_count > self.max_plc {
                    self.reset();
                    return None;
                }

                Some(Frame {
                    timestamp: self.cur_ts,
                    seq: 0,
                    payload_type: self.plc_pt,
                    data: vec![0xFF; self.plc_len],
                    plc: true,
                })
            }
        }
    }

    /// Discards `n` packets' worth of in-flight state and forces a
    /// resync on the next successful read (used after a resize or when
    /// the caller detects a stream replacement, e.g. a fresh talk spurt
    /// signaled by the RTP marker bit).
    pub fn sync(&mut self, n: usize) {
        if n > self.qlen {
            self.reset();
        } else {
            self.miss_count = 0;
        }
    }

    pub fn resize(&mut self, qlen: usize) {
        let clamped = qlen.clamp(self.orig_qlen, self.config.max_qlen);
        self.qlen = clamped;
        self.max_plc = (self.qlen / 2).max(1) as u32;
    }

    /// Clears all three queues, zeroes counters, drops the inferred
    /// `samples_per_packet` if it was never explicitly configured, and
    /// re-enters the "not ready" state.
    pub fn reset(&mut self) {
        self.in_queue.clear();
        self.out_queue.clear();
        self.old_queue.clear();
        self.ready = false;
        if self.config.samples_per_packet == 0 {
            self.samples_per_packet = 0;
            self.last_ts_diff = None;
            self.same_ts_run = 0;
        }
        self.last_rd_ts = 0;
        self.cur_ts = 0;
        self.cur_ts_started = false;
        self.last_wr_ts = 0;
        self.miss_count = 0;
        self.ts_offset = 0;
        self.ts_drift = 0;
        self.drift_dropped_packets = 0;
        self.reset_period_counters();
        self.qlen = self.orig_qlen;
    }

    pub fn report(&self) -> JitterReport {
        JitterReport {
            in_len: self.in_queue.len(),
            out_len: self.out_queue.len(),
            old_len: self.old_queue.len(),
            qlen: self.qlen,
            miss_count: self.miss_count,
        }
    }
}
