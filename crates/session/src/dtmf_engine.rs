//! RFC 2833/4733 in-band telephony-event engine: an outbound train
//! scheduler and an inbound duration-ordered decoder, plus the bounded
//! digit queue the call layer drains from.

use codec::dtmf::{TelephonyEvent, EVENT_0, EVENT_9, EVENT_A, EVENT_D, EVENT_POUND, EVENT_STAR};
use std::collections::VecDeque;

pub const DEFAULT_EVENT_PAYLOAD_TYPE: u8 = 101;
const DEFAULT_DIGIT_QUEUE_CAPACITY: usize = 64;
/// Number of redundant final packets sent once a digit is released, so a
/// single lost packet at the tail of the train doesn't drop the digit.
const END_PACKET_REPEATS: u8 = 3;
/// Number of identical redundant packets sent at the onset of a digit, for
/// the same reason: RFC 4733 §2.5.1 recommends retransmitting the first
/// packet of an event so early loss doesn't hide the whole digit.
const START_PACKET_REPEATS: u8 = 3;

fn digit_to_event(digit: char) -> Option<u8> {
    match digit {
        '0'..='9' => Some(EVENT_0 + (digit as u8 - b'0')),
        '*' => Some(EVENT_STAR),
        '#' => Some(EVENT_POUND),
        'A'..='D' => Some(EVENT_A + (digit as u8 - b'A')),
        'a'..='d' => Some(EVENT_A + (digit as u8 - b'a')),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendState {
    Idle,
    Starting { event: u8, repeats_left: u8 },
    Sending { event: u8, elapsed: u16 },
    Ending { event: u8, final_duration: u16, repeats_left: u8 },
}

/// Schedules one digit at a time as a run of RFC 2833 packets sharing a
/// single RTP timestamp (the onset), with incrementing `duration`, ending
/// in `END_PACKET_REPEATS` packets carrying the end-of-event bit.
pub struct DtmfSender {
    state: SendState,
    pending: VecDeque<char>,
    samples_per_packet: u32,
    digit_duration_samples: u16,
    volume: u8,
    onset_timestamp: u32,
}

impl DtmfSender {
    pub fn new(samples_per_packet: u32, digit_duration_ms: u32, sample_rate: u32, volume: u8) -> Self {
        let digit_duration_samples = ((digit_duration_ms * sample_rate) / 1000) as u16;
        Self {
            state: SendState::Idle,
            pending: VecDeque::new(),
            samples_per_packet,
            digit_duration_samples,
            volume,
            onset_timestamp: 0,
        }
    }

    pub fn queue_digit(&mut self, digit: char) -> bool {
        if digit_to_event(digit).is_some() {
            self.pending.push_back(digit);
            true
        } else {
            false
        }
    }

    /// Advances the train by one RTP tick and returns the packet to send,
    /// if any, along with the timestamp it should carry and whether the
    /// marker bit must be set (only on the very first packet of a digit).
    pub fn tick(&mut self, current_timestamp: u32) -> Option<(TelephonyEvent, u32, bool)> {
        loop {
            match self.state {
                SendState::Idle => {
                    let digit = self.pending.pop_front()?;
                    let event = digit_to_event(digit)?;
                    self.onset_timestamp = current_timestamp;
                    self.state = SendState::Starting { event, repeats_left: START_PACKET_REPEATS };
                }
                SendState::Starting { event, repeats_left } => {
                    let marker = repeats_left == START_PACKET_REPEATS;
                    let duration = self.samples_per_packet as u16;
                    self.state = if repeats_left > 1 {
                        SendState::Starting { event, repeats_left: repeats_left - 1 }
                    } else if duration >= self.digit_duration_samples {
                        SendState::Ending {
                            event,
                            final_duration: self.digit_duration_samples,
                            repeats_left: END_PACKET_REPEATS,
                        }
                    } else {
                        SendState::Sending { event, elapsed: duration }
                    };

                    return Some((
                        TelephonyEvent {
                            event,
                            end_of_event: false,
                            volume: self.volume,
                            duration,
                        },
                        self.onset_timestamp,
                        marker,
                    ));
                }
                SendState::Sending { event, elapsed } => {
                    let next_elapsed = elapsed.saturating_add(self.samples_per_packet as u16);
                    let (duration, next_state) = if next_elapsed >= self.digit_duration_samples {
                        (
                            self.digit_duration_samples,
                            SendState::Ending {
                                event,
                                final_duration: self.digit_duration_samples,
                                repeats_left: END_PACKET_REPEATS,
                            },
                        )
                    } else {
                        (next_elapsed, SendState::Sending { event, elapsed: next_elapsed })
                    };

                    self.state = next_state;
                    return Some((
                        TelephonyEvent {
                            event,
                            end_of_event: false,
                            volume: self.volume,
                            duration,
                        },
                        self.onset_timestamp,
                        false,
                    ));
                }
                SendState::Ending { event, final_duration, repeats_left } => {
                    if repeats_left == 0 {
                        self.state = SendState::Idle;
                        continue;
                    }

                    self.state = SendState::Ending {
                        event,
                        final_duration,
                        repeats_left: repeats_left - 1,
                    };
                    return Some((
                        TelephonyEvent {
                            event,
                            end_of_event: true,
                            volume: self.volume,
                            duration: final_duration,
                        },
                        self.onset_timestamp,
                        false,
                    ));
                }
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == SendState::Idle && self.pending.is_empty()
    }
}

/// Number of consecutive end-of-event duplicates for the same digit that
/// clear the dedupe state, so a later press of that same digit isn't
/// mistaken for a retransmit of the one before it.
const END_DUPLICATE_RESET: u8 = 3;

/// Caller-driven ticks of inactivity since the last committed digit before
/// the dedupe state resets on its own, per spec.md §4.4's "reset the
/// per-event dedupe state if more than 2 seconds have elapsed since the
/// last digit". Expressed in ticks rather than wall-clock seconds, the
/// same tick-based stand-in `endpoint::STUN_LOSS_TICKS` uses, on the
/// assumption ticks are driven at roughly one per 20ms RTP interval.
const DEDUPE_RESET_TICKS: u64 = 100;

/// Decodes an inbound RFC 2833 event train into a committed digit, one
/// commit per distinct digit, following the sequence-number guard and
/// last-digit debounce spec.md §4.4 and §3.5 describe for the inbound
/// side.
pub struct DtmfReceiver {
    last_seq: Option<u16>,
    last_digit: Option<char>,
    last_digit_tick: Option<u64>,
    end_duplicates: u8,
    queue: VecDeque<char>,
    capacity: usize,
}

impl DtmfReceiver {
    pub fn new() -> Self {
        Self {
            last_seq: None,
            last_digit: None,
            last_digit_tick: None,
            end_duplicates: 0,
            queue: VecDeque::new(),
            capacity: DEFAULT_DIGIT_QUEUE_CAPACITY,
        }
    }

    /// Feeds one decoded telephony-event payload carried on RTP sequence
    /// number `seq`, observed at caller tick `now`. Packets that don't
    /// strictly advance the sequence number (stale retransmits, reordered
    /// duplicates) are ignored outright. A digit is enqueued the first
    /// time its end-of-event packet is seen; the two redundant end packets
    /// that follow are absorbed as duplicates, and once
    /// `END_DUPLICATE_RESET` of them have been seen, or `now` has drifted
    /// `DEDUPE_RESET_TICKS` past the last committed digit, the debounce
    /// state clears so the same digit can be pressed again.
    pub fn on_event(&mut self, event: TelephonyEvent, seq: u16, now: u64) {
        if let Some(last) = self.last_seq {
            if (seq.wrapping_sub(last) as i16) <= 0 {
                return;
            }
        }
        self.last_seq = Some(seq);

        if let Some(last_tick) = self.last_digit_tick {
            if now.saturating_sub(last_tick) >= DEDUPE_RESET_TICKS {
                self.last_digit = None;
                self.end_duplicates = 0;
            }
        }

        if !(event.duration > 0 && event.end_of_event) {
            return;
        }

        let Some(digit) = event_to_digit(event.event) else {
            return;
        };

        if self.last_digit != Some(digit) {
            self.last_digit = Some(digit);
            self.end_duplicates = 1;
            self.push(digit);
        } else {
            self.end_duplicates += 1;
            if self.end_duplicates >= END_DUPLICATE_RESET {
                self.last_digit = None;
                self.end_duplicates = 0;
            }
        }
        self.last_digit_tick = Some(now);
    }

    fn push(&mut self, digit: char) {
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
        }
        self.queue.push_back(digit);
    }

    pub fn pop_digit(&mut self) -> Option<char> {
        self.queue.pop_front()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}

fn event_to_digit(event: u8) -> Option<char> {
    Some(match event {
        EVENT_0..=EVENT_9 => (b'0' + event) as char,
        EVENT_STAR => '*',
        EVENT_POUND => '#',
        EVENT_A..=EVENT_D => (b'A' + (event - EVENT_A)) as char,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_emits_marker_on_first_packet_only() {
        let mut sender = DtmfSender::new(160, 100, 8000, 10);
        sender.queue_digit('5');

        let (_, _, marker) = sender.tick(1000).unwrap();
        assert!(marker);
        let (_, _, marker) = sender.tick(1000).unwrap();
        assert!(!marker);
    }

    #[test]
    fn sender_emits_three_identical_start_packets_then_increasing_continuations() {
        // Matches the scenario in spec.md §8: digit '5', duration=160ms at
        // 8kHz (1280 samples), samples_per_packet=160. Ticks 1..3 are
        // identical start packets carrying dur=160 (one packet's worth);
        // later ticks carry a strictly increasing duration.
        let mut sender = DtmfSender::new(160, 160, 8000, 7);
        sender.queue_digit('5');

        let starts: Vec<_> = (0..3).map(|_| sender.tick(0).unwrap()).collect();
        for (event, onset, _) in &starts {
            assert_eq!(event.event, EVENT_0 + 5);
            assert_eq!(event.volume, 7);
            assert_eq!(event.duration, 160);
            assert!(!event.end_of_event);
            assert_eq!(*onset, 0);
        }
        assert!(starts[0].2, "first start packet carries the marker");
        assert!(!starts[1].2 && !starts[2].2, "redundant start packets don't re-set the marker");

        let (continuation, _, marker) = sender.tick(0).unwrap();
        assert!(!marker);
        assert!(continuation.duration > 160);
        assert!(!continuation.end_of_event);
    }

    #[test]
    fn sender_ends_with_repeated_end_of_event_packets() {
        let mut sender = DtmfSender::new(160, 160, 8000, 10);
        sender.queue_digit('1');

        let mut saw_end: usize = 0;
        for _ in 0..20 {
            match sender.tick(0) {
                Some((event, _, _)) if event.end_of_event => saw_end += 1,
                Some(_) => {}
                None => break,
            }
        }
        assert_eq!(saw_end, END_PACKET_REPEATS as usize);
        assert!(sender.is_idle());
    }

    #[test]
    fn receiver_commits_digit_once_on_end_of_event() {
        let mut receiver = DtmfReceiver::new();
        let onset = TelephonyEvent {
            event: 5,
            end_of_event: false,
            volume: 0,
            duration: 160,
        };
        receiver.on_event(onset, 1, 0);
        assert_eq!(receiver.pending_count(), 0);

        let end = TelephonyEvent {
            event: 5,
            end_of_event: true,
            volume: 0,
            duration: 800,
        };
        receiver.on_event(end, 2, 0);
        receiver.on_event(end, 3, 0);
        assert_eq!(receiver.pending_count(), 1);
        assert_eq!(receiver.pop_digit(), Some('5'));
    }

    #[test]
    fn receiver_ignores_non_increasing_sequence_numbers() {
        let mut receiver = DtmfReceiver::new();
        let end = TelephonyEvent { event: 5, end_of_event: true, volume: 0, duration: 160 };

        receiver.on_event(end, 100, 0);
        assert_eq!(receiver.pending_count(), 1);

        // A stale retransmit/reorder carrying an older or equal sequence
        // number must not reset or re-trigger the debounce state.
        receiver.on_event(end, 50, 0);
        receiver.on_event(end, 100, 0);
        assert_eq!(receiver.pending_count(), 1);
    }

    #[test]
    fn receiver_accepts_repeated_digit_after_duplicate_reset() {
        let mut receiver = DtmfReceiver::new();
        let end = TelephonyEvent { event: 5, end_of_event: true, volume: 0, duration: 160 };

        // First press: commit, then two redundant end packets that reset
        // the debounce state (matches END_PACKET_REPEATS on the sender).
        receiver.on_event(end, 1, 0);
        receiver.on_event(end, 2, 0);
        receiver.on_event(end, 3, 0);
        assert_eq!(receiver.pending_count(), 1);

        // Second press of the same digit is accepted, not swallowed as a
        // duplicate of the first.
        receiver.on_event(end, 4, 0);
        assert_eq!(receiver.pending_count(), 2);
    }

    #[test]
    fn receiver_accepts_repeated_digit_after_dedupe_reset_tick() {
        let mut receiver = DtmfReceiver::new();
        let end = TelephonyEvent { event: 5, end_of_event: true, volume: 0, duration: 160 };

        // Committed once; no redundant end packets follow, so the debounce
        // state would otherwise hold this digit open indefinitely.
        receiver.on_event(end, 1, 0);
        assert_eq!(receiver.pending_count(), 1);

        // A second, genuinely new press of the same digit arrives after
        // DEDUPE_RESET_TICKS of inactivity; it must commit rather than be
        // swallowed as a stale duplicate of the first.
        receiver.on_event(end, 2, DEDUPE_RESET_TICKS);
        assert_eq!(receiver.pending_count(), 2);
    }

    #[test]
    fn receiver_bounds_its_digit_queue() {
        let mut receiver = DtmfReceiver::new();
        let end = TelephonyEvent { event: 1, end_of_event: true, volume: 0, duration: 160 };
        for seq in 0..((DEFAULT_DIGIT_QUEUE_CAPACITY as u32) * 3 + 30) {
            receiver.on_event(end, seq as u16, 0);
        }
        assert_eq!(receiver.pending_count(), DEFAULT_DIGIT_QUEUE_CAPACITY);
    }
}
