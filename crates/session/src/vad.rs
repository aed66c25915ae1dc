//! Voice-activity-detected silence suppression for the write path.
//!
//! Energy-based gate with hysteresis, ported in spirit from the
//! reference RTP session's `vad_data` hangover/hangunder state machine
//! (`switch_rtp_enable_vad` / the per-packet VAD branch in the read/write
//! loop): a short learning window establishes a background noise level,
//! then every packet's energy is compared against it with separate
//! "hangunder" (frames of rising energy required before declaring talk)
//! and "hangover" (frames of falling energy required before declaring
//! silence again) counters so a single noisy sample doesn't flip state.
//!
//! The core has no codec of its own (decoding payload into PCM is a
//! Non-goal — see spec.md §1), so the PCM samples to score are supplied
//! by the caller through [`AudioDecoder`], the same narrow injected
//! capability the external interfaces section describes as
//! `codec.decode(in, in_len) -> (pcm, pcm_len)`.

/// Capability the call layer provides so the VAD gate can score outbound
/// audio without this crate knowing anything about codecs.
pub trait AudioDecoder {
    /// Decodes one payload into signed 16-bit PCM samples. Returns `None`
    /// if the payload type this decoder was built for doesn't match, or
    /// decoding otherwise fails.
    fn decode(&self, payload: &[u8]) -> Option<Vec<i16>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    /// Energy crossed from background into talk on this packet.
    StartedTalking,
    /// Energy settled back into background on this packet.
    StoppedTalking,
    /// No change in talk/silence state.
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// Payload type the registered decoder understands; packets of any
    /// other type are never scored (or suppressed).
    pub payload_type: u8,
    /// Packets spent accumulating the background level before gating
    /// starts.
    pub bg_len: u32,
    /// Energy above the background level required to shortcut straight
    /// into "talking" without waiting out `hangunder`.
    pub diff_level: u32,
    /// Consecutive above-background packets required to declare talk.
    pub hangunder: u32,
    /// Consecutive below-background packets required to declare silence.
    pub hangover: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            payload_type: 0,
            bg_len: 5,
            diff_level: 400,
            hangunder: 15,
            hangover: 40,
        }
    }
}

/// Per-session VAD state. One instance gates one outbound direction.
pub struct VadGate {
    config: VadConfig,
    bg_level: u32,
    bg_count: u32,
    hangunder_hits: u32,
    hangover_hits: u32,
    talking: bool,
}

impl VadGate {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            bg_level: 0,
            bg_count: 0,
            hangunder_hits: 0,
            hangover_hits: 0,
            talking: false,
        }
    }

    pub fn is_talking(&self) -> bool {
        self.talking
    }

    fn energy(samples: &[i16]) -> u32 {
        if samples.is_empty() {
            return 0;
        }
        let sum: u64 = samples.iter().map(|s| s.unsigned_abs() as u64).sum();
        (sum / samples.len() as u64) as u32
    }

    /// Scores one outbound packet. Returns `(suppress, transition)`:
    /// `suppress` is true once the background level is established and
    /// the packet classifies as silence; `transition` reports whether
    /// this packet flipped the talk/silence state, so the caller can
    /// fire TALK/NOTALK events and force a marker bit on resumption.
    pub fn score(&mut self, payload_type: u8, decoder: &dyn AudioDecoder, payload: &[u8]) -> (bool, VadTransition) {
        if payload_type != self.config.payload_type {
            return (false, VadTransition::None);
        }

        let Some(pcm) = decoder.decode(payload) else {
            return (false, VadTransition::None);
        };

        let score = Self::energy(&pcm);

        if self.bg_count < self.config.bg_len {
            self.bg_count += 1;
            self.bg_level += score;
            if self.bg_count == self.config.bg_len {
                self.bg_level /= self.config.bg_len;
            }
            return (false, VadTransition::None);
        }

        if !self.talking {
            if score > self.bg_level {
                let diff = score - self.bg_level;
                if self.hangover_hits > 0 {
                    self.hangover_hits -= 1;
                }
                if diff >= self.config.diff_level || { self.hangunder_hits += 1; self.hangunder_hits >= self.config.hangunder } {
                    self.talking = true;
                    self.hangover_hits = 0;
                    self.hangunder_hits = 0;
                    return (false, VadTransition::StartedTalking);
                }
            } else if self.hangunder_hits > 0 {
                self.hangunder_hits -= 1;
            }
            (true, VadTransition::None)
        } else {
            if score <= self.bg_level {
                self.hangover_hits += 1;
                if self.hangover_hits >= self.config.hangover {
                    self.talking = false;
                    self.hangover_hits = 0;
                    self.hangunder_hits = 0;
                    return (true, VadTransition::StoppedTalking);
                }
            } else {
                self.hangover_hits = 0;
            }
            (false, VadTransition::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDecoder(i16);
    impl AudioDecoder for FixedDecoder {
        fn decode(&self, payload: &[u8]) -> Option<Vec<i16>> {
            Some(vec![self.0; payload.len().max(1)])
        }
    }

    #[test]
    fn learns_background_then_gates_silence() {
        let mut vad = VadGate::new(VadConfig {
            payload_type: 0,
            bg_len: 3,
            diff_level: 400,
            hangunder: 2,
            hangover: 2,
        });
        let quiet = FixedDecoder(10);

        for _ in 0..3 {
            let (suppress, transition) = vad.score(0, &quiet, &[0u8; 160]);
            assert!(!suppress);
            assert_eq!(transition, VadTransition::None);
        }

        // Background learned; quiet packets should now be suppressed.
        let (suppress, _) = vad.score(0, &quiet, &[0u8; 160]);
        assert!(suppress);
        assert!(!vad.is_talking());
    }

    #[test]
    fn loud_packet_eventually_flips_to_talking() {
        let mut vad = VadGate::new(VadConfig {
            payload_type: 0,
            bg_len: 2,
            diff_level: 50,
            hangunder: 3,
            hangover: 3,
        });
        let quiet = FixedDecoder(5);
        let loud = FixedDecoder(500);

        for _ in 0..2 {
            vad.score(0, &quiet, &[0u8; 160]);
        }

        let mut started = false;
        for _ in 0..5 {
            let (_, transition) = vad.score(0, &loud, &[0u8; 160]);
            if transition == VadTransition::StartedTalking {
                started = true;
                break;
            }
        }
        assert!(started, "loud energy never crossed into talking");
        assert!(vad.is_talking());
    }

    #[test]
    fn non_matching_payload_type_is_never_scored() {
        let mut vad = VadGate::new(VadConfig { payload_type: 8, ..VadConfig::default() });
        let quiet = FixedDecoder(10);
        let (suppress, transition) = vad.score(0, &quiet, &[0u8; 160]);
        assert!(!suppress);
        assert_eq!(transition, VadTransition::None);
    }
}
