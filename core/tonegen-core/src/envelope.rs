//! Per-slot envelope generator (§4.2).
//!
//! `volume` is loudness-polarity (0 = silent, 255 = full loudness) even though the
//! envelope-volume LUT it eventually feeds is attenuation-polarity (0 = unity gain, 255 =
//! -96 dB) — see `DESIGN.md` Open Question 1 for why the two are inverted relative to
//! each other and how that inversion is threaded through `gain()`.

use crate::lut::Luts;
use bincode::{Decode, Encode};

const INITIAL_ATTACK_VOLUME: i32 = (255 - 160) << 16;
const MAX_VOLUME: i32 = 255 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(crate) enum EnvelopeState {
    Attack,
    Decay1,
    Decay2,
    Release,
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub(crate) struct EnvelopeRates {
    pub keyscale: u8,
    pub ar: u8,
    pub d1r: u8,
    pub d2r: u8,
    pub rr: u8,
    pub d1l: u8,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct EnvelopeGenerator {
    pub active: bool,
    pub volume: i32,
    state: EnvelopeState,
    env_step: u32,
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self { active: false, volume: 0, state: EnvelopeState::Release, env_step: 0 }
    }
}

impl EnvelopeGenerator {
    pub fn key_on(&mut self, rates: &EnvelopeRates, keycode: u8, luts: &Luts) {
        self.active = true;
        self.volume = INITIAL_ATTACK_VOLUME;
        self.state = EnvelopeState::Attack;
        self.env_step = attack_step(rates, keycode, luts);

        // A zero attack step means the voice never saturates; §7 calls this "silence
        // until key-off", which this state machine already produces for free since
        // `tick` simply never advances volume when `env_step` is 0.
        log::trace!("key on: rates={rates:?} keycode={keycode} env_step={}", self.env_step);
    }

    pub fn key_off(&mut self, rates: &EnvelopeRates, keycode: u8, luts: &Luts) {
        if !self.active {
            return;
        }
        self.state = EnvelopeState::Release;
        self.env_step = decay_step(rates.rr, 4, rates.keyscale, keycode, luts);
    }

    pub fn tick(&mut self, rates: &EnvelopeRates, keycode: u8, luts: &Luts) {
        if !self.active {
            return;
        }

        match self.state {
            EnvelopeState::Attack => {
                self.volume = (self.volume + self.env_step as i32).min(MAX_VOLUME);
                if self.volume >= MAX_VOLUME {
                    self.state = EnvelopeState::Decay1;
                    self.env_step = decay_step(rates.d1r, 2, rates.keyscale, keycode, luts);
                }
            }
            EnvelopeState::Decay1 => {
                let target = MAX_VOLUME - (i32::from(rates.d1l) * 16 << 16);
                self.volume = (self.volume - self.env_step as i32).max(target);
                if self.volume <= target {
                    self.state = EnvelopeState::Decay2;
                    self.env_step = decay_step(rates.d2r, 2, rates.keyscale, keycode, luts);
                }
            }
            EnvelopeState::Decay2 => {
                self.volume -= self.env_step as i32;
                if self.volume <= 0 {
                    self.volume = 0;
                    self.active = false;
                }
            }
            EnvelopeState::Release => {
                self.volume -= self.env_step as i32;
                if self.volume <= 0 {
                    self.volume = 0;
                    self.active = false;
                }
            }
        }
    }

    /// `envelope_volume(volume)`, i.e. `ev[255 - volume_int]` (see module doc).
    pub fn gain(&self, luts: &Luts) -> u32 {
        let volume_int = (self.volume >> 16).clamp(0, 255) as u8;
        luts.envelope_volume[255 - volume_int as usize]
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }
}

fn effective_rate(base: u8, multiplier: u8, keyscale: u8, keycode: u8) -> usize {
    let rate = u32::from(base) * u32::from(multiplier) + u32::from(crate::lut::rks(keycode, keyscale));
    rate.min(63) as usize
}

fn attack_step(rates: &EnvelopeRates, keycode: u8, luts: &Luts) -> u32 {
    let idx = effective_rate(rates.ar, 2, rates.keyscale, keycode);
    luts.attack_rate[idx]
}

fn decay_step(base_rate: u8, multiplier: u8, keyscale: u8, keycode: u8, luts: &Luts) -> u32 {
    let idx = effective_rate(base_rate, multiplier, keyscale, keycode);
    luts.decay_rate[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;
    use crate::lut::Luts;

    fn luts() -> Luts {
        Luts::build(16_934_400.0, 44100.0)
    }

    #[test]
    fn attack_saturates_monotonically() {
        let luts = luts();
        let rates = EnvelopeRates { keyscale: 0, ar: 31, d1r: 0, d2r: 0, rr: 0, d1l: 0 };
        let mut env = EnvelopeGenerator::default();
        env.key_on(&rates, 16, &luts);

        let mut last = env.volume;
        let mut ticks = 0;
        while env.state() == EnvelopeState::Attack && ticks < 1_000_000 {
            env.tick(&rates, 16, &luts);
            assert!(env.volume >= last);
            last = env.volume;
            ticks += 1;
        }
        assert_eq!(env.volume, MAX_VOLUME);
    }

    #[test]
    fn zero_attack_rate_never_advances() {
        let luts = luts();
        let rates = EnvelopeRates { keyscale: 0, ar: 0, d1r: 0, d2r: 0, rr: 0, d1l: 0 };
        let mut env = EnvelopeGenerator::default();
        env.key_on(&rates, 0, &luts);
        let start = env.volume;
        for _ in 0..1000 {
            env.tick(&rates, 0, &luts);
        }
        assert_eq!(env.volume, start);
    }

    #[test]
    fn decay_to_release_reaches_silence() {
        let luts = luts();
        let rates = EnvelopeRates { keyscale: 0, ar: 31, d1r: 31, d2r: 31, rr: 15, d1l: 0 };
        let mut env = EnvelopeGenerator::default();
        env.key_on(&rates, 16, &luts);
        for _ in 0..2_000_000 {
            if !env.active {
                break;
            }
            env.tick(&rates, 16, &luts);
        }
        assert!(!env.active);
        assert_eq!(env.volume, 0);
    }

    #[test]
    fn key_off_moves_to_release() {
        let luts = luts();
        let rates = EnvelopeRates { keyscale: 0, ar: 31, d1r: 0, d2r: 0, rr: 15, d1l: 0 };
        let mut env = EnvelopeGenerator::default();
        env.key_on(&rates, 16, &luts);
        for _ in 0..10 {
            env.tick(&rates, 16, &luts);
        }
        env.key_off(&rates, 16, &luts);
        assert_eq!(env.state(), EnvelopeState::Release);
    }
}
