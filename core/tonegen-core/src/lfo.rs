//! Per-slot low frequency oscillator (§4.8).
//!
//! Unlike a YM2612-style LFO (one oscillator shared by the whole chip), this chip's
//! `lfoFreq`/`lfowave`/`pms`/`ams` registers are per-slot, so each [`Lfo`] is owned by its
//! [`crate::slot::Slot`] rather than by [`crate::Chip`].

use crate::lut::Luts;
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub(crate) struct LfoRegs {
    pub lfo_freq: u8,
    pub lfo_wave: u8,
    pub pms: u8,
    pub ams: u8,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Lfo {
    phase: u32,
    /// Pitch modulation multiplier, Q16.16 (1.0 = 65536). Initialised from table index 0
    /// at key-on so the first sample after key-on isn't left at an uninitialised value
    /// (§4.8's "one-sample pitch glitch" warning).
    pub phasemod: i32,
    /// Amplitude attenuation gain, Q16.16.
    pub amplitude: u32,
}

impl Default for Lfo {
    fn default() -> Self {
        Self { phase: 0, phasemod: 65536, amplitude: 65536 }
    }
}

impl Lfo {
    pub fn key_on(&mut self, regs: &LfoRegs, luts: &Luts) {
        self.phase = 0;
        self.phasemod = luts.pitch_lfo[(regs.lfo_wave & 3) as usize][(regs.pms & 7) as usize][0];
        self.amplitude = luts.amplitude_lfo[(regs.lfo_wave & 3) as usize][(regs.ams & 3) as usize][0];
    }

    pub fn tick(&mut self, regs: &LfoRegs, luts: &Luts, sample_rate: f64) {
        let freq_hz = luts.lfo_frequency[regs.lfo_freq as usize];
        let step = (65536.0 * freq_hz / sample_rate).round() as u32;
        self.phase = self.phase.wrapping_add(step);

        let index = ((self.phase >> 8) & crate::lut::LFO_MASK) as usize;
        self.phasemod = luts.pitch_lfo[(regs.lfo_wave & 3) as usize][(regs.pms & 7) as usize][index];
        self.amplitude = luts.amplitude_lfo[(regs.lfo_wave & 3) as usize][(regs.ams & 3) as usize][index];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn key_on_initialises_from_table_index_zero() {
        let luts = Luts::build(16_934_400.0, 44100.0);
        let regs = LfoRegs { lfo_freq: 10, lfo_wave: 1, pms: 5, ams: 2 };
        let mut lfo = Lfo::default();
        lfo.key_on(&regs, &luts);
        assert_eq!(lfo.phasemod, luts.pitch_lfo[1][5][0]);
        assert_eq!(lfo.amplitude, luts.amplitude_lfo[1][2][0]);
    }

    #[test]
    fn off_waveform_never_modulates_pitch() {
        let luts = Luts::build(16_934_400.0, 44100.0);
        let regs = LfoRegs { lfo_freq: 200, lfo_wave: 0, pms: 7, ams: 0 };
        let mut lfo = Lfo::default();
        lfo.key_on(&regs, &luts);
        for _ in 0..500 {
            lfo.tick(&regs, &luts, 44100.0);
            assert_eq!(lfo.phasemod, 65536);
        }
    }
}
