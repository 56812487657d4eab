//! Lookup tables built once from the chip clock.
//!
//! Every table here is derived arithmetic (sine, log-attenuation, exponential rate
//! curves), never hand-transcribed from silicon, so it is built with plain `f64` math at
//! construction time and then quantised to the fixed-point domain the rest of the core
//! works in. None of this is part of saved/restored chip state (see [`crate::Chip`]); it
//! is rebuilt from [`crate::ChipConfig`] whenever a chip is constructed.

use std::array;

pub(crate) const WAVE_LEN: usize = 1024;
pub(crate) const WAVE_MASK: u32 = (WAVE_LEN - 1) as u32;

pub(crate) const LFO_LEN: usize = 256;
pub(crate) const LFO_MASK: u32 = (LFO_LEN - 1) as u32;

pub(crate) const MAXOUT: i32 = 32767;
pub(crate) const MINOUT: i32 = -32768;

const STD_CLOCK: f64 = 16_934_400.0;

/// `pow_table`, pre-doubled so the PCM half's fractional entries stay integral.
/// `pow_table(block)` (internal wave) divides by 2; `pow_table(block + 8)` (PCM) also
/// divides by 2 — see `pitch::step_internal`/`pitch::step_external`.
#[rustfmt::skip]
pub(crate) const POW_TABLE: [u64; 16] = [
    256, 512, 1024, 2048, 4096, 8192, 16384, 32768,
    1, 2, 4, 8, 16, 32, 64, 128,
];

/// Frequency multiplier table, pre-doubled (index 0 represents ×0.5).
#[rustfmt::skip]
pub(crate) const MULTIPLE_TABLE: [u64; 16] = [
    1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30,
];

/// PCM sample-rate divider selected by the 2-bit `fs` field. Not given concretely by the
/// datasheet excerpt this core was built from; chosen as a monotonic divider set (see
/// `DESIGN.md`).
pub(crate) const FS_FREQUENCY: [u64; 4] = [1, 2, 4, 8];

/// `modulation_level[feedback]` from §4.5 — intentionally non-monotonic.
pub(crate) const MODULATION_LEVEL: [i64; 8] = [16, 8, 4, 2, 1, 32, 64, 128];

/// `feedback_level[feedback]` from §4.5.
pub(crate) const FEEDBACK_LEVEL: [i64; 8] = [0, 1, 2, 4, 8, 16, 32, 64];

pub(crate) const SIN_BITS: u32 = 10;

/// Rate-key-scaling offset: `rks(keycode, keyscale)`. Keyscale 0 disables RKS entirely;
/// higher keyscale values apply a steeper per-octave offset, the conventional FM-chip RKS
/// shape.
pub(crate) fn rks(keycode: u8, keyscale: u8) -> u8 {
    match keyscale & 3 {
        0 => 0,
        1 => keycode / 8,
        2 => keycode / 4,
        _ => keycode / 2,
    }
}

pub(crate) struct Luts {
    pub waveforms: [[i16; WAVE_LEN]; 8],
    pub envelope_volume: [u32; 256],
    pub total_level: [u32; 128],
    pub channel_attenuation: [u32; 16],
    pub lfo_frequency: [f64; 256],
    pub attack_rate: [u32; 64],
    pub decay_rate: [u32; 64],
    pub pitch_lfo: [[[i32; 256]; 8]; 4],
    /// `amplitude_lfo[wave][ams][phase]` — a ready-to-multiply Q16.16 gain, AMS depth
    /// already folded in so the per-sample path never calls `powf`.
    pub amplitude_lfo: [[[u32; 256]; 4]; 4],
    pub detune: [[i32; 32]; 8],
}

impl Luts {
    pub fn build(clock_hz: f64, sample_rate: f64) -> Self {
        let clock_ratio = clock_hz / STD_CLOCK;
        Self {
            waveforms: build_waveforms(),
            envelope_volume: build_envelope_volume(),
            total_level: build_total_level(),
            channel_attenuation: build_channel_attenuation(),
            lfo_frequency: build_lfo_frequency(clock_ratio),
            attack_rate: build_rate_table(clock_ratio, sample_rate, true),
            decay_rate: build_rate_table(clock_ratio, sample_rate, false),
            pitch_lfo: build_pitch_lfo(),
            amplitude_lfo: build_amplitude_lfo(),
            detune: crate::pitch::build_detune_lut(),
        }
    }
}

fn quantize(x: f64) -> i16 {
    x.round().clamp(MINOUT as f64, MAXOUT as f64) as i16
}

fn build_waveforms() -> [[i16; WAVE_LEN]; 8] {
    let mut w0 = [0i16; WAVE_LEN];
    let mut w1 = [0i16; WAVE_LEN];
    let mut w2 = [0i16; WAVE_LEN];
    let mut w3 = [0i16; WAVE_LEN];
    let mut w4 = [0i16; WAVE_LEN];
    let mut w5 = [0i16; WAVE_LEN];

    for i in 0..WAVE_LEN {
        let theta = (2 * i + 1) as f64 * std::f64::consts::PI / WAVE_LEN as f64;
        let s = theta.sin();
        w0[i] = quantize(s * MAXOUT as f64);

        // sin^2 with the sign of sin, so the waveform stays continuous across the
        // zero-crossing instead of folding into an always-positive shape.
        w1[i] = quantize(s.signum() * s * s * MAXOUT as f64);

        w2[i] = quantize(s.abs() * MAXOUT as f64);

        w3[i] = if i < WAVE_LEN / 2 { quantize(s * MAXOUT as f64) } else { 0 };

        let theta2 = 2.0 * theta;
        let s2 = theta2.sin();
        w4[i] = if i < WAVE_LEN / 2 && s2 > 0.0 { quantize(s2 * MAXOUT as f64) } else { 0 };
        w5[i] = w4[i].unsigned_abs() as i16;
    }

    let w6 = [MAXOUT as i16; WAVE_LEN];
    let w7 = [0i16; WAVE_LEN];

    [w0, w1, w2, w3, w4, w5, w6, w7]
}

fn build_envelope_volume() -> [u32; 256] {
    array::from_fn(|i| (65536.0 / 10f64.powf((i as f64 * 96.0 / 256.0) / 20.0)).round() as u32)
}

fn build_total_level() -> [u32; 128] {
    array::from_fn(|i| (65536.0 / 10f64.powf((i as f64 * 0.75) / 20.0)).round() as u32)
}

fn build_channel_attenuation() -> [u32; 16] {
    #[rustfmt::skip]
    const DB: [f64; 16] = [
        0.0, 1.2, 2.4, 3.6, 4.8, 6.0, 8.0, 10.0,
        12.0, 14.0, 17.0, 20.0, 24.0, 96.0, 96.0, 96.0,
    ];
    array::from_fn(|i| (65536.0 / 10f64.powf(DB[i] / 20.0)).round() as u32)
}

fn build_lfo_frequency(clock_ratio: f64) -> [f64; 256] {
    // Monotonic exponential curve spanning roughly 0.02 Hz .. 100 Hz; see DESIGN.md.
    array::from_fn(|i| 0.021 * 1.0182f64.powi(i as i32) * clock_ratio)
}

fn build_rate_table(clock_ratio: f64, sample_rate: f64, is_attack: bool) -> [u32; 64] {
    array::from_fn(|rate| {
        if rate < 4 {
            return 0;
        }
        // Exponential envelope-rate curve: higher rate index -> fewer samples per
        // level-unit. `base_ms` sets the overall scale; attack is roughly 4x faster than
        // decay/release at the same rate index, the usual FM-chip shape.
        let base_ms = if is_attack { 6000.0 } else { 24000.0 };
        let ms_full_range = base_ms / 2f64.powf((rate as f64 - 4.0) / 6.0) / clock_ratio;
        let samples_full_range = (ms_full_range / 1000.0) * sample_rate;
        let samples_per_level = (samples_full_range / 255.0).max(1.0 / 1024.0);
        ((1u64 << 16) as f64 / samples_per_level).round().max(1.0) as u32
    })
}

fn build_pitch_lfo() -> [[[i32; 256]; 8]; 4] {
    const DEPTH_CENTS: [f64; 8] = [0.0, 3.378, 5.065, 6.750, 10.114, 20.170, 40.108, 79.307];

    array::from_fn(|wave| {
        array::from_fn(|depth| {
            let cents = DEPTH_CENTS[depth];
            array::from_fn(|phase| {
                let phi = lfo_waveform(wave, phase);
                (2f64.powf(cents * phi / 1200.0) * 65536.0).round() as i32
            })
        })
    })
}

fn build_amplitude_lfo() -> [[[u32; 256]; 4]; 4] {
    // ams in {0,1,2,3} maps to {0, 5.91, 11.81, 23.63} dB of maximum attenuation depth.
    const AMS_DB: [f64; 4] = [0.0, 5.91, 11.81, 23.63];

    array::from_fn(|wave| {
        array::from_fn(|ams| {
            array::from_fn(|phase| {
                // Amplitude LFO only ever attenuates (0.0 .. 1.0 fraction of full AMS
                // depth); unlike the pitch LFO it does not swing negative.
                let frac = lfo_waveform(wave, phase).abs();
                let db = AMS_DB[ams] * frac;
                (65536.0 / 10f64.powf(db / 20.0)).round() as u32
            })
        })
    })
}

/// Shared LFO waveform shapes (0 = off, 1 = saw, 2 = square, 3 = triangle), normalised to
/// `[-1.0, 1.0]`.
fn lfo_waveform(wave: usize, phase: usize) -> f64 {
    let t = phase as f64 / LFO_LEN as f64;
    match wave {
        0 => 0.0,
        1 => 2.0 * t - 1.0,
        2 => {
            if t < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        3 => {
            if t < 0.5 {
                4.0 * t - 1.0
            } else {
                3.0 - 4.0 * t
            }
        }
        _ => unreachable!("lfo waveform selector is 2 bits"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn envelope_volume_boundaries() {
        let luts = Luts::build(STD_CLOCK, 44100.0);
        assert_eq!(luts.envelope_volume[0], 65536);
        assert!(luts.envelope_volume[255] < 100);
    }

    #[test]
    fn waveform_w6_is_constant_dc() {
        let luts = Luts::build(STD_CLOCK, 44100.0);
        assert!(luts.waveforms[6].iter().all(|&s| s == MAXOUT as i16));
    }

    #[test]
    fn waveform_w7_is_silence() {
        let luts = Luts::build(STD_CLOCK, 44100.0);
        assert!(luts.waveforms[7].iter().all(|&s| s == 0));
    }

    #[test]
    fn waveform_w3_is_half_sine() {
        let luts = Luts::build(STD_CLOCK, 44100.0);
        assert!(luts.waveforms[3][WAVE_LEN / 2..].iter().all(|&s| s == 0));
    }

    #[test]
    fn attack_rates_increase_in_speed() {
        let luts = Luts::build(STD_CLOCK, 44100.0);
        for r in 4..63 {
            assert!(luts.attack_rate[r] <= luts.attack_rate[r + 1]);
        }
    }

    #[test]
    fn rates_below_four_are_zero() {
        let luts = Luts::build(STD_CLOCK, 44100.0);
        for r in 0..4 {
            assert_eq!(luts.attack_rate[r], 0);
            assert_eq!(luts.decay_rate[r], 0);
        }
    }

    #[test]
    fn channel_attenuation_last_three_are_clamped() {
        let luts = Luts::build(STD_CLOCK, 44100.0);
        assert_eq!(luts.channel_attenuation[13], luts.channel_attenuation[14]);
        assert_eq!(luts.channel_attenuation[14], luts.channel_attenuation[15]);
    }
}
