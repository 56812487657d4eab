//! Slot register file and lifecycle (§3).
//!
//! A [`Slot`] bundles every register-backed field plus the dynamic state §3 describes as
//! a single polymorphic `stepptr`; here that polymorphism is split into two
//! concretely-typed fields (`fm_phase` for internal waveforms, `pcm` for waveform 7) since
//! Rust has no convenient single representation for "16.48 or 32.16 depending on mode"
//! without either a tagged union or losing the compiler's help — the two are never live
//! at once for a given slot, exactly mirroring the single-field model §3 describes.

use crate::envelope::{EnvelopeGenerator, EnvelopeRates};
use crate::lfo::{Lfo, LfoRegs};
use crate::lut::Luts;
use crate::pcm::{PcmRegs, PcmState};
use crate::pitch::{self, PitchRegs};
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub(crate) struct ChannelLevels {
    pub ch: [u8; 4],
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct SlotRegs {
    pub waveform: u8,
    pub algorithm: u8,
    pub feedback: u8,
    pub accon: bool,
    pub pitch: PitchRegs,
    pub tl: u8,
    pub envelope: EnvelopeRates,
    pub lfo: LfoRegs,
    pub channels: ChannelLevels,
    pub pcm: PcmRegs,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Slot {
    pub regs: SlotRegs,
    pub env: EnvelopeGenerator,
    pub lfo: Lfo,
    pub pcm: PcmState,
    /// Internal-waveform phase accumulator, Q16.16 in its low 32 bits.
    pub fm_phase: u32,
    pub step: u64,
    pub feedback_words: [i64; 2],
    pub keycode: u8,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            regs: SlotRegs::default(),
            env: EnvelopeGenerator::default(),
            lfo: Lfo::default(),
            pcm: PcmState::default(),
            fm_phase: 0,
            step: 0,
            feedback_words: [0, 0],
            keycode: 0,
        }
    }
}

impl Slot {
    /// Register-driven PCM status (`waveform == 7`). Sync-2 bank 3 and every sync-3 bank
    /// render through the PCM path regardless of this register (§4.6); callers reached from
    /// [`crate::group::render_group`]'s forced-PCM banks pass `forced_pcm=true` into
    /// [`Self::key_on`]/[`Self::recompute_step`]/[`Self::tick_modulation`] below (see
    /// [`Self::effective_pcm`]) rather than relying on firmware having also set
    /// `waveform=7` there.
    pub fn is_pcm(&self) -> bool {
        self.regs.waveform == 7
    }

    fn effective_pcm(&self, forced_pcm: bool) -> bool {
        forced_pcm || self.is_pcm()
    }

    fn compute_keycode(&self, pcm_mode: bool) -> u8 {
        if pcm_mode {
            pitch::external_keycode(
                self.regs.pcm.srcb,
                self.regs.pcm.srcnote,
                self.regs.pitch.block,
                self.regs.pitch.fns,
            )
        } else {
            pitch::internal_keycode(self.regs.pitch.block, self.regs.pitch.fns)
        }
    }

    pub fn key_on(&mut self, luts: &Luts, forced_pcm: bool) {
        let pcm_mode = self.effective_pcm(forced_pcm);
        self.keycode = self.compute_keycode(pcm_mode);
        self.lfo.key_on(&self.regs.lfo, luts);
        self.env.key_on(&self.regs.envelope, self.keycode, luts);
        self.feedback_words = [0, 0];
        self.fm_phase = 0;
        if pcm_mode {
            self.pcm.key_on(&self.regs.pcm);
        }
        self.recompute_step(luts, forced_pcm);
        log::trace!(
            "slot key on: waveform={} keycode={} forced_pcm={}",
            self.regs.waveform,
            self.keycode,
            forced_pcm
        );
    }

    pub fn key_off(&mut self, luts: &Luts) {
        self.env.key_off(&self.regs.envelope, self.keycode, luts);
    }

    pub fn recompute_step(&mut self, luts: &Luts, forced_pcm: bool) {
        let offset = pitch::detune_offset(&luts.detune, self.regs.pitch.detune, self.keycode);
        self.step = if self.effective_pcm(forced_pcm) {
            let fs_freq = crate::lut::FS_FREQUENCY[(self.regs.pcm.fs & 3) as usize];
            pitch::step_external(&self.regs.pitch, offset, fs_freq)
        } else {
            pitch::step_internal(&self.regs.pitch, offset, self.lfo.phasemod)
        };
    }

    pub fn tick_modulation(&mut self, luts: &Luts, sample_rate: f64, forced_pcm: bool) {
        self.lfo.tick(&self.regs.lfo, luts, sample_rate);
        self.env.tick(&self.regs.envelope, self.keycode, luts);
        self.recompute_step(luts, forced_pcm);
    }

    /// `env = envelope_volume(volume) * lfo_am * total_level`, each multiplicand Q16.16
    /// with a `>> 16` after every multiply (§4.5 step 1).
    pub fn envelope_gain(&self, luts: &Luts) -> u32 {
        let ev = u64::from(self.env.gain(luts));
        let am = u64::from(self.lfo.amplitude);
        let tl = u64::from(luts.total_level[(self.regs.tl & 0x7f) as usize]);
        let g1 = (ev * am) >> 16;
        ((g1 * tl) >> 16) as u32
    }
}
