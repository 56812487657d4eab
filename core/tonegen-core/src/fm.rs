//! Per-operator FM signal path (§4.5).

use crate::lut::{Luts, FEEDBACK_LEVEL, MODULATION_LEVEL, SIN_BITS, WAVE_MASK};
use crate::slot::Slot;

#[derive(Debug, Clone, Copy)]
pub(crate) enum OpInput {
    None,
    Feedback,
    Value(i32),
}

/// `calculate_op(slot, inp)`. Advances the slot's envelope/LFO/phase one tick and
/// returns this operator's signed sample.
pub(crate) fn calculate_op(slot: &mut Slot, input: OpInput, luts: &Luts, sample_rate: f64) -> i32 {
    // Never sync-forced: `calculate_op` only ever renders sync-0/1/2 FM operator slots,
    // whose PCM-ness is governed solely by their own `waveform` register.
    slot.tick_modulation(luts, sample_rate, false);
    let gain = slot.envelope_gain(luts);

    let modulation: i64 = match input {
        OpInput::None => 0,
        OpInput::Feedback => (slot.feedback_words[0] + slot.feedback_words[1]) / 2,
        OpInput::Value(inp) => {
            let shifted = i64::from(inp) << (SIN_BITS - 2);
            shifted * MODULATION_LEVEL[(slot.regs.feedback & 7) as usize]
        }
    };

    // Arithmetic (sign-preserving) shift, per §9's fixed-point discipline note.
    let combined = i64::from(slot.fm_phase).wrapping_add(modulation);
    let phase = ((combined >> 16) as i32 as u32) & WAVE_MASK;

    let wave = luts.waveforms[(slot.regs.waveform & 7) as usize][phase as usize];
    let out = (i64::from(wave) * i64::from(gain)) >> 16;

    slot.fm_phase = slot.fm_phase.wrapping_add(slot.step as u32);
    out as i32
}

/// `set_feedback(slot, x)`. Rotates the two stored feedback words so the next
/// `OpInput::Feedback` call sees a one-sample-delayed average.
pub(crate) fn set_feedback(slot: &mut Slot, x: i32) {
    let level = FEEDBACK_LEVEL[(slot.regs.feedback & 7) as usize];
    let new_word = ((i64::from(x) << (SIN_BITS - 2)) * level) / 4;
    slot.feedback_words = [new_word, slot.feedback_words[0]];
}

/// Reads the PCM carrier directly from ROM instead of the sine table, for PFM mode
/// (§4.6) and for sync-2 bank 3 / sync-3's independent PCM voices. Envelope/LFO
/// amplitude still apply; phase modulation from other operators is not honoured since
/// the carrier's "phase" is an independent ROM cursor.
///
/// `forced_pcm` lets the caller declare a slot PCM-driven by sync-mode topology alone,
/// independent of that slot's own `waveform` register — see [`Slot::is_pcm`].
pub(crate) fn calculate_pfm_carrier(
    slot: &mut Slot,
    rom: &crate::pcm::ExternalRom,
    luts: &Luts,
    sample_rate: f64,
    forced_pcm: bool,
) -> i32 {
    slot.tick_modulation(luts, sample_rate, forced_pcm);
    let gain = slot.envelope_gain(luts);
    let sample = slot.pcm.tick(&slot.regs.pcm, rom, slot.step);
    ((i64::from(sample) * i64::from(gain)) >> 16) as i32
}
