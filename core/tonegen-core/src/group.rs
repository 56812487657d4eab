//! Group state and sync-mode dispatch (§4.6, §4.9).
//!
//! A group owns four slots (banks 0-3) and a sync mode that picks one of the four
//! topologies described in §2: four-op FM, two independent two-op FM pairs, three-op FM
//! plus one parallel PCM voice, or four independent PCM voices.

use crate::acc;
use crate::algorithm::{AlgoDef, SYNC0_ALGORITHMS, SYNC1_ALGORITHMS, SYNC2_ALGORITHMS};
use crate::fm::{calculate_op, calculate_pfm_carrier, set_feedback, OpInput};
use crate::lut::Luts;
use crate::pcm::ExternalRom;
use crate::slot::{ChannelLevels, Slot};
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub(crate) struct GroupRegs {
    pub sync: u8,
    pub pfm: bool,
    pub muted: bool,
}

/// Groups 0, 4 and 8 are the three with the extended routing that honours PFM (§2).
pub(crate) fn pfm_capable(group_idx: usize) -> bool {
    matches!(group_idx, 0 | 4 | 8)
}

const SINGLE: [&[usize]; 4] = [&[0], &[1], &[2], &[3]];

/// The sibling set a synchronized register write (§4.9) mirrors into, independent of
/// which bank was actually written.
pub(crate) fn mirror_group(sync: u8, bank: usize) -> &'static [usize] {
    match sync {
        0 => &[0, 1, 2, 3],
        1 => {
            if bank == 0 || bank == 2 {
                &[0, 2]
            } else {
                &[1, 3]
            }
        }
        2 => {
            if bank == 3 {
                SINGLE[3]
            } else {
                &[0, 1, 2]
            }
        }
        _ => SINGLE[bank & 3],
    }
}

/// Whether a key-on write to `bank` is the cascade leader for this sync mode (§4.9: "A
/// key-on to the bank-0 slot in Sync 0, to the bank-0 or bank-1 slot in Sync 1, or to the
/// bank-0 slot in Sync 2").
fn is_key_on_leader(sync: u8, bank: usize) -> bool {
    match sync {
        0 | 2 => bank == 0,
        1 => bank == 0 || bank == 1,
        _ => false,
    }
}

/// Banks that should receive a cascaded key-on alongside the one actually written.
pub(crate) fn key_on_cascade_targets(sync: u8, bank: usize) -> &'static [usize] {
    if is_key_on_leader(sync, bank) {
        mirror_group(sync, bank)
    } else {
        SINGLE[bank & 3]
    }
}

/// Whether `bank` renders through the PCM path purely because of the group's sync mode
/// (sync-2 bank 3, every sync-3 bank), independent of that slot's own `waveform` register.
/// `render_group` always routes these banks through [`calculate_pfm_carrier`]; firmware is
/// not required to also set `waveform=7` there, so [`Slot::key_on`] and
/// [`Slot::recompute_step`] need this to pick the PCM step formula and reset the PCM
/// cursor even when the register alone says otherwise.
pub(crate) fn forces_pcm(sync: u8, bank: usize) -> bool {
    match sync & 3 {
        2 => bank == 3,
        3 => true,
        _ => false,
    }
}

/// Runs the operators named by `banks` (indices into the group's four slots, in operator
/// order) through `algo`'s routing for one sample, returning each operator's raw (pre
/// channel-attenuation) signed output. Operator 0's self-feedback uses the stored
/// delay-line average per §4.5/§9 regardless of algorithm. Banks are addressed one at a
/// time rather than via a borrowed slice since sync-mode-1 pairs ({0,2} and {1,3}) are not
/// contiguous in the group's slot array.
fn render_fm_network(
    slots: &mut [Slot; 4],
    banks: &[usize],
    algo: &AlgoDef,
    pfm_rom: Option<&ExternalRom>,
    luts: &Luts,
    sample_rate: f64,
) -> [i32; 4] {
    let mut outputs = [0i32; 4];
    for k in 0..banks.len() {
        let bank = banks[k];
        let use_pfm = algo.carriers[k] && pfm_rom.is_some();
        let out = if use_pfm {
            // Not sync-forced: this carrier reads ROM because PFM is enabled on an
            // otherwise-FM algorithm slot, not because the sync mode itself requires PCM.
            calculate_pfm_carrier(&mut slots[bank], pfm_rom.unwrap(), luts, sample_rate, false)
        } else {
            let modulation = if k == 0 {
                OpInput::Feedback
            } else if algo.mod_sources[k].is_empty() {
                OpInput::None
            } else {
                let sources = algo.mod_sources[k];
                let sum: i64 = sources.iter().map(|&s| i64::from(outputs[s as usize])).sum();
                OpInput::Value((sum / sources.len() as i64) as i32)
            };
            calculate_op(&mut slots[bank], modulation, luts, sample_rate)
        };
        if k == 0 {
            set_feedback(&mut slots[banks[0]], out);
        }
        outputs[k] = out;
    }
    outputs
}

/// Attenuates `sample` per channel and folds it into either the direct or ACC mix
/// accumulator for this sample (§4.6 direct path, §4.7 ACC path).
#[allow(clippy::too_many_arguments)]
fn mix_carrier(
    sample: i32,
    channels: &ChannelLevels,
    tl: u8,
    accon: bool,
    luts: &Luts,
    direct_mix: &mut [i32; 4],
    acc_mix: &mut [i32; 4],
) {
    for ch in 0..4 {
        let attn = luts.channel_attenuation[(channels.ch[ch] & 0xF) as usize];
        if accon {
            let accumulated = acc::accumulate(sample, tl);
            let restored = acc::restore_16bit_domain(accumulated);
            acc_mix[ch] = acc::fold_into_channel(acc_mix[ch], restored, attn);
        } else {
            direct_mix[ch] += ((i64::from(sample) * i64::from(attn)) >> 16) as i32;
        }
    }
}

/// Renders one group's contribution to this sample's direct/ACC mix accumulators.
/// `pfm_rom` is `Some` only when the group honours PFM (§2) and its `pfm` flag is set.
pub(crate) fn render_group(
    regs: &GroupRegs,
    slots: &mut [Slot; 4],
    rom: &ExternalRom,
    group_is_pfm_capable: bool,
    luts: &Luts,
    sample_rate: f64,
    acc_applies_to_fm: bool,
    direct_mix: &mut [i32; 4],
    acc_mix: &mut [i32; 4],
) -> bool {
    let pfm_active = regs.pfm && group_is_pfm_capable;
    let mut looped = false;

    match regs.sync & 3 {
        0 => {
            let algo = &SYNC0_ALGORITHMS[(slots[0].regs.algorithm & 0xf) as usize];
            let pfm_rom = if pfm_active { Some(rom) } else { None };
            let banks = [0, 1, 2, 3];
            let outputs = render_fm_network(slots, &banks, algo, pfm_rom, luts, sample_rate);
            for k in 0..4 {
                if algo.carriers[k] {
                    let accon = slots[k].regs.accon && (acc_applies_to_fm || slots[k].is_pcm());
                    mix_carrier(
                        outputs[k],
                        &slots[k].regs.channels,
                        slots[k].regs.tl,
                        accon,
                        luts,
                        direct_mix,
                        acc_mix,
                    );
                }
                looped |= slots[k].pcm.looped_this_tick;
            }
        }
        1 => {
            let pfm_rom = if pfm_active { Some(rom) } else { None };
            for &(a, b) in &[(0usize, 2usize), (1, 3)] {
                let algo_idx = (slots[a].regs.algorithm & 3) as usize;
                let algo = &SYNC1_ALGORITHMS[algo_idx];
                let pair_banks = [a, b];
                let outputs = render_fm_network(slots, &pair_banks, algo, pfm_rom, luts, sample_rate);
                for (idx, bank) in [a, b].into_iter().enumerate() {
                    if algo.carriers[idx] {
                        let accon =
                            slots[bank].regs.accon && (acc_applies_to_fm || slots[bank].is_pcm());
                        mix_carrier(
                            outputs[idx],
                            &slots[bank].regs.channels,
                            slots[bank].regs.tl,
                            accon,
                            luts,
                            direct_mix,
                            acc_mix,
                        );
                    }
                    looped |= slots[bank].pcm.looped_this_tick;
                }
            }
        }
        2 => {
            let algo = &SYNC2_ALGORITHMS[(slots[0].regs.algorithm & 7) as usize];
            let pfm_rom = if pfm_active { Some(rom) } else { None };
            let banks = [0, 1, 2];
            let outputs = render_fm_network(slots, &banks, algo, pfm_rom, luts, sample_rate);
            for k in 0..3 {
                if algo.carriers[k] {
                    let accon = slots[k].regs.accon && (acc_applies_to_fm || slots[k].is_pcm());
                    mix_carrier(
                        outputs[k],
                        &slots[k].regs.channels,
                        slots[k].regs.tl,
                        accon,
                        luts,
                        direct_mix,
                        acc_mix,
                    );
                }
                looped |= slots[k].pcm.looped_this_tick;
            }

            let pcm_out = calculate_pfm_carrier(&mut slots[3], rom, luts, sample_rate, true);
            let accon = slots[3].regs.accon;
            mix_carrier(
                pcm_out,
                &slots[3].regs.channels,
                slots[3].regs.tl,
                accon,
                luts,
                direct_mix,
                acc_mix,
            );
            looped |= slots[3].pcm.looped_this_tick;
        }
        _ => {
            for slot in slots.iter_mut() {
                let sample = calculate_pfm_carrier(slot, rom, luts, sample_rate, true);
                let accon = slot.regs.accon;
                mix_carrier(
                    sample,
                    &slot.regs.channels,
                    slot.regs.tl,
                    accon,
                    luts,
                    direct_mix,
                    acc_mix,
                );
                looped |= slot.pcm.looped_this_tick;
            }
        }
    }

    looped && !regs.muted
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn mirror_group_sync0_is_all_four() {
        assert_eq!(mirror_group(0, 2), &[0, 1, 2, 3]);
    }

    #[test]
    fn mirror_group_sync1_splits_into_pairs() {
        assert_eq!(mirror_group(1, 0), &[0, 2]);
        assert_eq!(mirror_group(1, 3), &[1, 3]);
    }

    #[test]
    fn mirror_group_sync2_excludes_bank3() {
        assert_eq!(mirror_group(2, 1), &[0, 1, 2]);
        assert_eq!(mirror_group(2, 3), &[3]);
    }

    #[test]
    fn sync3_never_cascades() {
        assert_eq!(key_on_cascade_targets(3, 0), &[0]);
        assert_eq!(key_on_cascade_targets(3, 1), &[1]);
    }

    #[test]
    fn non_leader_bank_does_not_cascade() {
        assert_eq!(key_on_cascade_targets(0, 2), &[2]);
        assert_eq!(key_on_cascade_targets(2, 3), &[3]);
    }

    #[test]
    fn forces_pcm_only_on_sync2_bank3_and_sync3() {
        assert!(!forces_pcm(0, 3));
        assert!(!forces_pcm(1, 3));
        assert!(!forces_pcm(2, 0));
        assert!(!forces_pcm(2, 1));
        assert!(!forces_pcm(2, 2));
        assert!(forces_pcm(2, 3));
        for bank in 0..4 {
            assert!(forces_pcm(3, bank));
        }
    }

    #[test]
    fn pfm_only_honoured_on_groups_0_4_8() {
        assert!(pfm_capable(0));
        assert!(pfm_capable(4));
        assert!(pfm_capable(8));
        assert!(!pfm_capable(1));
        assert!(!pfm_capable(11));
    }
}
