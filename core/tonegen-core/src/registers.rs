//! Register-port decode: sub-address latching, `fm_tab`/`pcm_tab` mapping, synchronized
//! register mirroring, and the three documented read ports (§6).
//!
//! The exact bit layout within each parameter code is this implementation's own choice —
//! §4.9 names the literal synchronized-register set `{0, 9, A, C, D, E}` and §6 names the
//! `fm_tab`/`pcm_tab` group-selector tables, but neither spells out which bits of which
//! byte carry which field (see `DESIGN.md` Open Question 4). The layout below reproduces
//! the literal synchronized set exactly by assigning voice-identity, pitch, and LFO fields
//! to those codes, and adds an out-of-range code `0xA` on the PCM port (outside the stated
//! 0-9 range) to select which of a group's banks 0-3 a Sync-2/3 PCM write targets
//! (`DESIGN.md` Open Question 4c), plus code `0xB` on the FM port for key-on (Open
//! Question 5), deliberately excluded from the mirrored set.

use crate::chip::{ChipConfig, ChipState, UndocumentedRegisterRead};
use crate::group;
use crate::lut::Luts;
use crate::pcm::{ExternalRom, PcmRegs};
use crate::slot::Slot;
use bincode::{Decode, Encode};
use tonegen_common::{GetBit, U24Ext};

/// Low nibble of an FM-bank sub-address selects the group. `-1` entries are unused
/// (§7: "silently ignored with a debug log entry").
pub(crate) const FM_TAB: [i8; 16] = [0, 1, 2, -1, 3, 4, 5, -1, 6, 7, 8, -1, 9, 10, 11, -1];

/// Low nibble of a PCM sub-address selects a group's bank-0 slot index directly
/// (`pcm_tab` entries are exactly `4 * fm_tab`'s entries, per §6).
pub(crate) const PCM_TAB: [i8; 16] = [0, 4, 8, -1, 12, 16, 20, -1, 24, 28, 32, -1, 36, 40, 44, -1];

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Registers {
    /// Latched sub-address per FM bank port-pair (0/1, 2/3, 4/5, 6/7).
    pub fm_addr: [u8; 4],
    pub pcm_addr: u8,
    /// Per-group bank selector latched by PCM field code `0xA` (Open Question 4c);
    /// governs which bank a Sync-2/3 PCM address/format write lands on.
    pub pcm_bank_select: [u8; 12],
    pub timer_addr: u8,
}

impl Default for Registers {
    fn default() -> Self {
        Self { fm_addr: [0; 4], pcm_addr: 0, pcm_bank_select: [0; 12], timer_addr: 0 }
    }
}

/// Synchronized register codes mirrored to sibling slots per §4.9. Key-on (`0xB`) is
/// deliberately excluded — its cascade is the separate special-cased behaviour in §4.9's
/// first sentence, not a register mirror.
const SYNCHRONIZED_CODES: [u8; 6] = [0x0, 0x9, 0xA, 0xC, 0xD, 0xE];

pub(crate) fn write_port(state: &mut ChipState, rom: &mut ExternalRom, luts: &Luts, port: u8, value: u8) {
    match port {
        0 | 2 | 4 | 6 => {
            state.registers.fm_addr[(port / 2) as usize] = value;
        }
        1 | 3 | 5 | 7 => {
            apply_fm_port_write(state, luts, (port / 2) as usize, value);
        }
        8 => state.registers.pcm_addr = value,
        9 => apply_pcm_port_write(state, value),
        0xC => state.registers.timer_addr = value,
        0xD => apply_timer_port_write(state, rom, value),
        0xA | 0xE | 0xF => {
            log::debug!("write to unused main register port {port:#x}");
        }
        _ => unreachable!("register port is a 4-bit address"),
    }
}

pub(crate) fn read_port(state: &mut ChipState, rom: &ExternalRom, config: ChipConfig, port: u8) -> u8 {
    match port {
        0 => {
            let (status_a, status_b) = state.timers.status_bits();
            (u8::from(state.busy_flag) << 7)
                | (((state.end_status & 0xF) as u8) << 3)
                | (u8::from(status_b) << 1)
                | u8::from(status_a)
        }
        1 => (state.end_status >> 4) as u8,
        2 => {
            if state.ext_rw_write {
                log::debug!("read from external-data port while direction is write");
                0
            } else {
                let value = rom.read(state.ext_address);
                state.ext_address = (state.ext_address + 1) & 0x7F_FFFF;
                value
            }
        }
        _ => match config.undocumented_register_reads {
            UndocumentedRegisterRead::Zero => 0,
            UndocumentedRegisterRead::AllOnes => 0xFF,
        },
    }
}

fn apply_fm_port_write(state: &mut ChipState, luts: &Luts, bank: usize, data: u8) {
    let addr = state.registers.fm_addr[bank];
    let group_nibble = addr & 0xF;
    let code = (addr >> 4) & 0xF;

    let group_nibble_val = FM_TAB[group_nibble as usize];
    if group_nibble_val < 0 {
        log::debug!("ignored FM write: sub-address nibble {group_nibble:#x} is unused");
        return;
    }
    let group_idx = group_nibble_val as usize;
    let slot_idx = group_idx * 4 + bank;

    if code == 0xB {
        key_on_or_off(state, luts, group_idx, bank, data.bit(0));
        return;
    }

    apply_fm_field(&mut state.slots[slot_idx], code, data);

    if SYNCHRONIZED_CODES.contains(&code) {
        for &sibling_bank in group::mirror_group(state.groups[group_idx].sync, bank) {
            if sibling_bank == bank {
                continue;
            }
            apply_fm_field(&mut state.slots[group_idx * 4 + sibling_bank], code, data);
        }
    }
}

fn key_on_or_off(state: &mut ChipState, luts: &Luts, group_idx: usize, bank: usize, key_on: bool) {
    let sync = state.groups[group_idx].sync;
    for &target_bank in group::key_on_cascade_targets(sync, bank) {
        let slot = &mut state.slots[group_idx * 4 + target_bank];
        if key_on {
            slot.key_on(luts, group::forces_pcm(sync, target_bank));
        } else {
            slot.key_off(luts);
        }
    }
}

fn apply_fm_field(slot: &mut Slot, code: u8, data: u8) {
    match code {
        0x0 => slot.regs.pitch.fns = (slot.regs.pitch.fns & 0x0700) | u16::from(data),
        0x1 => {
            slot.regs.pitch.block = (data >> 3) & 7;
            slot.regs.pitch.fns = (slot.regs.pitch.fns & 0x00FF) | (u16::from(data & 7) << 8);
        }
        0x2 => {
            slot.regs.waveform = (data >> 5) & 7;
            slot.regs.algorithm = (data >> 1) & 0xF;
            slot.regs.accon = data.bit(0);
        }
        0x3 => {
            slot.regs.feedback = (data >> 5) & 7;
            slot.regs.pitch.multiple = (data >> 1) & 0xF;
        }
        0x4 => slot.regs.pitch.detune = (data >> 5) & 7,
        0x5 => slot.regs.tl = data & 0x7F,
        0x6 => {
            slot.regs.envelope.keyscale = (data >> 6) & 3;
            slot.regs.envelope.ar = (data >> 1) & 0x1F;
        }
        0x7 => slot.regs.envelope.d1r = (data >> 3) & 0x1F,
        0x8 => slot.regs.envelope.d2r = (data >> 3) & 0x1F,
        0x9 => {
            slot.regs.envelope.rr = (data >> 4) & 0xF;
            slot.regs.envelope.d1l = data & 0xF;
        }
        0xA => slot.regs.lfo.lfo_freq = data,
        0xC => {
            slot.regs.lfo.lfo_wave = (data >> 6) & 3;
            slot.regs.lfo.pms = (data >> 3) & 7;
            slot.regs.lfo.ams = data & 3;
        }
        0xD => {
            slot.regs.channels.ch[0] = (data >> 4) & 0xF;
            slot.regs.channels.ch[1] = data & 0xF;
        }
        0xE => {
            slot.regs.channels.ch[2] = (data >> 4) & 0xF;
            slot.regs.channels.ch[3] = data & 0xF;
        }
        _ => log::debug!("ignored FM parameter code {code:#x}"),
    }
}

fn apply_pcm_port_write(state: &mut ChipState, data: u8) {
    let addr = state.registers.pcm_addr;
    let group_nibble = addr & 0xF;
    let code = (addr >> 4) & 0xF;

    let base_slot_val = PCM_TAB[group_nibble as usize];
    if base_slot_val < 0 {
        log::debug!("ignored PCM write: sub-address nibble {group_nibble:#x} is unused");
        return;
    }
    let base_slot = base_slot_val as usize;
    let group_idx = base_slot / 4;

    if code == 0xA {
        state.registers.pcm_bank_select[group_idx] = data & 3;
        return;
    }

    let bank = state.registers.pcm_bank_select[group_idx] as usize;
    apply_pcm_field(&mut state.slots[base_slot + bank].regs.pcm, code, data);
}

fn apply_pcm_field(pcm: &mut PcmRegs, code: u8, data: u8) {
    match code {
        0x0 => pcm.startaddr.set_low_byte(data),
        0x1 => pcm.startaddr.set_mid_byte(data),
        0x2 => pcm.startaddr.set_high_byte(data & 0x7F),
        0x3 => pcm.endaddr.set_low_byte(data),
        0x4 => pcm.endaddr.set_mid_byte(data),
        0x5 => pcm.endaddr.set_high_byte(data & 0x7F),
        0x6 => pcm.loopaddr.set_low_byte(data),
        0x7 => pcm.loopaddr.set_mid_byte(data),
        0x8 => pcm.loopaddr.set_high_byte(data & 0x7F),
        0x9 => {
            pcm.bits12 = data.bit(7);
            pcm.altloop = data.bit(6);
            pcm.fs = (data >> 4) & 3;
            pcm.srcnote = (data >> 2) & 3;
            pcm.srcb = data & 3;
        }
        _ => log::debug!("ignored PCM parameter code {code:#x}"),
    }
}

fn apply_timer_port_write(state: &mut ChipState, rom: &mut ExternalRom, data: u8) {
    match state.registers.timer_addr {
        addr @ 0x00..=0x0B => {
            let group_idx = addr as usize;
            state.groups[group_idx].sync = data & 3;
            state.groups[group_idx].pfm = data.bit(2);
            state.groups[group_idx].muted = data.bit(3);
        }
        0x10 => state.timers.timer_a = (state.timers.timer_a & 0x3) | (u16::from(data) << 2),
        0x11 => state.timers.timer_a = (state.timers.timer_a & !0x3) | u16::from(data & 3),
        0x12 => state.timers.timer_b = data,
        0x13 => state.timers.write_control(data),
        0x14 => state.ext_address.set_low_byte(data),
        0x15 => state.ext_address.set_mid_byte(data),
        0x16 => {
            state.ext_address.set_high_byte(data & 0x7F);
            state.ext_rw_write = data.bit(7);
        }
        0x17 => {
            if state.ext_rw_write {
                rom.write(state.ext_address as usize, &[data]);
                state.ext_address = (state.ext_address + 1) & 0x7F_FFFF;
            } else {
                log::debug!("ignored external-data write while direction is read");
            }
        }
        other => log::debug!("ignored timer/group sub-address {other:#x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn luts() -> Luts {
        Luts::build(16_934_400.0, 44100.0)
    }

    #[test]
    fn fm_tab_unused_nibbles_are_ignored() {
        let mut state = ChipState::default();
        let mut rom = ExternalRom::default();
        let luts = luts();
        state.registers.fm_addr[0] = 0x23; // group nibble 3 -> unused
        write_port(&mut state, &mut rom, &luts, 1, 0xFF);
        assert_eq!(state.slots[0].regs.tl, 0);
    }

    #[test]
    fn pcm_tab_matches_four_times_fm_tab() {
        for i in 0..16 {
            let expected = if FM_TAB[i] < 0 { -1 } else { FM_TAB[i] * 4 };
            assert_eq!(PCM_TAB[i], expected);
        }
    }

    #[test]
    fn sync0_field_write_mirrors_to_all_four_banks() {
        let mut state = ChipState::default();
        let mut rom = ExternalRom::default();
        let luts = luts();
        state.groups[0].sync = 0;

        // Port 0/1 addresses group 0 bank 0; code 0x9 (rr/d1l) is synchronized.
        write_port(&mut state, &mut rom, &luts, 0, 0x90);
        write_port(&mut state, &mut rom, &luts, 1, 0xAB);

        for bank in 0..4 {
            assert_eq!(state.slots[bank].regs.envelope.rr, 0xA);
            assert_eq!(state.slots[bank].regs.envelope.d1l, 0xB);
        }
    }

    #[test]
    fn key_on_code_does_not_mirror_register_but_cascades() {
        let mut state = ChipState::default();
        let mut rom = ExternalRom::default();
        let luts = luts();
        state.groups[0].sync = 0;

        write_port(&mut state, &mut rom, &luts, 0, 0xB0);
        write_port(&mut state, &mut rom, &luts, 1, 0x01);

        for bank in 0..4 {
            assert!(state.slots[bank].env.active);
        }
    }

    #[test]
    fn pcm_bank_select_targets_non_leader_bank() {
        let mut state = ChipState::default();
        let mut rom = ExternalRom::default();

        write_port(&mut state, &mut rom, &luts(), 8, 0xA0); // group 0, code 0xA (bank select)
        write_port(&mut state, &mut rom, &luts(), 9, 2); // select bank 2

        write_port(&mut state, &mut rom, &luts(), 8, 0x30); // group 0, code 0x3 (endaddr low)
        write_port(&mut state, &mut rom, &luts(), 9, 0x55);

        assert_eq!(state.slots[2].regs.pcm.endaddr & 0xFF, 0x55);
        assert_eq!(state.slots[0].regs.pcm.endaddr & 0xFF, 0);
    }

    #[test]
    fn sync3_key_on_forces_pcm_path_without_waveform_register() {
        let mut state = ChipState::default();
        let mut rom = ExternalRom::default();
        let luts = luts();
        state.groups[0].sync = 3;
        // Firmware never writes waveform=7 here; sync mode alone must force the PCM path.
        assert_eq!(state.slots[1].regs.waveform, 0);
        state.slots[1].regs.pcm.startaddr = 0x10;
        state.slots[1].pcm.stepptr = 0xFFFF_0000; // stale cursor from a previous voice

        write_port(&mut state, &mut rom, &luts, 2, 0xB0); // port 2/3 -> group 0 bank 1
        write_port(&mut state, &mut rom, &luts, 3, 0x01);

        assert_eq!(state.slots[1].pcm.stepptr, u64::from(0x10u32) << 16);
        assert!(state.slots[1].step > 0);
    }

    #[test]
    fn s3_timer_a_register_write() {
        let mut state = ChipState::default();
        let mut rom = ExternalRom::default();
        let luts = luts();

        write_port(&mut state, &mut rom, &luts, 0xC, 0x10);
        write_port(&mut state, &mut rom, &luts, 0xD, 0xFF); // hi 8 bits
        write_port(&mut state, &mut rom, &luts, 0xC, 0x11);
        write_port(&mut state, &mut rom, &luts, 0xD, 0x3); // lo 2 bits
        assert_eq!(state.timers.timer_a, 1023);
        assert_eq!(state.timers.period_a_cycles(), 384);
    }

    #[test]
    fn read_port0_reports_status_and_end_bits() {
        let mut state = ChipState::default();
        let rom = ExternalRom::default();
        state.end_status = 0b1111;
        state.timers.write_control(0x05);
        state.timers.fire_a();
        let value = read_port(&mut state, &rom, ChipConfig::default(), 0);
        assert_eq!(value, (0xF << 3) | 1);
    }
}
