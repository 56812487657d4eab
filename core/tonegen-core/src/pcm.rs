//! External PCM ROM storage and the per-slot PCM stepping/loop engine (§4.4).

use crate::error::{RomAllocError, MAX_ROM_BYTES};
use bincode::{Decode, Encode};

/// Linear 23-bit byte-addressable buffer (up to 8 MiB). Not part of [`crate::Chip`]'s
/// `bincode` snapshot — it is host-owned sample data, re-attached after restore the same
/// way a cartridge ROM buffer is (see `cartridge/external.rs`).
#[derive(Debug, Default)]
pub struct ExternalRom {
    data: Vec<u8>,
}

impl ExternalRom {
    pub fn alloc(&mut self, len: usize) -> Result<(), RomAllocError> {
        if len > MAX_ROM_BYTES {
            return Err(RomAllocError::TooLarge { requested: len });
        }
        self.data = vec![0; len];
        Ok(())
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) {
        let end = (offset + bytes.len()).min(self.data.len());
        if offset >= end {
            return;
        }
        let n = end - offset;
        self.data[offset..end].copy_from_slice(&bytes[..n]);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reads beyond the configured size return zero (§4.4), not the "original 0xFF
    /// fill" — implementation-defined per spec.
    pub fn read(&self, addr: u32) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or_else(|| {
            log::debug!("PCM read past configured ROM size at {addr:#x}");
            0
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub(crate) struct PcmRegs {
    pub startaddr: u32,
    pub endaddr: u32,
    pub loopaddr: u32,
    pub altloop: bool,
    pub bits12: bool,
    pub fs: u8,
    pub srcnote: u8,
    pub srcb: u8,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct PcmState {
    /// 32.16 fixed-point address pointer: integer part is the ROM byte address.
    pub stepptr: u64,
    pub loop_direction: i8,
    pub looped_this_tick: bool,
}

impl Default for PcmState {
    fn default() -> Self {
        Self { stepptr: 0, loop_direction: 1, looped_this_tick: false }
    }
}

impl PcmState {
    pub fn key_on(&mut self, regs: &PcmRegs) {
        self.stepptr = u64::from(regs.startaddr) << 16;
        self.loop_direction = 1;
        self.looped_this_tick = false;
    }

    fn int_addr(&self) -> i64 {
        (self.stepptr >> 16) as i64
    }

    /// Clamps a reflected address into `[loopaddr, endaddr]` without assuming
    /// `loopaddr <= endaddr` (§3's invariants explicitly don't require firmware to keep
    /// that ordering).
    fn clamp_to_region(value: i128, loopaddr_fp: u64, endaddr_fp: u64) -> u64 {
        let (lo, hi) = if loopaddr_fp <= endaddr_fp {
            (loopaddr_fp, endaddr_fp)
        } else {
            (endaddr_fp, loopaddr_fp)
        };
        value.clamp(i128::from(lo), i128::from(hi)) as u64
    }

    /// Fetches the current sample, then advances `stepptr` by `step` in the current
    /// direction and resolves loop boundaries. Returns the fetched sample.
    pub fn tick(&mut self, regs: &PcmRegs, rom: &ExternalRom, step: u64) -> i32 {
        self.looped_this_tick = false;
        let sample = fetch_sample(regs, rom, self.int_addr().max(0) as u32);

        if self.loop_direction >= 0 {
            self.stepptr = self.stepptr.wrapping_add(step);
        } else {
            self.stepptr = self.stepptr.wrapping_sub(step);
        }

        self.resolve_loop(regs);
        sample
    }

    /// Resolves a boundary crossing made by the advance in [`Self::tick`]. `endaddr` is an
    /// inclusive sample position (it is fetched normally the tick before overflow), so
    /// landing back exactly on `endaddr`/`loopaddr` after a crossing would refetch a
    /// sample already emitted — both branches below correct for the one-sample overshoot
    /// rather than snapping straight to the boundary (§8 S4/S5's worked sequences pin down
    /// the exact landing address).
    fn resolve_loop(&mut self, regs: &PcmRegs) {
        let endaddr_fp = u64::from(regs.endaddr) << 16;
        let loopaddr_fp = u64::from(regs.loopaddr) << 16;

        if self.loop_direction >= 0 {
            if self.stepptr > endaddr_fp {
                if regs.altloop {
                    // Bidirectional loop: reflect the overshoot back across `endaddr` so
                    // the next fetch resumes one sample short of the boundary instead of
                    // refetching it (§8 S5: "...ROM[0..255], ROM[254..128]...").
                    let reflected = 2i128 * i128::from(endaddr_fp) - i128::from(self.stepptr);
                    self.stepptr = Self::clamp_to_region(reflected, loopaddr_fp, endaddr_fp);
                    self.loop_direction = -1;
                } else {
                    // Forward-only loop: subtract one full trip around [loopaddr, endaddr]
                    // (inclusive on both ends, hence the +1) so the wrapped address lands
                    // exactly on `loopaddr` instead of one sample past it (§8 S4).
                    let loop_len_fp =
                        (u64::from(regs.endaddr.saturating_sub(regs.loopaddr)) + 1) << 16;
                    self.stepptr = self.stepptr.wrapping_sub(loop_len_fp.max(1 << 16));
                    if self.stepptr > endaddr_fp {
                        // One wrap wasn't enough (e.g. loopaddr == endaddr, or `step`
                        // larger than the loop span); fall back to a known-good position
                        // rather than looping unbounded.
                        self.stepptr = loopaddr_fp.min(endaddr_fp);
                    }
                }
                self.looped_this_tick = true;
            }
        } else if self.stepptr < loopaddr_fp {
            // Mirror image of the forward altloop branch.
            let reflected = 2i128 * i128::from(loopaddr_fp) - i128::from(self.stepptr);
            self.stepptr = Self::clamp_to_region(reflected, loopaddr_fp, endaddr_fp);
            self.loop_direction = 1;
            self.looped_this_tick = true;
        }
    }
}

fn fetch_sample(regs: &PcmRegs, rom: &ExternalRom, int_addr: u32) -> i32 {
    if regs.bits12 {
        let pair = int_addr / 2;
        let offset = pair * 3;
        let byte0 = rom.read(offset);
        let byte1 = rom.read(offset + 1);
        let byte2 = rom.read(offset + 2);
        if int_addr % 2 == 0 {
            (i32::from(byte0) << 8) | i32::from(byte1 & 0xF0)
        } else {
            (i32::from(byte2) << 8) | (i32::from(byte1 & 0x0F) << 4)
        }
    } else {
        i32::from(rom.read(int_addr)) << 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn rom_with(bytes: &[u8]) -> ExternalRom {
        let mut rom = ExternalRom::default();
        rom.alloc(bytes.len()).unwrap();
        rom.write(0, bytes);
        rom
    }

    #[test]
    fn rom_alloc_rejects_oversize() {
        let mut rom = ExternalRom::default();
        assert!(rom.alloc(MAX_ROM_BYTES + 1).is_err());
        assert!(rom.alloc(MAX_ROM_BYTES).is_ok());
    }

    #[test]
    fn eight_bit_roundtrip() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let rom = rom_with(&bytes);
        let regs = PcmRegs {
            startaddr: 0,
            endaddr: 255,
            loopaddr: 128,
            altloop: false,
            bits12: false,
            fs: 0,
            srcnote: 0,
            srcb: 0,
        };
        let mut state = PcmState::default();
        state.key_on(&regs);
        for i in 0..256 {
            let sample = state.tick(&regs, &rom, 1 << 16);
            assert_eq!(sample, i32::from(bytes[i]) << 8);
        }
    }

    #[test]
    fn forward_loop_wraps_into_range() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let rom = rom_with(&bytes);
        let regs = PcmRegs {
            startaddr: 0,
            endaddr: 255,
            loopaddr: 128,
            altloop: false,
            bits12: false,
            fs: 0,
            srcnote: 0,
            srcb: 0,
        };
        let mut state = PcmState::default();
        state.key_on(&regs);
        for _ in 0..384 {
            state.tick(&regs, &rom, 1 << 16);
            assert!(state.int_addr() >= i64::from(regs.startaddr));
            assert!(state.int_addr() <= i64::from(regs.endaddr));
        }
    }

    /// §8 S4: `start=0, end=255, loop=128` must emit `ROM[0..255]` (256 samples) followed
    /// by one full `ROM[128..255]` repeat (128 samples) — 384 samples total, the wrapped
    /// segment is exactly 128 samples (`128..=255`), not 127. The stream keeps repeating
    /// `ROM[128..255]` forever after that; 384 is just where the worked example stops.
    #[test]
    fn s4_forward_loop_literal_sequence() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let rom = rom_with(&bytes);
        let regs = PcmRegs {
            startaddr: 0,
            endaddr: 255,
            loopaddr: 128,
            altloop: false,
            bits12: false,
            fs: 0,
            srcnote: 0,
            srcb: 0,
        };

        let mut expected = Vec::new();
        expected.extend((0..=255u8).map(|b| i32::from(b) << 8));
        expected.extend((128..=255u8).map(|b| i32::from(b) << 8));
        assert_eq!(expected.len(), 384);

        let mut state = PcmState::default();
        state.key_on(&regs);
        let actual: Vec<i32> = (0..384).map(|_| state.tick(&regs, &rom, 1 << 16)).collect();
        assert_eq!(actual, expected);

        // The pattern keeps repeating: one more full trip around [128, 255].
        let next: Vec<i32> = (0..128).map(|_| state.tick(&regs, &rom, 1 << 16)).collect();
        let expected_next: Vec<i32> = (128..=255u8).map(|b| i32::from(b) << 8).collect();
        assert_eq!(next, expected_next);
    }

    /// §8 S5: the same region with `altloop=1` bounces at each boundary instead of
    /// snapping back to it, so consecutive segments never refetch the turnaround sample —
    /// `ROM[0..255], ROM[254..128], ROM[129..255]`.
    #[test]
    fn s5_alternate_loop_literal_sequence() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let rom = rom_with(&bytes);
        let regs = PcmRegs {
            startaddr: 0,
            endaddr: 255,
            loopaddr: 128,
            altloop: true,
            bits12: false,
            fs: 0,
            srcnote: 0,
            srcb: 0,
        };

        let mut expected = Vec::new();
        expected.extend((0..=255u8).map(|b| i32::from(b) << 8));
        expected.extend((128..=254u8).rev().map(|b| i32::from(b) << 8));
        expected.extend((129..=255u8).map(|b| i32::from(b) << 8));
        assert_eq!(expected.len(), 510);

        let mut state = PcmState::default();
        state.key_on(&regs);
        let actual: Vec<i32> = (0..510).map(|_| state.tick(&regs, &rom, 1 << 16)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn alternate_loop_reverses_direction() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let rom = rom_with(&bytes);
        let regs = PcmRegs {
            startaddr: 0,
            endaddr: 255,
            loopaddr: 128,
            altloop: true,
            bits12: false,
            fs: 0,
            srcnote: 0,
            srcb: 0,
        };
        let mut state = PcmState::default();
        state.key_on(&regs);
        let mut saw_reverse = false;
        for _ in 0..600 {
            state.tick(&regs, &rom, 1 << 16);
            if state.loop_direction < 0 {
                saw_reverse = true;
            }
        }
        assert!(saw_reverse);
    }

    #[test]
    fn twelve_bit_unpacking() {
        // h0=0xAB, mix=0xCD, h1=0xEF -> even sample AB_C0, odd sample EF_D0 (per §4.4)
        let bytes = [0xAB, 0xCD, 0xEF];
        let rom = rom_with(&bytes);
        let regs = PcmRegs {
            startaddr: 0,
            endaddr: 1,
            loopaddr: 0,
            altloop: false,
            bits12: true,
            fs: 0,
            srcnote: 0,
            srcb: 0,
        };
        assert_eq!(fetch_sample(&regs, &rom, 0), 0xAB << 8 | 0xC0);
        assert_eq!(fetch_sample(&regs, &rom, 1), 0xEF << 8 | 0xD0);
    }

    #[test]
    fn oob_read_returns_zero() {
        let rom = rom_with(&[1, 2, 3]);
        assert_eq!(rom.read(1000), 0);
    }
}
