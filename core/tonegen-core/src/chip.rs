//! Top-level chip object: register file, timers, mix buffers, and the per-sample update
//! loop (§2, §5, §6).

use crate::error::RomAllocError;
use crate::group::{self, GroupRegs};
use crate::lut::Luts;
use crate::mix;
use crate::pcm::ExternalRom;
use crate::registers::Registers;
use crate::slot::Slot;
use crate::timer::Timers;
use bincode::{Decode, Encode};
use std::array;

/// How a host peeking at internal register storage outside the three documented read
/// ports (§6) should see undocumented addresses. §7's body and its own Open Questions
/// note (§9) disagree on this, so it is a config knob rather than a fixed behaviour — see
/// `DESIGN.md` Open Question 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndocumentedRegisterRead {
    #[default]
    Zero,
    AllOnes,
}

#[derive(Debug, Clone, Copy)]
pub struct ChipConfig {
    /// Chip clock in Hz; all rate LUTs (attack, decay, LFO) scale by `clock_hz / 16_934_400`.
    pub clock_hz: f64,
    pub sample_rate: f64,
    pub undocumented_register_reads: UndocumentedRegisterRead,
    /// Whether `accon=1` is honoured on FM (non-PCM) slots. Left undocumented by §9;
    /// defaults to `false` (ACC only applies to PCM voices).
    pub acc_applies_to_fm: bool,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            clock_hz: 16_934_400.0,
            sample_rate: 44_100.0,
            undocumented_register_reads: UndocumentedRegisterRead::Zero,
            acc_applies_to_fm: false,
        }
    }
}

/// Everything that round-trips through save states: register file, timers, slots and
/// groups. Excludes the lookup tables (rebuilt from [`ChipConfig`]) and the external ROM
/// buffer (host-owned, re-attached after restore — see [`crate::pcm::ExternalRom`]).
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct ChipState {
    pub slots: [Slot; 48],
    pub groups: [GroupRegs; 12],
    pub registers: Registers,
    pub timers: Timers,
    pub end_status: u16,
    pub ext_address: u32,
    pub ext_rw_write: bool,
    pub busy_flag: bool,
}

impl Default for ChipState {
    fn default() -> Self {
        Self {
            slots: array::from_fn(|_| Slot::default()),
            groups: [GroupRegs::default(); 12],
            registers: Registers::default(),
            timers: Timers::default(),
            end_status: 0,
            ext_address: 0,
            ext_rw_write: false,
            busy_flag: false,
        }
    }
}

pub struct Chip {
    config: ChipConfig,
    luts: Luts,
    state: ChipState,
    rom: ExternalRom,
    direct_buf: Vec<[i32; 4]>,
    acc_buf: Vec<[i32; 4]>,
}

impl Chip {
    #[must_use]
    pub fn new(config: ChipConfig) -> Self {
        let luts = Luts::build(config.clock_hz, config.sample_rate);
        Self {
            config,
            luts,
            state: ChipState::default(),
            rom: ExternalRom::default(),
            direct_buf: Vec::new(),
            acc_buf: Vec::new(),
        }
    }

    /// Reconstructs chip state from `config` while preserving the attached external ROM
    /// buffer (§8 S9 "Idempotent reset" implies reset exists, without spelling out a
    /// signature for it — resetting audio hardware does not typically erase attached
    /// sample ROM).
    pub fn reset(&mut self) {
        self.state = ChipState::default();
        self.luts = Luts::build(self.config.clock_hz, self.config.sample_rate);
    }

    /// Snapshots all save-state-eligible chip state (everything but the lookup tables and
    /// the external ROM buffer).
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        bincode::encode_to_vec(&self.state, bincode::config::standard())
            .expect("ChipState encoding is infallible for in-memory buffers")
    }

    /// Restores chip state previously produced by [`Chip::snapshot`]. The external ROM
    /// buffer is untouched; reattach it separately if the host also wants to restore ROM
    /// contents.
    pub fn restore(&mut self, snapshot: &[u8]) -> Result<(), bincode::error::DecodeError> {
        let (state, _) = bincode::decode_from_slice(snapshot, bincode::config::standard())?;
        self.state = state;
        Ok(())
    }

    pub fn alloc_rom(&mut self, len: usize) -> Result<(), RomAllocError> {
        self.rom.alloc(len)
    }

    pub fn write_rom(&mut self, offset: usize, bytes: &[u8]) {
        self.rom.write(offset, bytes);
    }

    #[must_use]
    pub fn irq_asserted(&self) -> bool {
        self.state.timers.irq_asserted()
    }

    #[must_use]
    pub fn end_status_bits(&self) -> u16 {
        self.state.end_status
    }

    /// Invoked by the host when its own Timer A period (§6) has elapsed.
    pub fn timer_a_fire(&mut self) {
        self.state.timers.fire_a();
    }

    /// Invoked by the host when its own Timer B period (§6) has elapsed.
    pub fn timer_b_fire(&mut self) {
        self.state.timers.fire_b();
    }

    pub fn write_port(&mut self, port: u8, value: u8) {
        crate::registers::write_port(&mut self.state, &mut self.rom, &self.luts, port, value);
    }

    #[must_use]
    pub fn read_port(&mut self, port: u8) -> u8 {
        crate::registers::read_port(&mut self.state, &self.rom, self.config, port)
    }

    /// Renders `n` samples into `out_l`/`out_r`. All register writes observed before this
    /// call are reflected starting at sample 0; writes observed during the call (there are
    /// none, since the host serialises entry points per §5) would apply at the next call.
    pub fn update(&mut self, n: usize, out_l: &mut [i32], out_r: &mut [i32]) {
        assert!(out_l.len() >= n && out_r.len() >= n, "output buffers shorter than block length");

        if self.direct_buf.len() < n {
            self.direct_buf.resize(n, [0; 4]);
            self.acc_buf.resize(n, [0; 4]);
        }

        let mut new_end_status = self.state.end_status;

        for i in 0..n {
            let mut direct = [0i32; 4];
            let mut acc = [0i32; 4];

            for g in 0..12 {
                let group_regs = self.state.groups[g];
                let base = g * 4;
                let slots = array_mut4(&mut self.state.slots, base);
                let looped = group::render_group(
                    &group_regs,
                    slots,
                    &self.rom,
                    group::pfm_capable(g),
                    &self.luts,
                    self.config.sample_rate,
                    self.config.acc_applies_to_fm,
                    &mut direct,
                    &mut acc,
                );
                if looped {
                    new_end_status |= 1 << g;
                }
            }

            self.direct_buf[i] = direct;
            self.acc_buf[i] = acc;
        }

        self.state.end_status = new_end_status;

        for i in 0..n {
            let direct = self.direct_buf[i];
            let acc = self.acc_buf[i];
            let folded =
                [direct[0] + acc[0], direct[1] + acc[1], direct[2] + acc[2], direct[3] + acc[3]];
            let (l, r) = mix::fold_stereo(folded);
            out_l[i] = l;
            out_r[i] = r;
        }
    }
}

/// Borrows the four contiguous slots of group `base/4` as `&mut [Slot; 4]` without
/// aliasing the rest of the 48-slot array.
fn array_mut4(slots: &mut [Slot; 48], base: usize) -> &mut [Slot; 4] {
    (&mut slots[base..base + 4]).try_into().expect("group slice is exactly 4 slots")
}
