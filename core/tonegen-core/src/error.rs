//! Fallible surfaces. The chip itself has no runtime failure modes (spec §7); the one
//! allocation failure the host can hit is requesting more external ROM than the 23-bit
//! address space can name.

use thiserror::Error;

pub const MAX_ROM_BYTES: usize = 1 << 23;

#[derive(Debug, Error)]
pub enum RomAllocError {
    #[error("requested PCM ROM size {requested} exceeds the 23-bit address space ({MAX_ROM_BYTES} bytes)")]
    TooLarge { requested: usize },
}
