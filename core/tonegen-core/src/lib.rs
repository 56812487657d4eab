//! 48-slot hybrid FM/PCM tone-generator core.
//!
//! [`Chip`] is the only public entry point: construct it with a [`ChipConfig`], feed it
//! register writes through [`Chip::write_port`], and pull rendered audio through
//! [`Chip::update`]. Everything else in this crate is an implementation detail of how that
//! one object turns register state into samples.

mod acc;
mod algorithm;
mod chip;
mod envelope;
mod error;
mod fm;
mod group;
mod lfo;
mod lut;
mod mix;
mod pcm;
mod pitch;
mod registers;
mod slot;
mod timer;

pub use chip::{Chip, ChipConfig, UndocumentedRegisterRead};
pub use error::RomAllocError;
pub use pcm::ExternalRom;
