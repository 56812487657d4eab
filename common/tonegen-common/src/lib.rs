pub mod num;

pub use num::{GetBit, SignBit, U16Ext, U24Ext};
