//! Byte level helpers shared by the cache and container parsers.

pub mod buf;
pub mod fourcc;

pub use crate::fourcc::{FourCC, ParseFourCCError};
