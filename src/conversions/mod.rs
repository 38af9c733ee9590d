//! Value conversion between wire datums and destination-facing values.

pub mod bool;
pub mod normalizer;
pub mod numeric;
pub mod resolver;
pub mod time;
