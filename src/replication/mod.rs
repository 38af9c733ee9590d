//! Source-side replication: wire messages, decoding and slot administration.

pub mod decoder;
pub mod proto;
pub mod source;
