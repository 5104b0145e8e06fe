//! Message parsing: EML entry point, raw header decoding, and MIME handling.

pub mod eml;
pub mod header;
pub mod mime;
