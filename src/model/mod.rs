//! Core data model: persisted catalog records and transient parser output.

pub mod email;
pub mod message;
