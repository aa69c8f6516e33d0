//! Core data types shared by the format parsers and disassemblers.

pub mod address_translator;
pub mod exe_type;
pub mod reference;
