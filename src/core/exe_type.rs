//! Executable variants recognised by the disassemblers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which executable format and width a disassembler matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutableType {
    /// PE32 image with x86 code
    Win32X86,
    /// PE32+ image with x64 code
    Win32X64,
}

impl ExecutableType {
    /// Human readable description, stable across releases.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutableType::Win32X86 => "Windows PE x86",
            ExecutableType::Win32X64 => "Windows PE x64",
        }
    }
}

impl fmt::Display for ExecutableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
