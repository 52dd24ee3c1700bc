use std::fmt;

/// Distinguishes *why* construction failed, so the CLI can choose between
/// exit codes 1-3 without string-matching the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// Something other than the ROM/cartridge itself (e.g. a bad boot ROM
    /// image) kept the emulator from being constructed. Exit code 1.
    Construction,
    /// The ROM file couldn't be read or its header is malformed. Exit code 2.
    Rom,
    /// The header parsed fine but names a mapper this core doesn't
    /// implement. Exit code 3.
    UnsupportedMapper,
}

/// Error taxonomy for the core.
///
/// `LoadFailure` covers everything that can go wrong constructing an
/// emulator; `stage` carries enough detail for the CLI to map it to the
/// right exit code.
///
/// `DecodeFailure` terminates a run but not the process: the reference
/// hardware locks up on these opcodes, this core just stops stepping and
/// the process still exits cleanly.
///
/// `BusViolation` (writes to unmapped I/O) and `HostShutdown` (a clean
/// frontend-requested stop) are not modeled as errors at all;
/// the former is silently ignored in `Mmu::write8`, the latter is a `bool`
/// return from `Frontend::poll_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmuError {
    LoadFailure { message: String, stage: LoadStage },
    DecodeFailure { pc: u16, opcode: u8 },
}

impl EmuError {
    pub fn construction(message: impl Into<String>) -> Self {
        EmuError::LoadFailure { message: message.into(), stage: LoadStage::Construction }
    }

    pub fn load(message: impl Into<String>) -> Self {
        EmuError::LoadFailure { message: message.into(), stage: LoadStage::Rom }
    }

    pub fn unsupported_mapper(message: impl Into<String>) -> Self {
        EmuError::LoadFailure { message: message.into(), stage: LoadStage::UnsupportedMapper }
    }

    pub fn stage(&self) -> Option<LoadStage> {
        match self {
            EmuError::LoadFailure { stage, .. } => Some(*stage),
            EmuError::DecodeFailure { .. } => None,
        }
    }
}

impl fmt::Display for EmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmuError::LoadFailure { message, .. } => write!(f, "failed to load ROM: {message}"),
            EmuError::DecodeFailure { pc, opcode } => {
                write!(f, "illegal opcode {opcode:#04x} at PC={pc:#06x}")
            }
        }
    }
}

impl std::error::Error for EmuError {}

pub type Result<T> = std::result::Result<T, EmuError>;
