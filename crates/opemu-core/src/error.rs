use opemu_decoder::{DecodeError, Family};
use thiserror::Error;

use crate::mem::MemoryFault;

/// Why an eligible fault could not be emulated. Every variant ends in the
/// fault being forwarded to the host's original handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmulationError {
    #[error("instruction fetch failed: {0}")]
    Fetch(MemoryFault),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("no emulation for this encoding")]
    Unsupported,
    #[error("operand read failed: {0}")]
    Memory(#[from] MemoryFault),
    #[error("{0:?} emulation is disabled")]
    Disabled(Family),
}
