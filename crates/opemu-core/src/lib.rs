//! Software emulation of BMI1/BMI2 and SSE4.2 string-compare instructions for
//! user threads that hit #UD on CPUs without those extensions.
//!
//! The entry point is [`TrapDispatcher::handle_trap`]: given the faulting
//! thread's [`RegisterSnapshot`] and access to its memory, it decodes the
//! instruction at RIP, emulates it, writes the results back and steps RIP
//! past it. Anything it does not recognize is left for the host's own
//! handler.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod exceptions;
pub mod interp;
pub mod mem;
pub mod operand;
pub mod state;
pub mod trap;
pub mod writeback;

pub use config::EmulatorConfig;
pub use error::EmulationError;
pub use exceptions::Exception;
pub use interp::Emulation;
pub use mem::{FlatTestMemory, MemoryFault, UserMemory};
pub use state::{CpuMode, FlagUpdate, RFlags, RegisterSnapshot};
pub use trap::{ForwardReason, TrapDispatcher, TrapOutcome};
pub use writeback::{EmulationResult, RegWrite};

pub use opemu_decoder as decoder;
