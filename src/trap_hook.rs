//! The replacement for the host's error-trap routine.

use opemu_core::{EmulatorConfig, RegisterSnapshot, TrapDispatcher, TrapOutcome, UserMemory};
use tracing::trace;

/// Arguments the host passes to its error-trap routine besides the registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    pub error_code: i64,
    pub trap: u64,
    pub signal: i32,
}

/// The saved original routine, reached through the hook's `original` address.
pub trait OriginalHandler {
    fn call(&mut self, regs: &mut RegisterSnapshot, frame: &TrapFrame);
}

impl<F> OriginalHandler for F
where
    F: FnMut(&mut RegisterSnapshot, &TrapFrame),
{
    fn call(&mut self, regs: &mut RegisterSnapshot, frame: &TrapFrame) {
        self(regs, frame)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorTrapHook {
    dispatcher: TrapDispatcher,
}

impl ErrorTrapHook {
    pub fn new(config: EmulatorConfig) -> Self {
        Self {
            dispatcher: TrapDispatcher::new(config),
        }
    }

    pub fn dispatcher(&self) -> &TrapDispatcher {
        &self.dispatcher
    }

    /// Runs in place of the original routine. Returns `true` when the fault
    /// was emulated; otherwise `original` has been called with the registers
    /// and frame exactly as they arrived.
    pub fn handle<M, H>(
        &self,
        regs: &mut RegisterSnapshot,
        mem: &mut M,
        frame: &TrapFrame,
        original: &mut H,
    ) -> bool
    where
        M: UserMemory + ?Sized,
        H: OriginalHandler + ?Sized,
    {
        if regs.is_user() {
            if let Ok(trap) = u8::try_from(frame.trap) {
                if self.dispatcher.handle_trap(regs, mem, trap) == TrapOutcome::Handled {
                    return true;
                }
            }
        }

        trace!(trap = frame.trap, signal = frame.signal, "calling original error trap");
        original.call(regs, frame);
        false
    }
}
