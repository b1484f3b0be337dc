use opemu_decoder::{decode, MAX_INST_LEN};
use tracing::{debug, trace};

use crate::config::EmulatorConfig;
use crate::error::EmulationError;
use crate::exceptions::Exception;
use crate::interp::{self, bmi, pcmpstr, Emulation};
use crate::mem::{fetch_instruction, UserMemory};
use crate::state::RegisterSnapshot;
use crate::writeback::EmulationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardReason {
    /// Not an invalid-opcode fault.
    OtherTrap(u8),
    /// Raised in kernel mode; never emulated.
    KernelOrigin,
    Emulation(EmulationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Registers were updated; resume the thread at the new RIP.
    Handled,
    /// Leave the registers alone and let the original handler run.
    Forward(ForwardReason),
}

impl TrapOutcome {
    pub fn is_handled(self) -> bool {
        self == TrapOutcome::Handled
    }
}

/// Stateless #UD handler: every call decodes and emulates one instruction
/// from scratch, so it may run concurrently on any number of threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapDispatcher {
    config: EmulatorConfig,
}

impl TrapDispatcher {
    pub fn new(config: EmulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Handle a trap delivered by the host. On [`TrapOutcome::Handled`] the
    /// snapshot holds the results and the advanced RIP; otherwise it is
    /// untouched.
    pub fn handle_trap<M: UserMemory + ?Sized>(
        &self,
        regs: &mut RegisterSnapshot,
        mem: &mut M,
        trap: u8,
    ) -> TrapOutcome {
        if Exception::from_vector(trap) != Some(Exception::InvalidOpcode) {
            return TrapOutcome::Forward(ForwardReason::OtherTrap(trap));
        }
        if !regs.is_user() {
            debug!(rip = regs.rip(), "#UD in kernel mode, forwarding");
            return TrapOutcome::Forward(ForwardReason::KernelOrigin);
        }

        match self.emulate(regs, mem) {
            Ok(result) => {
                result.commit(regs);
                TrapOutcome::Handled
            }
            Err(err) => {
                debug!(rip = regs.rip(), %err, "not emulated, forwarding");
                TrapOutcome::Forward(ForwardReason::Emulation(err))
            }
        }
    }

    /// Decode and emulate the instruction at `regs.rip` without committing
    /// anything.
    pub fn emulate<M: UserMemory + ?Sized>(
        &self,
        regs: &RegisterSnapshot,
        mem: &mut M,
    ) -> Result<EmulationResult, EmulationError> {
        let mut bytes = [0u8; MAX_INST_LEN];
        let fetched = fetch_instruction(mem, regs.rip(), regs.mode.ip_mask(), &mut bytes)
            .map_err(EmulationError::Fetch)?;

        let desc = decode(&bytes[..fetched], regs.mode.decode_mode())?;
        if !self.config.allows(desc.family) {
            return Err(EmulationError::Disabled(desc.family));
        }
        let emulation = interp::lookup(&desc).ok_or(EmulationError::Unsupported)?;

        let result = match emulation {
            Emulation::Pcmpestrm
            | Emulation::Pcmpestri
            | Emulation::Pcmpistrm
            | Emulation::Pcmpistri => pcmpstr::execute(emulation, &desc, regs, mem)?,
            _ => bmi::execute(emulation, &desc, regs, mem)?,
        };

        trace!(
            rip = regs.rip(),
            insn = emulation.mnemonic(),
            len = desc.len,
            "emulated"
        );
        Ok(result)
    }
}
