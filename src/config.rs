use opemu_core::EmulatorConfig;

use crate::hook::HookDescriptor;

/// Size of the `call __fentry__` patched into every traced function's prologue.
pub const MCOUNT_INSN_SIZE: u64 = 5;

/// The host routine every #UD from user mode passes through.
pub const ERROR_TRAP_SYMBOL: &str = "do_error_trap";

/// ABI prefix x86-64 kernels put on pt_regs-style entry points.
pub const X64_SYMBOL_PREFIX: &str = "__x64_";

/// One function to redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    pub target: String,
    /// Entry address of the replacement routine.
    pub replacement: u64,
}

/// Everything the module needs at load time. Built once by the host glue and
/// owned by the loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub hooks: Vec<HookSpec>,
    /// Prefixes tried, in order, when a symbol is not found under its plain name.
    pub symbol_prefixes: Vec<String>,
    /// Record the original entry past the fentry call site, so calling the
    /// original does not re-enter the redirection.
    pub skip_fentry: bool,
    pub emulator: EmulatorConfig,
}

impl ModuleConfig {
    /// The standard setup: one hook on the error-trap routine.
    pub fn error_trap(replacement: u64) -> Self {
        Self {
            hooks: vec![HookSpec {
                target: ERROR_TRAP_SYMBOL.to_owned(),
                replacement,
            }],
            symbol_prefixes: vec![X64_SYMBOL_PREFIX.to_owned()],
            skip_fentry: false,
            emulator: EmulatorConfig::default(),
        }
    }

    pub fn descriptors(&self) -> Vec<HookDescriptor> {
        self.hooks
            .iter()
            .map(|spec| HookDescriptor::new(spec.target.clone(), spec.replacement))
            .collect()
    }
}
