//! Loadable-module glue around the `opemu-core` trap emulator: symbol
//! resolution, function redirection with all-or-nothing install, the
//! error-trap replacement, and the load/unload lifecycle.
//!
//! The host-specific pieces (patching a function entry, looking up a kernel
//! symbol, reading user memory) come in through traits, so the whole
//! lifecycle runs unchanged against in-memory fakes.

pub mod config;
pub mod hook;
pub mod module;
pub mod symbols;
pub mod trap_hook;

pub use config::{HookSpec, ModuleConfig, ERROR_TRAP_SYMBOL, MCOUNT_INSN_SIZE, X64_SYMBOL_PREFIX};
pub use hook::{
    FunctionInterceptor, HookDescriptor, HookError, RedirectBackend, RedirectingInterceptor,
};
pub use module::{LoadError, OpemuModule};
pub use opemu_core;
pub use symbols::{resolve_symbol, SymbolResolver, SymbolTable};
pub use trap_hook::{ErrorTrapHook, OriginalHandler, TrapFrame};
