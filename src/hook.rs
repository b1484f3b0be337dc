//! Function redirection: the all-or-nothing install/remove protocol on top of
//! a host-specific redirection backend.

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ModuleConfig, MCOUNT_INSN_SIZE};
use crate::symbols::{resolve_symbol, SymbolResolver};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("unresolved symbol: {name}")]
    Unresolved { name: String },
    #[error("failed to redirect {name}: error {code}")]
    Attach { name: String, code: i32 },
    #[error("failed to restore {name}: error {code}")]
    Detach { name: String, code: i32 },
}

/// A single redirection. The caller fills in `name` and `replacement`; the
/// interceptor fills in the rest while the hook is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor {
    pub name: String,
    pub replacement: u64,
    /// Resolved entry address of the target. `Some` exactly while installed.
    pub address: Option<u64>,
    /// Where the replacement should call to reach the original routine.
    pub original: Option<u64>,
}

impl HookDescriptor {
    pub fn new(name: impl Into<String>, replacement: u64) -> Self {
        Self {
            name: name.into(),
            replacement,
            address: None,
            original: None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.address.is_some()
    }
}

/// Install/remove contract for a set of hooks.
pub trait FunctionInterceptor {
    /// Install every hook, or none: on failure all hooks installed by this
    /// call have been removed again before the error is returned.
    fn install(&mut self, hooks: &mut [HookDescriptor]) -> Result<(), HookError>;

    /// Remove the installed hooks. Hooks that are not installed are skipped,
    /// and failures are logged rather than returned.
    fn remove(&mut self, hooks: &mut [HookDescriptor]);
}

/// The host mechanism that actually patches a function's entry.
pub trait RedirectBackend {
    /// Route calls to `address` into `replacement`. Errors are host error codes.
    fn attach(&mut self, address: u64, replacement: u64) -> Result<(), i32>;
    fn detach(&mut self, address: u64) -> Result<(), i32>;
}

/// [`FunctionInterceptor`] that resolves each target by name and redirects it
/// through a [`RedirectBackend`].
#[derive(Debug)]
pub struct RedirectingInterceptor<B, R> {
    backend: B,
    resolver: R,
    prefixes: Vec<String>,
    skip_fentry: bool,
}

impl<B: RedirectBackend, R: SymbolResolver> RedirectingInterceptor<B, R> {
    pub fn new(backend: B, resolver: R, prefixes: Vec<String>, skip_fentry: bool) -> Self {
        Self {
            backend,
            resolver,
            prefixes,
            skip_fentry,
        }
    }

    pub fn from_config(config: &ModuleConfig, backend: B, resolver: R) -> Self {
        Self::new(
            backend,
            resolver,
            config.symbol_prefixes.clone(),
            config.skip_fentry,
        )
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn install_one(&mut self, hook: &mut HookDescriptor) -> Result<(), HookError> {
        let address = resolve_symbol(&self.resolver, &hook.name, &self.prefixes).ok_or_else(
            || {
                debug!(name = %hook.name, "unresolved symbol");
                HookError::Unresolved {
                    name: hook.name.clone(),
                }
            },
        )?;

        self.backend
            .attach(address, hook.replacement)
            .map_err(|code| {
                debug!(name = %hook.name, code, "attach failed");
                HookError::Attach {
                    name: hook.name.clone(),
                    code,
                }
            })?;

        hook.address = Some(address);
        hook.original = Some(if self.skip_fentry {
            address + MCOUNT_INSN_SIZE
        } else {
            address
        });
        Ok(())
    }

    fn remove_one(&mut self, hook: &mut HookDescriptor) {
        let Some(address) = hook.address.take() else {
            return;
        };
        hook.original = None;
        if let Err(code) = self.backend.detach(address) {
            let err = HookError::Detach {
                name: hook.name.clone(),
                code,
            };
            warn!("{err}");
        }
    }
}

impl<B: RedirectBackend, R: SymbolResolver> FunctionInterceptor for RedirectingInterceptor<B, R> {
    fn install(&mut self, hooks: &mut [HookDescriptor]) -> Result<(), HookError> {
        for i in 0..hooks.len() {
            if let Err(err) = self.install_one(&mut hooks[i]) {
                for hook in hooks[..i].iter_mut().rev() {
                    self.remove_one(hook);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn remove(&mut self, hooks: &mut [HookDescriptor]) {
        for hook in hooks.iter_mut() {
            self.remove_one(hook);
        }
    }
}
