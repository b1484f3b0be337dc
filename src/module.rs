use thiserror::Error;
use tracing::info;

use crate::config::ModuleConfig;
use crate::hook::{FunctionInterceptor, HookDescriptor, HookError};
use crate::trap_hook::ErrorTrapHook;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("installing hooks failed: {0}")]
    Hook(#[from] HookError),
}

/// A loaded instance: the installed hooks plus the trap handler they route to.
/// Dropping it removes the hooks.
#[derive(Debug)]
pub struct OpemuModule<I: FunctionInterceptor> {
    interceptor: I,
    hooks: Vec<HookDescriptor>,
    trap_hook: ErrorTrapHook,
}

impl<I: FunctionInterceptor> OpemuModule<I> {
    /// Install every configured hook. On error nothing is left installed.
    pub fn load(config: &ModuleConfig, mut interceptor: I) -> Result<Self, LoadError> {
        let mut hooks = config.descriptors();
        interceptor.install(&mut hooks)?;
        info!("module loaded");
        Ok(Self {
            interceptor,
            hooks,
            trap_hook: ErrorTrapHook::new(config.emulator),
        })
    }

    pub fn hooks(&self) -> &[HookDescriptor] {
        &self.hooks
    }

    /// Address to call to reach the original routine behind hook `name`.
    pub fn original(&self, name: &str) -> Option<u64> {
        self.hooks
            .iter()
            .find(|hook| hook.name == name)
            .and_then(|hook| hook.original)
    }

    pub fn trap_hook(&self) -> &ErrorTrapHook {
        &self.trap_hook
    }

    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }

    pub fn unload(self) {
        drop(self);
    }
}

impl<I: FunctionInterceptor> Drop for OpemuModule<I> {
    fn drop(&mut self) {
        self.interceptor.remove(&mut self.hooks);
        info!("module unloaded");
    }
}
