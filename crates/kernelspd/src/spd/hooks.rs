//! Packet hook binding.
//!
//! The hooks are what consult the SPD on the packet path. The SPD only
//! switches them on and off; how they attach to the network stack is up
//! to the implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Installs and removes the packet-path hooks.
pub trait PacketHooks: Send {
    /// Install the hooks.
    ///
    /// On error the hooks must be left uninstalled.
    fn install(&mut self) -> Result<(), String>;

    /// Remove the hooks. Must be harmless when none are installed.
    fn uninstall(&mut self);
}

/// Hooks that only record and log their state.
#[derive(Debug, Default)]
pub struct LoggingHooks {
    installed: AtomicBool,
}

impl LoggingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the hooks are currently installed.
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Relaxed)
    }
}

impl PacketHooks for LoggingHooks {
    fn install(&mut self) -> Result<(), String> {
        self.installed.store(true, Ordering::Relaxed);
        info!("packet hooks installed");
        Ok(())
    }

    fn uninstall(&mut self) {
        if self.installed.swap(false, Ordering::Relaxed) {
            info!("packet hooks removed");
        }
    }
}
