//! SPD context and control channel.
//!
//! [`Spd`] owns the selector database, the boundary and the packet hooks.
//! A single policy manager at a time holds the [`ControlChannel`] and
//! drives the SPD by writing command streams to it.
//!
//! # Example
//!
//! ```
//! use kernelspd::spd::{CommandBuilder, LoggingHooks, Spd, KERNEL_SPD_VERSION};
//!
//! let spd = Spd::new(LoggingHooks::new());
//! let mut channel = spd.open()?;
//!
//! let stream = CommandBuilder::new()
//!     .version_sync(KERNEL_SPD_VERSION)
//!     .activate("tcp:any")
//!     .build();
//! assert_eq!(channel.write(&stream)?, stream.len());
//! assert!(spd.is_active());
//!
//! channel.close();
//! assert!(!spd.is_active());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, trace, warn};

use super::boundary::BoundarySpec;
use super::command::{Command, CommandIter, KERNEL_SPD_VERSION, SpdAction, SpdId};
use super::config::SpdConfig;
use super::db::{EntrySummary, IpSelectorDb, SelectorEntry};
use super::error::{Error, Result, WriteError};
use super::hooks::PacketHooks;
use super::selector::Flow;
use super::validation::Validatable;

/// State guarded by the SPD lock.
#[derive(Debug, Default)]
struct Shared {
    db: IpSelectorDb,
    boundary: Option<Arc<BoundarySpec>>,
}

/// Result of a packet-path lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Id of the first matching entry.
    pub entry_id: u32,
    /// Its action.
    pub action: SpdAction,
    /// Its priority.
    pub priority: u32,
}

/// Snapshot of the SPD state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SpdStatus {
    pub initialised: bool,
    pub open: bool,
    pub active: bool,
    /// Installed boundary, if any.
    pub boundary: Option<String>,
    /// Entries in the inbound set.
    pub entries_in: usize,
    /// Entries in the outbound set.
    pub entries_out: usize,
}

/// The kernel security policy database.
pub struct Spd<H: PacketHooks> {
    config: SpdConfig,
    shared: RwLock<Shared>,
    hooks: Mutex<H>,
    initialised: AtomicBool,
    open: AtomicBool,
    active: AtomicBool,
}

impl<H: PacketHooks> Spd<H> {
    /// Create an SPD with the default limits.
    pub fn new(hooks: H) -> Self {
        let spd = Self {
            config: SpdConfig::default(),
            shared: RwLock::new(Shared::default()),
            hooks: Mutex::new(hooks),
            initialised: AtomicBool::new(true),
            open: AtomicBool::new(false),
            active: AtomicBool::new(false),
        };
        info!("kernel SPD initialised");
        spd
    }

    /// Create an SPD with explicit limits.
    pub fn with_config(hooks: H, config: SpdConfig) -> Result<Self> {
        let result = config.validate();
        for issue in result.warnings() {
            warn!(%issue, "SPD config");
        }
        result.into_result()?;
        let mut spd = Self::new(hooks);
        spd.config = config;
        Ok(spd)
    }

    pub fn config(&self) -> &SpdConfig {
        &self.config
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn read(&self) -> RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn hooks(&self) -> MutexGuard<'_, H> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the control channel.
    ///
    /// Only one channel may be open at a time.
    pub fn open(&self) -> Result<ControlChannel<'_, H>> {
        if !self.is_initialised() {
            return Err(Error::Uninitialised);
        }
        if self
            .open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("control channel already open");
            return Err(Error::AlreadyOpen);
        }
        info!("control channel opened");
        Ok(ControlChannel { spd: self })
    }

    /// Apply one decoded command.
    ///
    /// Only a [`ControlChannel`] feeds commands here.
    fn process_command(&self, command: &Command<'_>) -> Result<()> {
        match *command {
            Command::Activate { boundary } => self.activate(boundary),
            Command::Deactivate => {
                self.deactivate();
                Ok(())
            }
            Command::InsertEntry {
                spd_id,
                entry_id,
                action,
                priority,
                precedence,
                payload,
            } => self.insert_entry(spd_id, entry_id, action, priority, precedence, payload),
            Command::RemoveEntry { spd_id, entry_id } => self.remove_entry(spd_id, entry_id),
            Command::UpdateBoundary { boundary } => self.update_boundary(boundary),
            Command::VersionSync { payload } => version_sync(payload),
            Command::Unknown { command_id, .. } => {
                warn!(command_id, "unknown command id ignored");
                Ok(())
            }
        }
    }

    fn activate(&self, boundary: &[u8]) -> Result<()> {
        if self.is_active() {
            warn!("kernel SPD already active");
            return Err(Error::AlreadyActive);
        }

        self.install_boundary(boundary)?;

        if let Err(reason) = self.hooks().install() {
            warn!(%reason, "failed activating packet hooks");
            return Err(Error::HookActivation(reason));
        }

        self.active.store(true, Ordering::Release);
        info!("kernel SPD activated");
        Ok(())
    }

    fn deactivate(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.hooks().uninstall();
            info!("kernel SPD deactivated");
        } else {
            warn!("kernel SPD already inactive");
        }
    }

    fn insert_entry(
        &self,
        spd_id: u32,
        entry_id: u32,
        action: SpdAction,
        priority: u32,
        precedence: u32,
        payload: &[u8],
    ) -> Result<()> {
        let spd = SpdId::try_from(spd_id).inspect_err(|_| {
            warn!(spd_id, "invalid SPD id");
        })?;

        let entry = SelectorEntry::new(entry_id, action, priority, payload).inspect_err(|e| {
            warn!(entry_id, error = %e, "failed creating selector entry");
        })?;

        let replaced = self.write().db.entry_add(spd, entry, precedence);

        debug!(
            spd_id,
            entry_id,
            action = %action.name(),
            priority,
            precedence,
            "inserted entry"
        );
        if let Some(old) = replaced {
            debug!(spd_id, entry_id, old_priority = old.priority(), "replaced entry with same id");
        }
        Ok(())
    }

    fn remove_entry(&self, spd_id: u32, entry_id: u32) -> Result<()> {
        let spd = SpdId::try_from(spd_id).inspect_err(|_| {
            warn!(spd_id, "invalid SPD id");
        })?;

        let removed = self.write().db.entry_remove(spd, entry_id);

        match removed {
            Some(entry) => debug!(
                spd_id,
                entry_id,
                priority = entry.priority(),
                "removed entry"
            ),
            None => warn!(
                "{}",
                Error::EntryNotFound {
                    spd_id,
                    entry_id
                }
            ),
        }
        Ok(())
    }

    /// Replace the boundary of an active SPD.
    fn update_boundary(&self, payload: &[u8]) -> Result<()> {
        if !self.is_active() {
            warn!("kernel SPD is not active");
            return Err(Error::NotActive);
        }
        self.install_boundary(payload)
    }

    /// Validate a boundary payload and publish it.
    ///
    /// On failure the installed boundary is left as it was.
    fn install_boundary(&self, payload: &[u8]) -> Result<()> {
        let spec = BoundarySpec::from_payload(payload, self.config.get_boundary_length_max())
            .inspect_err(|e| warn!(error = %e, "rejected IPsec boundary"))?;
        let spec = Arc::new(spec);

        let old = self.write().boundary.replace(Arc::clone(&spec));

        info!(boundary = spec.as_str(), "IPsec boundary updated");
        drop(old);
        Ok(())
    }

    /// Current boundary, if one is installed.
    pub fn boundary(&self) -> Option<Arc<BoundarySpec>> {
        self.read().boundary.clone()
    }

    /// Check if the flow is inside the installed boundary.
    pub fn is_inside_boundary(&self, flow: &Flow) -> bool {
        self.read()
            .boundary
            .as_ref()
            .is_some_and(|spec| spec.covers(flow))
    }

    /// Find the first entry in the set matching the flow.
    pub fn classify(&self, spd_id: SpdId, flow: &Flow) -> Option<Verdict> {
        self.read().db.lookup(spd_id, flow).map(|entry| Verdict {
            entry_id: entry.id(),
            action: entry.action(),
            priority: entry.priority(),
        })
    }

    /// Entries of a set in traversal order.
    pub fn entries(&self, spd_id: SpdId) -> Vec<EntrySummary> {
        self.read().db.iter(spd_id).map(EntrySummary::from).collect()
    }

    /// Look up one entry.
    pub fn entry(&self, spd_id: SpdId, entry_id: u32) -> Option<EntrySummary> {
        self.read().db.get(spd_id, entry_id).map(EntrySummary::from)
    }

    pub fn status(&self) -> SpdStatus {
        let shared = self.read();
        SpdStatus {
            initialised: self.is_initialised(),
            open: self.is_open(),
            active: self.is_active(),
            boundary: shared.boundary.as_ref().map(|b| b.as_str().to_string()),
            entries_in: shared.db.len(SpdId::In),
            entries_out: shared.db.len(SpdId::Out),
        }
    }

    /// Remove every entry, one lock hold per entry.
    fn cleanup_selectors(&self) -> usize {
        let mut drained = 0;
        loop {
            let next = self.write().db.entry_remove_next();
            match next {
                Some(entry) => {
                    debug!(
                        spd_id = entry.spd_id().number(),
                        entry_id = entry.id(),
                        "removed entry"
                    );
                    drained += 1;
                }
                None => break,
            }
        }
        drained
    }

    fn release(&self) {
        self.hooks().uninstall();
        self.active.store(false, Ordering::Release);
        let drained = self.cleanup_selectors();
        self.open.store(false, Ordering::Release);
        info!(drained, "control channel closed");
    }

    /// Tear the SPD down.
    ///
    /// Removes the hooks, drains every entry and frees the boundary.
    /// Later calls only warn.
    pub fn uninit(&self) {
        if !self.initialised.swap(false, Ordering::AcqRel) {
            warn!("kernel SPD already uninitialised");
            return;
        }

        self.hooks().uninstall();
        self.active.store(false, Ordering::Release);
        let drained = self.cleanup_selectors();
        let old = self.write().boundary.take();
        drop(old);

        info!(drained, "kernel SPD uninitialised");
    }
}

impl<H: PacketHooks> Drop for Spd<H> {
    fn drop(&mut self) {
        if self.is_initialised() {
            self.uninit();
        }
    }
}

impl<H: PacketHooks> std::fmt::Debug for Spd<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spd")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

fn version_sync(payload: &[u8]) -> Result<()> {
    let bytes: [u8; 4] = payload.try_into().map_err(|_| {
        warn!(size = payload.len(), "invalid version size");
        Error::InvalidVersionSize {
            actual: payload.len(),
            expected: std::mem::size_of::<u32>(),
        }
    })?;

    let version = u32::from_ne_bytes(bytes);
    if version != KERNEL_SPD_VERSION {
        warn!(version, expected = KERNEL_SPD_VERSION, "incompatible version");
        return Err(Error::VersionMismatch {
            actual: version,
            expected: KERNEL_SPD_VERSION,
        });
    }

    debug!(version, "version in sync");
    Ok(())
}

/// The single open handle to the SPD.
///
/// Closing the channel, explicitly or by dropping it, removes the hooks
/// and drains every entry. The boundary stays installed.
#[derive(Debug)]
pub struct ControlChannel<'a, H: PacketHooks> {
    spd: &'a Spd<H>,
}

impl<'a, H: PacketHooks> ControlChannel<'a, H> {
    /// Process a buffer of commands in order.
    ///
    /// Returns the full length when every command applied. Processing
    /// stops at the first framing or command error; the error carries
    /// how many bytes were applied before it. Once the SPD has been
    /// uninitialised every write fails with [`Error::Uninitialised`].
    pub fn write(&mut self, buf: &[u8]) -> std::result::Result<usize, WriteError> {
        trace!(len = buf.len(), "control write");
        self.check_initialised(0)?;

        let mut iter = CommandIter::with_limit(buf, self.spd.config.get_command_bytecount_max());
        let mut consumed = 0;

        while let Some(item) = iter.next() {
            let (offset, command) = item.map_err(|e| {
                warn!(offset = consumed, error = %e, "malformed command");
                WriteError::new(consumed, e)
            })?;
            self.check_initialised(consumed)?;

            let result = self.spd.process_command(&command);
            debug!(
                command = command.name(),
                command_id = command.command_id(),
                offset,
                ok = result.is_ok(),
                "processed command"
            );
            result.map_err(|e| {
                warn!(command = command.name(), error = %e, "command failed");
                WriteError::new(consumed, e)
            })?;

            consumed = iter.offset();
        }

        trace!(consumed, "control write done");
        Ok(consumed)
    }

    fn check_initialised(&self, consumed: usize) -> std::result::Result<(), WriteError> {
        if self.spd.is_initialised() {
            return Ok(());
        }
        warn!(offset = consumed, "control write after uninit");
        Err(WriteError::new(consumed, Error::Uninitialised))
    }

    /// The SPD behind this channel.
    pub fn spd(&self) -> &'a Spd<H> {
        self.spd
    }

    /// Close the channel.
    pub fn close(self) {}
}

impl<H: PacketHooks> Drop for ControlChannel<'_, H> {
    fn drop(&mut self) {
        self.spd.release();
    }
}
