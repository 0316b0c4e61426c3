//! Common test utilities for integration tests.
//!
//! Provides `RecordingHooks`, packet hooks whose install/uninstall calls
//! can be inspected and made to fail, plus selector payload helpers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use kernelspd::spd::{
    CommandBuilder, IpSelector, KERNEL_SPD_VERSION, PacketHooks, ProtocolRange, SelectorGroup,
    Spd, SpdAction, SpdId,
};

/// A hook call seen by `RecordingHooks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Install,
    Uninstall,
}

/// Shared view of a `RecordingHooks` instance.
#[derive(Debug, Clone, Default)]
pub struct HookProbe {
    events: Arc<Mutex<Vec<HookEvent>>>,
    installed: Arc<AtomicBool>,
    fail_install: Arc<AtomicBool>,
}

impl HookProbe {
    /// Calls seen so far.
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Make subsequent installs fail.
    pub fn fail_install(&self, fail: bool) {
        self.fail_install.store(fail, Ordering::SeqCst);
    }
}

/// Packet hooks that record every call.
#[derive(Debug)]
pub struct RecordingHooks {
    probe: HookProbe,
}

impl RecordingHooks {
    pub fn new() -> (Self, HookProbe) {
        let probe = HookProbe::default();
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl PacketHooks for RecordingHooks {
    fn install(&mut self) -> Result<(), String> {
        self.probe.events.lock().unwrap().push(HookEvent::Install);
        if self.probe.fail_install.load(Ordering::SeqCst) {
            return Err("hook registration refused".to_string());
        }
        self.probe.installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn uninstall(&mut self) {
        self.probe.events.lock().unwrap().push(HookEvent::Uninstall);
        self.probe.installed.store(false, Ordering::SeqCst);
    }
}

/// Route library logs to the test harness once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::WARN.into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// An SPD with recording hooks.
pub fn recording_spd() -> (Spd<RecordingHooks>, HookProbe) {
    init_tracing();
    let (hooks, probe) = RecordingHooks::new();
    (Spd::new(hooks), probe)
}

/// Payload of one selector matching every flow.
pub fn any_payload() -> Vec<u8> {
    SelectorGroup::new()
        .selector(IpSelector::new())
        .to_bytes()
        .unwrap()
}

/// Payload of one selector matching a single IP protocol.
pub fn protocol_payload(protocol: u8) -> Vec<u8> {
    SelectorGroup::new()
        .selector(IpSelector::new().protocol(ProtocolRange::single(protocol)))
        .to_bytes()
        .unwrap()
}

/// Stream that syncs the version and activates with `boundary`.
pub fn activation(boundary: &str) -> CommandBuilder {
    CommandBuilder::new()
        .version_sync(KERNEL_SPD_VERSION)
        .activate(boundary)
}

/// Append an INSERT_ENTRY matching every flow.
pub fn insert_any(
    builder: CommandBuilder,
    spd_id: SpdId,
    entry_id: u32,
    priority: u32,
) -> CommandBuilder {
    builder.insert_entry(
        spd_id,
        entry_id,
        SpdAction::Bypass,
        priority,
        0,
        &any_payload(),
    )
}

/// Entry ids of a set in traversal order.
pub fn entry_ids<H: PacketHooks>(spd: &Spd<H>, spd_id: SpdId) -> Vec<u32> {
    spd.entries(spd_id).iter().map(|e| e.id).collect()
}
