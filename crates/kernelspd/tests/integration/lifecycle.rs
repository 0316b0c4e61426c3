//! Integration tests for activation, channel close and teardown.

use kernelspd::Error;
use kernelspd::spd::{CommandBuilder, Spd, SpdId};

use crate::common::{
    HookEvent, RecordingHooks, activation, entry_ids, init_tracing, insert_any, recording_spd,
};

#[test]
fn test_activate_twice() {
    let (spd, probe) = recording_spd();
    let mut channel = spd.open().unwrap();

    channel.write(&activation("tcp:any").build()).unwrap();
    assert!(spd.is_active());
    assert!(probe.is_installed());

    let again = CommandBuilder::new().activate("udp:any").build();
    let err = channel.write(&again).unwrap_err();
    assert!(matches!(err.error, Error::AlreadyActive));
    assert!(err.error.is_state_conflict());
    assert_eq!(err.status(), -(libc::EFAULT as isize));

    // State is unchanged.
    assert!(spd.is_active());
    assert_eq!(spd.boundary().unwrap().as_str(), "tcp:any");
    assert_eq!(probe.events(), vec![HookEvent::Install]);
}

#[test]
fn test_deactivate_when_inactive() {
    let (spd, probe) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = CommandBuilder::new().deactivate().build();
    assert_eq!(channel.write(&stream).unwrap(), stream.len());
    assert!(probe.events().is_empty());
}

#[test]
fn test_deactivate_then_reactivate() {
    let (spd, probe) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = activation("tcp:any")
        .deactivate()
        .activate("esp:any")
        .build();
    channel.write(&stream).unwrap();

    assert!(spd.is_active());
    assert_eq!(spd.boundary().unwrap().as_str(), "esp:any");
    assert_eq!(
        probe.events(),
        vec![HookEvent::Install, HookEvent::Uninstall, HookEvent::Install]
    );
}

#[test]
fn test_deactivate_keeps_entries_and_boundary() {
    let (spd, probe) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = insert_any(activation("tcp:any"), SpdId::In, 1, 1).build();
    channel.write(&stream).unwrap();
    channel
        .write(&CommandBuilder::new().deactivate().build())
        .unwrap();

    assert!(!spd.is_active());
    assert!(!probe.is_installed());
    assert_eq!(entry_ids(&spd, SpdId::In), vec![1]);
    assert!(spd.boundary().is_some());
}

#[test]
fn test_close_releases_everything() {
    let (spd, probe) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = activation("tcp:any");
    let stream = insert_any(stream, SpdId::In, 1, 1);
    let stream = insert_any(stream, SpdId::Out, 2, 1);
    let stream = insert_any(stream, SpdId::Out, 3, 2).build();
    channel.write(&stream).unwrap();
    assert_eq!(spd.status().entries_out, 2);

    channel.close();

    let status = spd.status();
    assert!(!status.open);
    assert!(!status.active);
    assert_eq!((status.entries_in, status.entries_out), (0, 0));
    assert!(!probe.is_installed());
    assert_eq!(probe.events(), vec![HookEvent::Install, HookEvent::Uninstall]);
    assert_eq!(status.boundary.as_deref(), Some("tcp:any"));

    let channel = spd.open().unwrap();
    assert!(spd.entries(SpdId::In).is_empty());
    assert!(spd.entries(SpdId::Out).is_empty());
    assert!(!spd.is_active());
    drop(channel);
}

#[test]
fn test_close_uninstalls_even_when_inactive() {
    let (spd, probe) = recording_spd();
    let channel = spd.open().unwrap();
    drop(channel);

    assert_eq!(probe.events(), vec![HookEvent::Uninstall]);
    assert!(!spd.is_open());
}

#[test]
fn test_hook_failure_leaves_boundary_installed() {
    let (spd, probe) = recording_spd();
    probe.fail_install(true);
    let mut channel = spd.open().unwrap();

    let err = channel.write(&activation("tcp:any").build()).unwrap_err();
    assert!(matches!(err.error, Error::HookActivation(_)));
    assert!(!spd.is_active());
    assert_eq!(spd.boundary().unwrap().as_str(), "tcp:any");

    // A later activation succeeds once the hooks can be installed.
    probe.fail_install(false);
    channel
        .write(&CommandBuilder::new().activate("udp:any").build())
        .unwrap();
    assert!(spd.is_active());
    assert_eq!(spd.boundary().unwrap().as_str(), "udp:any");
}

#[test]
fn test_single_opener() {
    let (spd, _) = recording_spd();
    let channel = spd.open().unwrap();
    assert!(spd.is_open());

    let err = spd.open().unwrap_err();
    assert!(matches!(err, Error::AlreadyOpen));
    assert!(err.is_state_conflict());

    channel.close();
    assert!(spd.open().is_ok());
}

#[test]
fn test_uninit_tears_down() {
    let (spd, probe) = recording_spd();
    {
        let mut channel = spd.open().unwrap();
        let stream = insert_any(activation("tcp:any"), SpdId::Out, 1, 1).build();
        channel.write(&stream).unwrap();
    }

    spd.uninit();
    assert!(!spd.is_initialised());
    assert!(spd.boundary().is_none());
    assert!(!probe.is_installed());
    assert!(matches!(spd.open(), Err(Error::Uninitialised)));

    let events = probe.events().len();
    spd.uninit();
    assert_eq!(probe.events().len(), events);
}

#[test]
fn test_write_after_uninit_fails() {
    let (spd, probe) = recording_spd();
    let mut channel = spd.open().unwrap();

    spd.uninit();

    let stream = insert_any(CommandBuilder::new().activate("tcp:any"), SpdId::In, 1, 1).build();
    let err = channel.write(&stream).unwrap_err();
    assert!(matches!(err.error, Error::Uninitialised));
    assert_eq!(err.consumed, 0);
    assert!(matches!(
        channel.write(&[]).unwrap_err().error,
        Error::Uninitialised
    ));

    assert!(!spd.is_active());
    assert!(spd.boundary().is_none());
    assert_eq!(spd.status().entries_in, 0);
    assert!(!probe.events().contains(&HookEvent::Install));

    channel.close();
    assert!(!spd.is_initialised());
    assert!(!probe.is_installed());
}

#[test]
fn test_drop_uninitialises() {
    init_tracing();
    let (hooks, probe) = RecordingHooks::new();
    let spd = Spd::new(hooks);
    {
        let mut channel = spd.open().unwrap();
        channel.write(&activation("tcp:any").build()).unwrap();
        // Keep the hooks installed past the channel.
        std::mem::forget(channel);
    }
    assert!(probe.is_installed());

    drop(spd);
    assert!(!probe.is_installed());
    assert_eq!(probe.events().last(), Some(&HookEvent::Uninstall));
}
