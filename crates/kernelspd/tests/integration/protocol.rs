//! Integration tests for command framing and dispatch.

use kernelspd::Error;
use kernelspd::spd::{
    COMMAND_HDRLEN, CommandBuilder, CommandId, KERNEL_SPD_VERSION, KernelSpdCommand, Spd,
    SpdAction, SpdConfig, SpdId,
};

use crate::common::{
    RecordingHooks, activation, any_payload, entry_ids, init_tracing, insert_any, recording_spd,
};

#[test]
fn test_full_write_returns_length() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = insert_any(activation("tcp:any"), SpdId::In, 1, 1).build();
    assert_eq!(channel.write(&stream).unwrap(), stream.len());
    assert!(spd.is_active());
    assert_eq!(entry_ids(&spd, SpdId::In), vec![1]);
}

#[test]
fn test_failure_stops_the_write() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    // A inserts, B is UPDATE while inactive, C would insert.
    let a = insert_any(CommandBuilder::new(), SpdId::Out, 1, 1);
    let a_len = a.len();
    let stream = insert_any(a.update_boundary("udp:any"), SpdId::Out, 2, 1).build();

    let err = channel.write(&stream).unwrap_err();
    assert!(matches!(err.error, Error::NotActive));
    assert_eq!(err.consumed, a_len);
    assert_eq!(entry_ids(&spd, SpdId::Out), vec![1]);
    assert!(spd.boundary().is_none());
}

#[test]
fn test_truncated_tail_applies_nothing_from_tail() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let head = insert_any(CommandBuilder::new(), SpdId::In, 1, 1).build();
    let full = insert_any(CommandBuilder::new(), SpdId::In, 1, 1);
    let full = insert_any(full, SpdId::In, 2, 1).build();

    let truncated = &full[..full.len() - 3];
    let err = channel.write(truncated).unwrap_err();
    assert!(err.error.is_framing());
    assert!(matches!(err.error, Error::Truncated { .. }));
    assert_eq!(err.status(), -(libc::EINVAL as isize));
    assert_eq!(err.consumed, head.len());
    assert_eq!(entry_ids(&spd, SpdId::In), vec![1]);
}

#[test]
fn test_short_buffer() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let mut stream = CommandBuilder::new().deactivate().build();
    stream.extend_from_slice(&[0u8; COMMAND_HDRLEN - 1]);

    let err = channel.write(&stream).unwrap_err();
    assert!(matches!(
        err.error,
        Error::ShortBuffer {
            remaining: 27,
            header: 28
        }
    ));
    assert_eq!(err.consumed, COMMAND_HDRLEN);
    assert_eq!(err.status(), -(libc::EFAULT as isize));
}

#[test]
fn test_bytecount_smaller_than_header() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let hdr = KernelSpdCommand {
        bytecount: 4,
        ..KernelSpdCommand::new(CommandId::DEACTIVATE)
    };
    let err = channel.write(hdr.as_bytes()).unwrap_err();
    assert!(matches!(err.error, Error::BytecountTooSmall { bytecount: 4, .. }));
    assert_eq!(err.consumed, 0);
}

#[test]
fn test_bytecount_ceiling_from_config() {
    init_tracing();
    let (hooks, _) = RecordingHooks::new();
    let spd = Spd::with_config(hooks, SpdConfig::new().command_bytecount_max(64)).unwrap();
    let mut channel = spd.open().unwrap();

    let small = CommandBuilder::new().activate("tcp:any").build();
    channel.write(&small).unwrap();

    let large = CommandBuilder::new()
        .insert_entry(SpdId::Out, 1, SpdAction::Drop, 1, 0, &[0u8; 64])
        .build();
    let err = channel.write(&large).unwrap_err();
    assert!(matches!(err.error, Error::BytecountTooLarge { max: 64, .. }));
    assert!(spd.entries(SpdId::Out).is_empty());
}

#[test]
fn test_version_sync_size_mismatch() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();
    let before = spd.status();

    let stream = CommandBuilder::new()
        .command(KernelSpdCommand::new(CommandId::VERSION_SYNC), &[3, 0, 0])
        .build();
    let err = channel.write(&stream).unwrap_err();

    assert!(matches!(
        err.error,
        Error::InvalidVersionSize {
            actual: 3,
            expected: 4
        }
    ));
    assert!(err.error.is_version_mismatch());
    assert_eq!(err.status(), -(libc::EFAULT as isize));
    assert_eq!(spd.status(), before);
}

#[test]
fn test_version_sync_value_mismatch() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = CommandBuilder::new()
        .version_sync(KERNEL_SPD_VERSION + 1)
        .activate("tcp:any")
        .build();
    let err = channel.write(&stream).unwrap_err();

    assert!(matches!(err.error, Error::VersionMismatch { actual: 4, expected: 3 }));
    assert_eq!(err.status(), -(libc::EINVAL as isize));
    assert!(!spd.is_active());
}

#[test]
fn test_unknown_command_is_skipped() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = CommandBuilder::new()
        .command(KernelSpdCommand::new(250), &[1, 2, 3, 4, 5])
        .insert_entry(SpdId::In, 3, SpdAction::Bypass, 1, 0, &any_payload())
        .build();
    assert_eq!(channel.write(&stream).unwrap(), stream.len());
    assert_eq!(entry_ids(&spd, SpdId::In), vec![3]);
}

#[test]
fn test_invalid_spd_id() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let remove = KernelSpdCommand {
        spd_id: 9,
        entry_id: 1,
        ..KernelSpdCommand::new(CommandId::REMOVE_ENTRY)
    };
    let stream = CommandBuilder::new().command(remove, &[]).build();
    let err = channel.write(&stream).unwrap_err();
    assert!(matches!(err.error, Error::InvalidSpdId(9)));
    assert_eq!(err.status(), -(libc::EFAULT as isize));
}

#[test]
fn test_unknown_action_is_stored_verbatim() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = CommandBuilder::new()
        .insert_entry(SpdId::Out, 1, SpdAction::Unknown(42), 1, 0, &any_payload())
        .build();
    channel.write(&stream).unwrap();
    assert_eq!(spd.entry(SpdId::Out, 1).unwrap().action, SpdAction::Unknown(42));
}
