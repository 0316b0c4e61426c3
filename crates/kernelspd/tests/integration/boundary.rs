//! Integration tests for boundary validation and hot-swap.

use std::sync::atomic::{AtomicBool, Ordering};

use kernelspd::Error;
use kernelspd::spd::{CommandBuilder, Flow, SpdConfig, Spd};

use crate::common::{RecordingHooks, activation, init_tracing, recording_spd};

#[test]
fn test_activate_installs_boundary() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    channel.write(&activation("tcp:any").build()).unwrap();
    assert_eq!(spd.boundary().unwrap().as_str(), "tcp:any");
    assert_eq!(spd.status().boundary.as_deref(), Some("tcp:any"));
}

#[test]
fn test_empty_update_keeps_previous_boundary() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();
    channel.write(&activation("tcp:any").build()).unwrap();

    let stream = CommandBuilder::new().update_boundary("").build();
    let err = channel.write(&stream).unwrap_err();

    assert!(matches!(err.error, Error::InvalidBoundary(_)));
    assert_eq!(spd.boundary().unwrap().as_str(), "tcp:any");
    assert!(spd.is_active());
}

#[test]
fn test_invalid_update_keeps_previous_boundary() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();
    channel.write(&activation("any:10.0.0.0/8").build()).unwrap();

    for bad in ["tcp", "gre:any", "!tcp:any", "tcp:any,,udp:any", "tcp:300.1.1.1"] {
        let stream = CommandBuilder::new().update_boundary(bad).build();
        assert!(channel.write(&stream).is_err(), "accepted {:?}", bad);
    }
    assert_eq!(spd.boundary().unwrap().as_str(), "any:10.0.0.0/8");
}

#[test]
fn test_update_replaces_boundary() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();
    channel.write(&activation("tcp:any").build()).unwrap();

    let old = spd.boundary().unwrap();
    let stream = CommandBuilder::new()
        .update_boundary("any:10.0.0.0/8,!udp:10.0.0.53")
        .build();
    channel.write(&stream).unwrap();

    // A snapshot taken before the swap stays intact.
    assert_eq!(old.as_str(), "tcp:any");

    let local = "192.168.1.1".parse().unwrap();
    assert!(spd.is_inside_boundary(&Flow::new(local, "10.9.9.9".parse().unwrap(), 17)));
    assert!(!spd.is_inside_boundary(&Flow::new(local, "10.0.0.53".parse().unwrap(), 17)));
    assert!(!spd.is_inside_boundary(&Flow::new(local, "8.8.8.8".parse().unwrap(), 6)));
}

#[test]
fn test_boundary_length_limit() {
    init_tracing();
    let (hooks, _) = RecordingHooks::new();
    let spd = Spd::with_config(hooks, SpdConfig::new().boundary_length_max(16)).unwrap();
    let mut channel = spd.open().unwrap();

    let long = "any:10.0.0.0/8,any:192.168.0.0/16";
    let err = channel
        .write(&CommandBuilder::new().activate(long).build())
        .unwrap_err();
    assert!(matches!(err.error, Error::InvalidBoundary(_)));
    assert!(!spd.is_active());
    assert!(spd.boundary().is_none());
}

#[test]
fn test_readers_see_whole_boundaries() {
    let (spd, _) = recording_spd();
    let specs = ["tcp:any", "udp:10.0.0.0/8", "esp:any,!esp:192.0.2.1", "any:dev=wlan0"];
    let done = AtomicBool::new(false);

    let mut channel = spd.open().unwrap();
    channel.write(&activation(specs[0]).build()).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    let current = spd.boundary().unwrap();
                    assert!(specs.contains(&current.as_str()));
                    assert!(!current.clauses().is_empty());
                }
            });
        }

        for round in 0..500 {
            let spec = specs[round % specs.len()];
            let stream = CommandBuilder::new().update_boundary(spec).build();
            channel.write(&stream).unwrap();
        }
        done.store(true, Ordering::Relaxed);
    });
}
