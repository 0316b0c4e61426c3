//! Integration tests for the selector database as seen through the channel.

use kernelspd::spd::{
    AddressRange, CommandBuilder, Flow, IpSelector, PortRange, ProtocolRange, SelectorGroup,
    SpdAction, SpdId,
};

use crate::common::{any_payload, entry_ids, insert_any, protocol_payload, recording_spd};

#[test]
fn test_higher_priority_traverses_first() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = CommandBuilder::new();
    let stream = insert_any(stream, SpdId::Out, 5, 10);
    let stream = insert_any(stream, SpdId::Out, 6, 20).build();
    channel.write(&stream).unwrap();

    assert_eq!(entry_ids(&spd, SpdId::Out), vec![6, 5]);
    assert!(entry_ids(&spd, SpdId::In).is_empty());
}

#[test]
fn test_remove_then_remove_again() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = insert_any(CommandBuilder::new(), SpdId::Out, 5, 10);
    let stream = insert_any(stream, SpdId::Out, 6, 20).build();
    channel.write(&stream).unwrap();

    let remove = CommandBuilder::new().remove_entry(SpdId::Out, 5).build();
    assert_eq!(channel.write(&remove).unwrap(), remove.len());
    assert_eq!(entry_ids(&spd, SpdId::Out), vec![6]);

    // A missing entry is logged, not reported.
    assert_eq!(channel.write(&remove).unwrap(), remove.len());
    assert_eq!(entry_ids(&spd, SpdId::Out), vec![6]);
}

#[test]
fn test_ordering_with_precedence_and_ties() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let payload = any_payload();
    let stream = CommandBuilder::new()
        .insert_entry(SpdId::In, 1, SpdAction::Drop, 50, 0, &payload)
        .insert_entry(SpdId::In, 2, SpdAction::Drop, 50, 9, &payload)
        .insert_entry(SpdId::In, 3, SpdAction::Drop, 70, 0, &payload)
        .insert_entry(SpdId::In, 4, SpdAction::Drop, 50, 0, &payload)
        .insert_entry(SpdId::In, 5, SpdAction::Drop, 10, 99, &payload)
        .insert_entry(SpdId::In, 6, SpdAction::Drop, 50, 9, &payload)
        .build();
    channel.write(&stream).unwrap();

    assert_eq!(entry_ids(&spd, SpdId::In), vec![3, 2, 6, 1, 4, 5]);

    let priorities: Vec<u32> = spd.entries(SpdId::In).iter().map(|e| e.priority).collect();
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_duplicate_id_overwrites() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let stream = CommandBuilder::new()
        .insert_entry(SpdId::Out, 7, SpdAction::Drop, 10, 0, &any_payload())
        .insert_entry(SpdId::Out, 8, SpdAction::Drop, 15, 0, &any_payload())
        .insert_entry(SpdId::Out, 7, SpdAction::Protect, 20, 0, &protocol_payload(6))
        .build();
    channel.write(&stream).unwrap();

    assert_eq!(entry_ids(&spd, SpdId::Out), vec![7, 8]);
    let entry = spd.entry(SpdId::Out, 7).unwrap();
    assert_eq!(entry.action, SpdAction::Protect);
    assert_eq!(entry.priority, 20);
    assert_eq!(spd.status().entries_out, 2);
}

#[test]
fn test_malformed_selector_leaves_set_unchanged() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let good = insert_any(CommandBuilder::new(), SpdId::In, 1, 5).build();
    channel.write(&good).unwrap();
    let before = spd.entries(SpdId::In);

    let mut bad_payload = protocol_payload(17);
    bad_payload.truncate(bad_payload.len() - 2);
    let bad = CommandBuilder::new()
        .insert_entry(SpdId::In, 2, SpdAction::Drop, 99, 0, &bad_payload)
        .build();
    let err = channel.write(&bad).unwrap_err();

    assert_eq!(err.consumed, 0);
    assert_eq!(err.status(), -(libc::EFAULT as isize));
    assert_eq!(spd.entries(SpdId::In), before);
}

#[test]
fn test_classify_walks_in_priority_order() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let web = SelectorGroup::new()
        .selector(
            IpSelector::new()
                .remote_address("198.51.100.0/24".parse().unwrap())
                .protocol(ProtocolRange::single(6))
                .remote_port(PortRange::single(443)),
        )
        .to_bytes()
        .unwrap();
    let lan = SelectorGroup::new()
        .selector(IpSelector::new().remote_address(AddressRange::from_prefix(
            "198.51.100.0".parse().unwrap(),
            16,
        )))
        .selector(IpSelector::new().remote_address(AddressRange::any_v6()))
        .to_bytes()
        .unwrap();

    let stream = CommandBuilder::new()
        .insert_entry(SpdId::Out, 1, SpdAction::Bypass, 10, 0, &lan)
        .insert_entry(SpdId::Out, 2, SpdAction::Protect, 20, 0, &web)
        .insert_entry(SpdId::Out, 3, SpdAction::Drop, 0, 0, &any_payload())
        .build();
    channel.write(&stream).unwrap();

    let local = "192.0.2.10".parse().unwrap();
    let https = Flow::new(local, "198.51.100.7".parse().unwrap(), 6).ports(50000, 443);
    let dns = Flow::new(local, "198.51.7.1".parse().unwrap(), 17).ports(50000, 53);
    let v6 = Flow::new("2001:db8::1".parse().unwrap(), "2001:db8::2".parse().unwrap(), 6);
    let other = Flow::new(local, "203.0.113.1".parse().unwrap(), 6);

    assert_eq!(spd.classify(SpdId::Out, &https).unwrap().entry_id, 2);
    assert_eq!(spd.classify(SpdId::Out, &dns).unwrap().entry_id, 1);
    assert_eq!(spd.classify(SpdId::Out, &v6).unwrap().action, SpdAction::Bypass);
    let verdict = spd.classify(SpdId::Out, &other).unwrap();
    assert_eq!((verdict.entry_id, verdict.priority), (3, 0));
    assert!(spd.classify(SpdId::In, &other).is_none());
}

#[test]
fn test_empty_group_matches_nothing() {
    let (spd, _) = recording_spd();
    let mut channel = spd.open().unwrap();

    let empty = SelectorGroup::new().to_bytes().unwrap();
    let stream = CommandBuilder::new()
        .insert_entry(SpdId::In, 1, SpdAction::Drop, 1, 0, &empty)
        .build();
    channel.write(&stream).unwrap();

    assert_eq!(spd.status().entries_in, 1);
    let flow = Flow::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap(), 6);
    assert!(spd.classify(SpdId::In, &flow).is_none());
}

#[test]
fn test_concurrent_readers_see_whole_entries() {
    let (spd, _) = recording_spd();
    let flow = Flow::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap(), 6);

    std::thread::scope(|s| {
        let reader = s.spawn(|| {
            for _ in 0..2000 {
                let ids: Vec<u32> = spd.entries(SpdId::Out).iter().map(|e| e.id).collect();
                let mut sorted = ids.clone();
                sorted.sort_unstable_by(|a, b| b.cmp(a));
                assert_eq!(ids, sorted);
                if let Some(verdict) = spd.classify(SpdId::Out, &flow) {
                    assert_eq!(verdict.priority, verdict.entry_id);
                }
            }
        });

        let mut channel = spd.open().unwrap();
        for id in 0..200 {
            let stream = insert_any(CommandBuilder::new(), SpdId::Out, id, id).build();
            channel.write(&stream).unwrap();
        }
        reader.join().unwrap();
    });
}
