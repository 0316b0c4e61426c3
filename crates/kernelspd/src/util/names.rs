//! Name resolution for IP protocols.

/// Get the name of an IP protocol, if it has one.
pub fn ip_protocol_name(id: u8) -> Option<&'static str> {
    match id {
        1 => Some("icmp"),
        6 => Some("tcp"),
        17 => Some("udp"),
        50 => Some("esp"),
        51 => Some("ah"),
        58 => Some("icmpv6"),
        132 => Some("sctp"),
        _ => None,
    }
}

/// Get IP protocol number from name.
pub fn ip_protocol_id(name: &str) -> Option<u8> {
    match name {
        "icmp" => Some(1),
        "tcp" => Some(6),
        "udp" => Some(17),
        "esp" => Some(50),
        "ah" => Some(51),
        "icmpv6" | "ipv6-icmp" => Some(58),
        "sctp" => Some(132),
        _ => None,
    }
}
