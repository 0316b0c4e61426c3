//! IP selector payloads.
//!
//! An INSERT_ENTRY payload is a selector group: a list of selectors, each
//! a list of typed fields, each a list of range items.
//!
//! ```text
//! group    := GroupHdr    { bytecount u32, selector_count u32 } selector*
//! selector := SelectorHdr { bytecount u32, field_count u32 }    field*
//! field    := FieldHdr    { bytecount u16, kind u8, item_count u8 } item*
//! ```
//!
//! Selectors in a group are alternatives. Fields in a selector must all
//! match. Items in a field are alternatives. A field left out of a
//! selector matches anything.
//!
//! [`entry_check`] walks an untrusted payload and returns the typed
//! [`SelectorGroup`] only if every length and range is consistent.

use std::net::IpAddr;

use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};
use crate::util::addr;

/// Selector group header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GroupHdr {
    /// Length of the whole group including this header.
    pub bytecount: u32,
    /// Number of selectors that follow.
    pub selector_count: u32,
}

/// Selector header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SelectorHdr {
    /// Length of the selector including this header.
    pub bytecount: u32,
    /// Number of fields that follow.
    pub field_count: u32,
}

/// Selector field header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FieldHdr {
    /// Length of the field including this header.
    pub bytecount: u16,
    /// Field kind, see [`FieldKind`].
    pub kind: u8,
    /// Number of items that follow.
    pub item_count: u8,
}

/// Address range item.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct AddressItem {
    /// IP version (4 or 6).
    pub version: u8,
    /// Padding.
    pub _pad: [u8; 3],
    /// First address of the range.
    pub start: [u8; 16],
    /// Last address of the range.
    pub end: [u8; 16],
}

/// IP protocol range item.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ProtocolItem {
    /// First protocol number.
    pub start: u8,
    /// Last protocol number.
    pub end: u8,
    /// Padding.
    pub _pad: [u8; 2],
}

/// Port range item.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PortItem {
    /// First port.
    pub start: u16,
    /// Last port.
    pub end: u16,
}

pub const GROUP_HDRLEN: usize = std::mem::size_of::<GroupHdr>();
pub const SELECTOR_HDRLEN: usize = std::mem::size_of::<SelectorHdr>();
pub const FIELD_HDRLEN: usize = std::mem::size_of::<FieldHdr>();

/// Maximum items in one field (item_count is a u8).
pub const FIELD_ITEMS_MAX: usize = u8::MAX as usize;

/// Selector field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    LocalAddress,
    RemoteAddress,
    IpProtocol,
    LocalPort,
    RemotePort,
}

impl FieldKind {
    fn from_u8(val: u8) -> Option<Self> {
        match val {
            1 => Some(Self::LocalAddress),
            2 => Some(Self::RemoteAddress),
            3 => Some(Self::IpProtocol),
            4 => Some(Self::LocalPort),
            5 => Some(Self::RemotePort),
            _ => None,
        }
    }

    /// Get the wire id.
    pub fn number(&self) -> u8 {
        match self {
            Self::LocalAddress => 1,
            Self::RemoteAddress => 2,
            Self::IpProtocol => 3,
            Self::LocalPort => 4,
            Self::RemotePort => 5,
        }
    }

    fn item_size(&self) -> usize {
        match self {
            Self::LocalAddress | Self::RemoteAddress => std::mem::size_of::<AddressItem>(),
            Self::IpProtocol => std::mem::size_of::<ProtocolItem>(),
            Self::LocalPort | Self::RemotePort => std::mem::size_of::<PortItem>(),
        }
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalAddress => "local-address",
            Self::RemoteAddress => "remote-address",
            Self::IpProtocol => "protocol",
            Self::LocalPort => "local-port",
            Self::RemotePort => "remote-port",
        }
    }
}

/// The packet-header fields a selector is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    /// Address on this host's side.
    pub local: IpAddr,
    /// Address of the peer.
    pub remote: IpAddr,
    /// IP protocol number.
    pub protocol: u8,
    /// Port on this host's side (0 when the protocol has none).
    pub local_port: u16,
    /// Port of the peer (0 when the protocol has none).
    pub remote_port: u16,
    /// Interface the packet traverses, if known.
    pub interface: Option<String>,
}

impl Flow {
    /// Create a flow between two addresses with no ports.
    pub fn new(local: IpAddr, remote: IpAddr, protocol: u8) -> Self {
        Self {
            local,
            remote,
            protocol,
            local_port: 0,
            remote_port: 0,
            interface: None,
        }
    }

    /// Set both ports.
    pub fn ports(mut self, local: u16, remote: u16) -> Self {
        self.local_port = local;
        self.remote_port = remote;
        self
    }

    /// Set the interface.
    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interface = Some(name.into());
        self
    }
}

/// Inclusive address range of a single IP version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    start: IpAddr,
    end: IpAddr,
}

impl AddressRange {
    /// Create a range; both ends must share a version and be ordered.
    pub fn new(start: IpAddr, end: IpAddr) -> Result<Self> {
        if start.is_ipv4() != end.is_ipv4() {
            return Err(invalid(format!(
                "address range {}-{} mixes IP versions",
                start, end
            )));
        }
        if addr::compare(&start, &end) == std::cmp::Ordering::Greater {
            return Err(invalid(format!(
                "address range {}-{} has start after end",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covered by a prefix.
    pub fn from_prefix(address: IpAddr, prefix_len: u8) -> Self {
        let (start, end) = addr::prefix_bounds(address, prefix_len);
        Self { start, end }
    }

    /// Range of a single address.
    pub fn host(address: IpAddr) -> Self {
        Self {
            start: address,
            end: address,
        }
    }

    /// Every IPv4 address.
    pub fn any_v4() -> Self {
        Self::from_prefix(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 0)
    }

    /// Every IPv6 address.
    pub fn any_v6() -> Self {
        Self::from_prefix(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0)
    }

    pub fn start(&self) -> IpAddr {
        self.start
    }

    pub fn end(&self) -> IpAddr {
        self.end
    }

    /// Check if the address is within the range.
    pub fn contains(&self, address: &IpAddr) -> bool {
        address.is_ipv4() == self.start.is_ipv4()
            && addr::compare(address, &self.start) != std::cmp::Ordering::Less
            && addr::compare(address, &self.end) != std::cmp::Ordering::Greater
    }

    fn from_item(item: &AddressItem) -> Result<Self> {
        if item.version == 4 && item.start[4..].iter().chain(&item.end[4..]).any(|&b| b != 0) {
            return Err(invalid("IPv4 address item carries IPv6-length data"));
        }
        let start = addr::from_octets(item.version, &item.start)
            .ok_or_else(|| invalid(format!("unknown IP version {}", item.version)))?;
        let end = addr::from_octets(item.version, &item.end)
            .ok_or_else(|| invalid(format!("unknown IP version {}", item.version)))?;
        Self::new(start, end)
    }

    fn to_item(self) -> AddressItem {
        AddressItem {
            version: addr::version(&self.start),
            _pad: [0; 3],
            start: addr::to_octets(&self.start),
            end: addr::to_octets(&self.end),
        }
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl std::str::FromStr for AddressRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = addr::parse_range(s).map_err(|e| invalid(e.to_string()))?;
        Self::new(start, end)
    }
}

/// Inclusive range of a small integer field (ports, protocols).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange<T> {
    start: T,
    end: T,
}

/// Inclusive port range.
pub type PortRange = ValueRange<u16>;

/// Inclusive IP protocol range.
pub type ProtocolRange = ValueRange<u8>;

impl<T: Copy + Ord + std::fmt::Display> ValueRange<T> {
    /// Create a range; `start` must not exceed `end`.
    pub fn new(start: T, end: T) -> Result<Self> {
        if start > end {
            return Err(invalid(format!("range {}-{} has start after end", start, end)));
        }
        Ok(Self { start, end })
    }

    /// Range holding one value.
    pub fn single(value: T) -> Self {
        Self {
            start: value,
            end: value,
        }
    }

    pub fn start(&self) -> T {
        self.start
    }

    pub fn end(&self) -> T {
        self.end
    }

    /// Check if the value is within the range.
    pub fn contains(&self, value: T) -> bool {
        self.start <= value && value <= self.end
    }
}

impl<T: Copy + Ord + std::fmt::Display> std::fmt::Display for ValueRange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl<T> std::str::FromStr for ValueRange<T>
where
    T: Copy + Ord + std::fmt::Display + std::str::FromStr,
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |v: &str| {
            v.trim()
                .parse::<T>()
                .map_err(|_| invalid(format!("invalid range value '{}'", v)))
        };
        match s.split_once('-') {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

/// One selector: a conjunction of optional fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpSelector {
    pub local_address: Option<Vec<AddressRange>>,
    pub remote_address: Option<Vec<AddressRange>>,
    pub protocol: Option<Vec<ProtocolRange>>,
    pub local_port: Option<Vec<PortRange>>,
    pub remote_port: Option<Vec<PortRange>>,
}

impl IpSelector {
    /// Create a selector that matches every flow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a local address range.
    pub fn local_address(mut self, range: AddressRange) -> Self {
        self.local_address.get_or_insert_with(Vec::new).push(range);
        self
    }

    /// Add a remote address range.
    pub fn remote_address(mut self, range: AddressRange) -> Self {
        self.remote_address.get_or_insert_with(Vec::new).push(range);
        self
    }

    /// Add an IP protocol range.
    pub fn protocol(mut self, range: ProtocolRange) -> Self {
        self.protocol.get_or_insert_with(Vec::new).push(range);
        self
    }

    /// Add a local port range.
    pub fn local_port(mut self, range: PortRange) -> Self {
        self.local_port.get_or_insert_with(Vec::new).push(range);
        self
    }

    /// Add a remote port range.
    pub fn remote_port(mut self, range: PortRange) -> Self {
        self.remote_port.get_or_insert_with(Vec::new).push(range);
        self
    }

    /// Check if the flow satisfies every present field.
    pub fn matches(&self, flow: &Flow) -> bool {
        field_matches(&self.local_address, |r| r.contains(&flow.local))
            && field_matches(&self.remote_address, |r| r.contains(&flow.remote))
            && field_matches(&self.protocol, |r| r.contains(flow.protocol))
            && field_matches(&self.local_port, |r| r.contains(flow.local_port))
            && field_matches(&self.remote_port, |r| r.contains(flow.remote_port))
    }

    fn field_count(&self) -> usize {
        [
            self.local_address.is_some(),
            self.remote_address.is_some(),
            self.protocol.is_some(),
            self.local_port.is_some(),
            self.remote_port.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let start = buf.len();
        buf.extend_from_slice(SelectorHdr::default().as_bytes());

        if let Some(items) = &self.local_address {
            let items: Vec<AddressItem> = items.iter().map(|r| r.to_item()).collect();
            write_field(buf, FieldKind::LocalAddress, &items)?;
        }
        if let Some(items) = &self.remote_address {
            let items: Vec<AddressItem> = items.iter().map(|r| r.to_item()).collect();
            write_field(buf, FieldKind::RemoteAddress, &items)?;
        }
        if let Some(items) = &self.protocol {
            let items: Vec<ProtocolItem> = items
                .iter()
                .map(|r| ProtocolItem {
                    start: r.start,
                    end: r.end,
                    _pad: [0; 2],
                })
                .collect();
            write_field(buf, FieldKind::IpProtocol, &items)?;
        }
        if let Some(items) = &self.local_port {
            let items: Vec<PortItem> = items
                .iter()
                .map(|r| PortItem {
                    start: r.start,
                    end: r.end,
                })
                .collect();
            write_field(buf, FieldKind::LocalPort, &items)?;
        }
        if let Some(items) = &self.remote_port {
            let items: Vec<PortItem> = items
                .iter()
                .map(|r| PortItem {
                    start: r.start,
                    end: r.end,
                })
                .collect();
            write_field(buf, FieldKind::RemotePort, &items)?;
        }

        let hdr = SelectorHdr {
            bytecount: wire_len(buf.len() - start, "selector bytecount")?,
            field_count: self.field_count() as u32,
        };
        buf[start..start + SELECTOR_HDRLEN].copy_from_slice(hdr.as_bytes());
        Ok(())
    }
}

fn field_matches<T>(field: &Option<Vec<T>>, pred: impl Fn(&T) -> bool) -> bool {
    field.as_ref().is_none_or(|items| items.iter().any(pred))
}

fn write_field<T: IntoBytes + Immutable>(
    buf: &mut Vec<u8>,
    kind: FieldKind,
    items: &[T],
) -> Result<()> {
    if items.is_empty() || items.len() > FIELD_ITEMS_MAX {
        return Err(invalid(format!(
            "{} field needs 1..={} items, got {}",
            kind.name(),
            FIELD_ITEMS_MAX,
            items.len()
        )));
    }
    let hdr = FieldHdr {
        bytecount: (FIELD_HDRLEN + items.len() * kind.item_size()) as u16,
        kind: kind.number(),
        item_count: items.len() as u8,
    };
    buf.extend_from_slice(hdr.as_bytes());
    for item in items {
        buf.extend_from_slice(item.as_bytes());
    }
    Ok(())
}

/// A validated selector group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorGroup {
    selectors: Vec<IpSelector>,
}

impl SelectorGroup {
    /// Create an empty group (matches nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a selector.
    pub fn selector(mut self, selector: IpSelector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn selectors(&self) -> &[IpSelector] {
        &self.selectors
    }

    /// Check if any selector matches the flow.
    pub fn matches(&self, flow: &Flow) -> bool {
        self.selectors.iter().any(|s| s.matches(flow))
    }

    /// Encode to the wire payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(GROUP_HDRLEN + self.selectors.len() * 64);
        buf.extend_from_slice(GroupHdr::default().as_bytes());
        for selector in &self.selectors {
            selector.write_to(&mut buf)?;
        }
        let hdr = GroupHdr {
            bytecount: wire_len(buf.len(), "group bytecount")?,
            selector_count: wire_len(self.selectors.len(), "selector count")?,
        };
        buf[..GROUP_HDRLEN].copy_from_slice(hdr.as_bytes());
        Ok(buf)
    }

    /// Parse and validate a wire payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut input = payload;
        let hdr: GroupHdr = read(&mut input, "selector group header")?;

        if hdr.bytecount as usize != payload.len() {
            return Err(invalid(format!(
                "group bytecount {} does not match payload length {}",
                hdr.bytecount,
                payload.len()
            )));
        }

        let capacity = (hdr.selector_count as usize).min(input.len() / SELECTOR_HDRLEN);
        let mut selectors = Vec::with_capacity(capacity);
        for index in 0..hdr.selector_count {
            selectors.push(parse_selector(&mut input, index)?);
        }

        if !input.is_empty() {
            return Err(invalid(format!(
                "{} trailing bytes after {} selectors",
                input.len(),
                hdr.selector_count
            )));
        }

        Ok(Self { selectors })
    }
}

/// Validate a selector payload and return its typed form.
///
/// Fails closed: any inconsistency between declared and actual lengths,
/// an unknown field kind, a repeated field, an empty field, a bad IP
/// version or an inverted range rejects the whole payload.
pub fn entry_check(payload: &[u8]) -> Result<SelectorGroup> {
    SelectorGroup::parse(payload)
}

/// A length as a 32-bit wire bytecount.
fn wire_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| invalid(format!("{} {} does not fit a 32-bit field", what, len)))
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidSelector(message.into())
}

/// Take a fixed-size wire struct off the front of the input.
fn read<T: FromBytes>(input: &mut &[u8], what: &str) -> Result<T> {
    let bytes: &[u8] = take(std::mem::size_of::<T>())
        .parse_next(input)
        .map_err(|_: ErrMode<ContextError>| invalid(format!("truncated {}", what)))?;
    T::read_from_bytes(bytes).map_err(|_| invalid(format!("malformed {}", what)))
}

/// Split off `len` bytes of the input as a sub-region.
fn region<'a>(input: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    take(len)
        .parse_next(input)
        .map_err(|_: ErrMode<ContextError>| {
            invalid(format!("{} bytecount {} overruns its parent", what, len))
        })
}

fn parse_selector(input: &mut &[u8], index: u32) -> Result<IpSelector> {
    let hdr: SelectorHdr = read(input, "selector header")?;
    let len = hdr.bytecount as usize;
    if len < SELECTOR_HDRLEN {
        return Err(invalid(format!(
            "selector {} bytecount {} less than header size",
            index, len
        )));
    }

    let mut body = region(input, len - SELECTOR_HDRLEN, "selector")?;
    let mut selector = IpSelector::new();
    for _ in 0..hdr.field_count {
        parse_field(&mut body, &mut selector)?;
    }

    if !body.is_empty() {
        return Err(invalid(format!(
            "selector {} has {} unused bytes",
            index,
            body.len()
        )));
    }

    Ok(selector)
}

fn parse_field(input: &mut &[u8], selector: &mut IpSelector) -> Result<()> {
    let hdr: FieldHdr = read(input, "field header")?;
    let kind = FieldKind::from_u8(hdr.kind)
        .ok_or_else(|| invalid(format!("unknown field kind {}", hdr.kind)))?;

    let len = hdr.bytecount as usize;
    if len < FIELD_HDRLEN {
        return Err(invalid(format!(
            "{} field bytecount {} less than header size",
            kind.name(),
            len
        )));
    }
    if hdr.item_count == 0 {
        return Err(invalid(format!("{} field has no items", kind.name())));
    }
    let body_len = len - FIELD_HDRLEN;
    if body_len != hdr.item_count as usize * kind.item_size() {
        return Err(invalid(format!(
            "{} field holds {} bytes for {} items",
            kind.name(),
            body_len,
            hdr.item_count
        )));
    }

    let mut body = region(input, body_len, kind.name())?;
    let count = hdr.item_count as usize;

    match kind {
        FieldKind::LocalAddress | FieldKind::RemoteAddress => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let item: AddressItem = read(&mut body, "address item")?;
                items.push(AddressRange::from_item(&item)?);
            }
            let slot = if kind == FieldKind::LocalAddress {
                &mut selector.local_address
            } else {
                &mut selector.remote_address
            };
            set_once(slot, items, kind)
        }
        FieldKind::IpProtocol => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let item: ProtocolItem = read(&mut body, "protocol item")?;
                items.push(ProtocolRange::new(item.start, item.end)?);
            }
            set_once(&mut selector.protocol, items, kind)
        }
        FieldKind::LocalPort | FieldKind::RemotePort => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let item: PortItem = read(&mut body, "port item")?;
                items.push(PortRange::new(item.start, item.end)?);
            }
            let slot = if kind == FieldKind::LocalPort {
                &mut selector.local_port
            } else {
                &mut selector.remote_port
            };
            set_once(slot, items, kind)
        }
    }
}

fn set_once<T>(slot: &mut Option<Vec<T>>, items: Vec<T>, kind: FieldKind) -> Result<()> {
    if slot.is_some() {
        return Err(invalid(format!("{} field repeated", kind.name())));
    }
    *slot = Some(items);
    Ok(())
}
