//! Control-channel command header, framing and encoding.
//!
//! A write to the control channel is a sequence of self-describing
//! commands. Each command is a fixed [`KernelSpdCommand`] header whose
//! `bytecount` covers the header plus a command-specific payload:
//!
//! ```text
//! +-------------------------------+---------------------------+
//! | KernelSpdCommand (28 bytes)   | payload (bytecount - 28)  |
//! +-------------------------------+---------------------------+
//! ```
//!
//! All header fields are native-endian `u32`s. [`decode_frame`] validates
//! the header and length invariants before any typed [`Command`] exists;
//! [`CommandBuilder`] produces streams for the policy-manager side.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Protocol version negotiated with VERSION_SYNC.
pub const KERNEL_SPD_VERSION: u32 = 3;

/// Default ceiling for a single command's bytecount.
pub const COMMAND_BYTECOUNT_MAX: u32 = 0x7fff_ffff;

/// Size of the fixed command header.
pub const COMMAND_HDRLEN: usize = std::mem::size_of::<KernelSpdCommand>();

/// Control command header (mirrors struct KernelSpdCommand).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct KernelSpdCommand {
    /// Command id, see [`CommandId`].
    pub command_id: u32,
    /// Total bytes of this command including the header.
    pub bytecount: u32,
    /// Policy-set id.
    pub spd_id: u32,
    /// Selector entry id.
    pub entry_id: u32,
    /// Verdict to store on insert.
    pub action_id: u32,
    /// Priority to store on insert.
    pub priority: u32,
    /// Tie-break hint used on insert.
    pub precedence: u32,
}

impl KernelSpdCommand {
    /// Create a header for the given command with an empty payload.
    pub fn new(command_id: u32) -> Self {
        Self {
            command_id,
            bytecount: COMMAND_HDRLEN as u32,
            ..Default::default()
        }
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.bytecount as usize).saturating_sub(COMMAND_HDRLEN)
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::ShortBuffer {
                remaining: data.len(),
                header: COMMAND_HDRLEN,
            })
    }
}

/// Command ids.
pub struct CommandId;

impl CommandId {
    pub const ACTIVATE: u32 = 1;
    pub const DEACTIVATE: u32 = 2;
    pub const INSERT_ENTRY: u32 = 3;
    pub const REMOVE_ENTRY: u32 = 4;
    pub const UPDATE_IPSEC_BOUNDARY: u32 = 5;
    pub const VERSION_SYNC: u32 = 6;

    /// Get the display name of a command id.
    pub fn name(id: u32) -> Option<&'static str> {
        match id {
            Self::ACTIVATE => Some("activate"),
            Self::DEACTIVATE => Some("deactivate"),
            Self::INSERT_ENTRY => Some("insert-entry"),
            Self::REMOVE_ENTRY => Some("remove-entry"),
            Self::UPDATE_IPSEC_BOUNDARY => Some("update-ipsec-boundary"),
            Self::VERSION_SYNC => Some("version-sync"),
            _ => None,
        }
    }
}

/// Policy-set (SPD) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SpdId {
    /// Inbound policy set.
    In,
    /// Outbound policy set.
    Out,
}

impl SpdId {
    /// Number of valid policy sets.
    pub const COUNT: usize = 2;

    /// All policy sets in index order.
    pub const ALL: [SpdId; Self::COUNT] = [SpdId::In, SpdId::Out];

    /// Check a raw wire id against the valid range.
    pub fn is_valid(id: u32) -> bool {
        (id as usize) < Self::COUNT
    }

    /// Convert a raw wire id.
    pub fn from_u32(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::In),
            1 => Some(Self::Out),
            _ => None,
        }
    }

    /// Get the wire id.
    pub fn number(&self) -> u32 {
        match self {
            Self::In => 0,
            Self::Out => 1,
        }
    }

    /// Index into per-set tables.
    pub fn index(&self) -> usize {
        self.number() as usize
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl TryFrom<u32> for SpdId {
    type Error = Error;

    fn try_from(id: u32) -> Result<Self> {
        Self::from_u32(id).ok_or(Error::InvalidSpdId(id))
    }
}

impl std::str::FromStr for SpdId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" | "inbound" => Ok(Self::In),
            "out" | "outbound" => Ok(Self::Out),
            other => other
                .parse::<u32>()
                .map_err(|_| Error::InvalidSpdName(other.to_string()))
                .and_then(Self::try_from),
        }
    }
}

// Verdict ids
const KERNEL_SPD_ACTION_DROP: u32 = 0;
const KERNEL_SPD_ACTION_BYPASS: u32 = 1;
const KERNEL_SPD_ACTION_PROTECT: u32 = 2;

/// Verdict stored with a selector entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpdAction {
    /// Discard matching traffic.
    Drop,
    /// Pass matching traffic in clear.
    Bypass,
    /// Apply IPsec to matching traffic.
    Protect,
    /// Verdict not known to this build; stored verbatim.
    Unknown(u32),
}

impl SpdAction {
    /// Convert a raw wire id.
    pub fn from_u32(val: u32) -> Self {
        match val {
            KERNEL_SPD_ACTION_DROP => Self::Drop,
            KERNEL_SPD_ACTION_BYPASS => Self::Bypass,
            KERNEL_SPD_ACTION_PROTECT => Self::Protect,
            other => Self::Unknown(other),
        }
    }

    /// Get the wire id.
    pub fn number(&self) -> u32 {
        match self {
            Self::Drop => KERNEL_SPD_ACTION_DROP,
            Self::Bypass => KERNEL_SPD_ACTION_BYPASS,
            Self::Protect => KERNEL_SPD_ACTION_PROTECT,
            Self::Unknown(n) => *n,
        }
    }

    /// Get the display name.
    pub fn name(&self) -> String {
        match self {
            Self::Drop => "drop".to_string(),
            Self::Bypass => "bypass".to_string(),
            Self::Protect => "protect".to_string(),
            Self::Unknown(n) => format!("action-{}", n),
        }
    }
}

impl std::str::FromStr for SpdAction {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "drop" | "discard" => Ok(Self::Drop),
            "bypass" | "pass" => Ok(Self::Bypass),
            "protect" | "ipsec" => Ok(Self::Protect),
            other => other.parse::<u32>().map(Self::from_u32),
        }
    }
}

/// A framed command, borrowed from the write buffer.
///
/// Only constructed by [`decode_frame`] after the header and length
/// checks have passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Install the boundary and enable packet hooks.
    Activate {
        /// Boundary specification bytes.
        boundary: &'a [u8],
    },
    /// Disable packet hooks.
    Deactivate,
    /// Insert a selector entry.
    InsertEntry {
        /// Raw policy-set id (validated at dispatch).
        spd_id: u32,
        /// Entry id.
        entry_id: u32,
        /// Verdict.
        action: SpdAction,
        /// Priority.
        priority: u32,
        /// Tie-break hint.
        precedence: u32,
        /// Selector group payload.
        payload: &'a [u8],
    },
    /// Remove a selector entry.
    RemoveEntry {
        /// Raw policy-set id (validated at dispatch).
        spd_id: u32,
        /// Entry id.
        entry_id: u32,
    },
    /// Replace the boundary while active.
    UpdateBoundary {
        /// Boundary specification bytes.
        boundary: &'a [u8],
    },
    /// Compare protocol versions.
    VersionSync {
        /// Version payload; must be exactly four bytes.
        payload: &'a [u8],
    },
    /// Command id this build does not know.
    Unknown {
        /// The unrecognised id.
        command_id: u32,
        /// Its payload.
        payload: &'a [u8],
    },
}

impl<'a> Command<'a> {
    fn from_parts(hdr: &KernelSpdCommand, payload: &'a [u8]) -> Self {
        match hdr.command_id {
            CommandId::ACTIVATE => Self::Activate { boundary: payload },
            CommandId::DEACTIVATE => Self::Deactivate,
            CommandId::INSERT_ENTRY => Self::InsertEntry {
                spd_id: hdr.spd_id,
                entry_id: hdr.entry_id,
                action: SpdAction::from_u32(hdr.action_id),
                priority: hdr.priority,
                precedence: hdr.precedence,
                payload,
            },
            CommandId::REMOVE_ENTRY => Self::RemoveEntry {
                spd_id: hdr.spd_id,
                entry_id: hdr.entry_id,
            },
            CommandId::UPDATE_IPSEC_BOUNDARY => Self::UpdateBoundary { boundary: payload },
            CommandId::VERSION_SYNC => Self::VersionSync { payload },
            command_id => Self::Unknown {
                command_id,
                payload,
            },
        }
    }

    /// Get the wire command id.
    pub fn command_id(&self) -> u32 {
        match self {
            Self::Activate { .. } => CommandId::ACTIVATE,
            Self::Deactivate => CommandId::DEACTIVATE,
            Self::InsertEntry { .. } => CommandId::INSERT_ENTRY,
            Self::RemoveEntry { .. } => CommandId::REMOVE_ENTRY,
            Self::UpdateBoundary { .. } => CommandId::UPDATE_IPSEC_BOUNDARY,
            Self::VersionSync { .. } => CommandId::VERSION_SYNC,
            Self::Unknown { command_id, .. } => *command_id,
        }
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        CommandId::name(self.command_id()).unwrap_or("unknown")
    }
}

/// Decode the command at the start of `input`.
///
/// Returns the command and the number of bytes it occupies. The header
/// and length checks run in order: short buffer, bytecount below header
/// size, bytecount above `bytecount_max`, bytecount beyond the input.
pub fn decode_frame(input: &[u8], bytecount_max: u32) -> Result<(Command<'_>, usize)> {
    let hdr = KernelSpdCommand::from_bytes(input)?;

    if (hdr.bytecount as usize) < COMMAND_HDRLEN {
        return Err(Error::BytecountTooSmall {
            bytecount: hdr.bytecount,
            header: COMMAND_HDRLEN,
        });
    }

    if hdr.bytecount > bytecount_max {
        return Err(Error::BytecountTooLarge {
            bytecount: hdr.bytecount,
            max: bytecount_max,
        });
    }

    let len = hdr.bytecount as usize;
    if len > input.len() {
        return Err(Error::Truncated {
            bytecount: hdr.bytecount,
            remaining: input.len(),
        });
    }

    let payload = &input[COMMAND_HDRLEN..][..hdr.payload_len()];
    Ok((Command::from_parts(&hdr, payload), len))
}

/// Bytecount for a frame carrying `payload_len` bytes, saturating at
/// `u32::MAX`.
fn frame_bytecount(payload_len: usize) -> u32 {
    u32::try_from(COMMAND_HDRLEN.saturating_add(payload_len)).unwrap_or(u32::MAX)
}

/// Iterator over framed commands in a buffer.
///
/// Yields each command with its offset. Stops after the first framing
/// error, which is yielded once.
pub struct CommandIter<'a> {
    data: &'a [u8],
    offset: usize,
    bytecount_max: u32,
    failed: bool,
}

impl<'a> CommandIter<'a> {
    /// Create a new command iterator with the default bytecount ceiling.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_limit(data, COMMAND_BYTECOUNT_MAX)
    }

    /// Create a new command iterator with an explicit bytecount ceiling.
    pub fn with_limit(data: &'a [u8], bytecount_max: u32) -> Self {
        Self {
            data,
            offset: 0,
            bytecount_max,
            failed: false,
        }
    }

    /// Bytes consumed by successfully framed commands so far.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = Result<(usize, Command<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let data: &'a [u8] = self.data;
        match decode_frame(&data[self.offset..], self.bytecount_max) {
            Ok((cmd, len)) => {
                let at = self.offset;
                self.offset += len;
                Some(Ok((at, cmd)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Builder for constructing command streams.
///
/// # Example
///
/// ```
/// use kernelspd::spd::{CommandBuilder, CommandIter, KERNEL_SPD_VERSION};
///
/// let stream = CommandBuilder::new()
///     .version_sync(KERNEL_SPD_VERSION)
///     .activate("tcp:any")
///     .build();
///
/// assert_eq!(CommandIter::new(&stream).count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    buf: Vec<u8>,
}

impl CommandBuilder {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current stream length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if no command has been appended.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a header and payload, filling in the bytecount.
    ///
    /// A command too long for the 32-bit bytecount gets `u32::MAX`, which
    /// the decoder rejects as over the ceiling.
    pub fn command(mut self, mut hdr: KernelSpdCommand, payload: &[u8]) -> Self {
        hdr.bytecount = frame_bytecount(payload.len());
        self.buf.extend_from_slice(hdr.as_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    /// Append ACTIVATE with a boundary specification.
    pub fn activate(self, boundary: &str) -> Self {
        self.command(
            KernelSpdCommand::new(CommandId::ACTIVATE),
            boundary.as_bytes(),
        )
    }

    /// Append DEACTIVATE.
    pub fn deactivate(self) -> Self {
        self.command(KernelSpdCommand::new(CommandId::DEACTIVATE), &[])
    }

    /// Append INSERT_ENTRY.
    pub fn insert_entry(
        self,
        spd_id: SpdId,
        entry_id: u32,
        action: SpdAction,
        priority: u32,
        precedence: u32,
        selectors: &[u8],
    ) -> Self {
        let hdr = KernelSpdCommand {
            spd_id: spd_id.number(),
            entry_id,
            action_id: action.number(),
            priority,
            precedence,
            ..KernelSpdCommand::new(CommandId::INSERT_ENTRY)
        };
        self.command(hdr, selectors)
    }

    /// Append REMOVE_ENTRY.
    pub fn remove_entry(self, spd_id: SpdId, entry_id: u32) -> Self {
        let hdr = KernelSpdCommand {
            spd_id: spd_id.number(),
            entry_id,
            ..KernelSpdCommand::new(CommandId::REMOVE_ENTRY)
        };
        self.command(hdr, &[])
    }

    /// Append UPDATE_IPSEC_BOUNDARY.
    pub fn update_boundary(self, boundary: &str) -> Self {
        self.command(
            KernelSpdCommand::new(CommandId::UPDATE_IPSEC_BOUNDARY),
            boundary.as_bytes(),
        )
    }

    /// Append VERSION_SYNC.
    pub fn version_sync(self, version: u32) -> Self {
        self.command(
            KernelSpdCommand::new(CommandId::VERSION_SYNC),
            &version.to_ne_bytes(),
        )
    }

    /// Finish and return the stream bytes.
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}
