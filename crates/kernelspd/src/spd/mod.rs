//! Kernel security policy database.
//!
//! The SPD holds, per policy set, an ordered list of selector entries
//! that decide whether traffic is dropped, bypassed or protected by
//! IPsec. A user-space policy manager drives it through a control
//! channel by writing streams of length-prefixed commands.
//!
//! # Quick Start
//!
//! ```
//! use kernelspd::spd::{
//!     CommandBuilder, Flow, IpSelector, LoggingHooks, ProtocolRange, SelectorGroup, Spd,
//!     SpdAction, SpdId, KERNEL_SPD_VERSION,
//! };
//!
//! let spd = Spd::new(LoggingHooks::new());
//! let mut channel = spd.open()?;
//!
//! let tcp = SelectorGroup::new()
//!     .selector(IpSelector::new().protocol(ProtocolRange::single(6)))
//!     .to_bytes()?;
//!
//! let stream = CommandBuilder::new()
//!     .version_sync(KERNEL_SPD_VERSION)
//!     .activate("any:any")
//!     .insert_entry(SpdId::Out, 1, SpdAction::Protect, 10, 0, &tcp)
//!     .build();
//! channel.write(&stream)?;
//!
//! let flow = Flow::new("10.0.0.1".parse()?, "10.0.0.2".parse()?, 6);
//! let verdict = spd.classify(SpdId::Out, &flow).unwrap();
//! assert_eq!(verdict.action, SpdAction::Protect);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Write semantics
//!
//! Commands in one write apply in order. The first failing command stops
//! the write: commands before it stay applied and nothing after it is
//! dispatched. The returned [`WriteError`] reports the applied bytes.
//! Removing an entry that does not exist is logged and not an error.

pub mod boundary;
pub mod command;
pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod hooks;
pub mod selector;
pub mod validation;

pub use boundary::{BoundaryClause, BoundarySpec, BoundaryTarget, is_valid_spec};
pub use command::{
    COMMAND_BYTECOUNT_MAX, COMMAND_HDRLEN, Command, CommandBuilder, CommandId, CommandIter,
    KERNEL_SPD_VERSION, KernelSpdCommand, SpdAction, SpdId, decode_frame,
};
pub use config::SpdConfig;
pub use control::{ControlChannel, Spd, SpdStatus, Verdict};
pub use db::{EntrySummary, IpSelectorDb, SelectorEntry};
pub use error::{Error, Result, ValidationErrorInfo, WriteError};
pub use hooks::{LoggingHooks, PacketHooks};
pub use selector::{
    AddressRange, Flow, IpSelector, PortRange, ProtocolRange, SelectorGroup, entry_check,
};
pub use validation::{Issue, Severity, Validatable, ValidationResult};
