//! Kernel IPsec security policy database.
//!
//! This crate implements the in-kernel side of an IPsec policy manager:
//! a prioritized selector database per policy set, the binary command
//! protocol a policy manager writes to the control channel, and the
//! hot-swappable boundary that scopes the traffic the SPD governs.
//!
//! # Features
//!
//! - `serde` - Serialize/Deserialize for public value types
//! - `output` - JSON/text output formatting
//! - `full` - All features enabled
//!
//! # Example
//!
//! ```
//! use kernelspd::spd::{CommandBuilder, LoggingHooks, Spd, SpdId, KERNEL_SPD_VERSION};
//!
//! let spd = Spd::new(LoggingHooks::new());
//! let mut channel = spd.open()?;
//!
//! let stream = CommandBuilder::new()
//!     .version_sync(KERNEL_SPD_VERSION)
//!     .activate("tcp:any")
//!     .remove_entry(SpdId::In, 1)
//!     .build();
//! channel.write(&stream)?;
//!
//! println!("{:?}", spd.status());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules (always available)
pub mod spd;
pub mod util;

// Feature-gated modules
#[cfg(feature = "output")]
pub mod output;

// Re-export common types at crate root for convenience
pub use spd::{Error, Result, Spd, WriteError};
