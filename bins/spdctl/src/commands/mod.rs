//! spdctl command implementations.

pub mod apply;
pub mod boundary;
pub mod decode;
pub mod encode;
pub mod replay;
