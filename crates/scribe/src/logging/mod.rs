//! Logging utilities.
//!
//! Centralizes logger initialization behind the standard `log` facade.
//! The crate itself only ever logs; initialization is for binaries and
//! tests that embed it.

mod init;

pub use init::init_logging;
