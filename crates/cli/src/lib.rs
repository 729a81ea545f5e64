//! Process bootstrap and demo services for the trustsock binaries.
//!
//! Everything here is peripheral glue around `trustsock-rpc`: resolving the
//! trust token from the environment, and the demo method registry the
//! server entrypoint exposes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod services;
