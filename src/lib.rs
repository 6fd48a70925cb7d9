//! Synthesis of plausible TCP sessions, for captures that look like real traffic.
//! Background flows and scripted file transfers can be chained into a single pcap file.

/// Parameters of the synthesizers
pub mod config;
/// Errors of the library
pub mod error;

#[doc(hidden)]
/// Structures used throughout the library
pub mod structs;

#[doc(inline)]
pub use structs::*;

/// Endpoint selection
pub mod address;
/// Timestamp generation
pub mod clock;
/// TCP sequence and acknowledgment bookkeeping
pub mod sequence;

/// Phase-by-phase packet emission of a single flow
mod flow;

/// Random background flows
pub mod random_flow;
/// Scripted file transfer
pub mod transfer;

/// Capture assembly
pub mod assembler;
/// Export to and import from pcap
pub mod export;
/// Capture statistics
pub mod stats;
