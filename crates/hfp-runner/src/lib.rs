//! # hfp-runner
//!
//! Runs the HF engine against a real peer. The AG is reached over TCP in
//! place of RFCOMM; discovery and the audio link complete immediately.
//! Intents are typed on stdin.

pub mod console;
pub mod driver;
pub mod error;
pub mod link;
pub mod loopback;

pub use console::ConsoleCommand;
pub use driver::Runner;
pub use error::{Result, RunnerError};
pub use link::TcpLink;
pub use loopback::{ImmediateDiscovery, LoopbackAudio};
