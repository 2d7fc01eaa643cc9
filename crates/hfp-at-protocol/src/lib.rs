//! Hands-Free Profile AT wire protocol
//!
//! This crate provides types and utilities for talking to a Bluetooth Audio
//! Gateway (a phone) over the AT command channel of the Hands-Free Profile.
//! It is stateless with respect to the connection: framing, command encoding
//! and reply decoding live here, while command correlation and the service
//! level connection live in `hfp-hf`.
//!
//! # Protocol Overview
//!
//! - **Commands** (HF → AG): Text commands terminated with `\r`
//! - **Replies** (AG → HF): Text framed as `\r\n<reply>\r\n`
//! - **Result codes**: `OK`, `ERROR`, `+CME ERROR: <n>`, `BUSY`, ... close a command
//! - **Unsolicited codes**: `RING`, `+CIEV: ...`, `+CLIP: ...` may arrive at any time
//!
//! # Example
//!
//! ```rust
//! use hfp_at_protocol::{AtCommand, AtFrameParser, ReplyPrefix};
//!
//! let cmd = AtCommand::Brsf { features: 0x3ff };
//! assert_eq!(cmd.encode(), "AT+BRSF=1023");
//!
//! let mut parser = AtFrameParser::new();
//! parser.push(b"\r\n+BRSF: 4079\r\n\r\nOK\r\n");
//! let frame = parser.decode().unwrap();
//! assert_eq!(frame.prefix, ReplyPrefix::Brsf);
//! assert_eq!(frame.argument, "4079");
//! ```

mod codec;
mod commands;
mod constants;
mod error;
mod responses;

pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use responses::*;
