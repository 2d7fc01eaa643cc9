//! # hfp-hf
//!
//! Hands-Free (HF) role of the Bluetooth Hands-Free Profile.
//!
//! The crate drives the AT command channel to an Audio Gateway: it brings
//! up the service level connection, tracks the AG's indicators and calls,
//! turns application intents into AT commands and manages the connection
//! and audio states of every device.
//!
//! ## Overview
//!
//! - [`HfService`]: single-threaded dispatcher, one [`Session`] per device
//! - [`Session`]: hierarchical state machine with deferred event replay
//! - [`Profile`]: intents to commands, decoded events to [`Notification`]s
//! - [`CommandProcessor`]: single in-flight command, SLC ladder, reply decoding
//! - [`CallManager`]: call table reconciled against `AT+CLCC` snapshots
//!
//! Lower layers are reached through the [`Transport`], [`Discovery`] and
//! [`AudioLink`] traits; their completions come back as [`Message`]s.
//!
//! ## Example
//!
//! ```no_run
//! use hfp_hf::{EventSender, HfConfig, HfService, Message, Timestamp};
//! # use hfp_hf::{AudioLink, DeviceAddress, Discovery, Role, Transport, Result};
//! # struct Stack;
//! # impl Transport for Stack {
//! #     fn connect(&mut self, _: DeviceAddress) -> Result<()> { Ok(()) }
//! #     fn disconnect(&mut self, _: DeviceAddress) -> Result<()> { Ok(()) }
//! #     fn write(&mut self, _: DeviceAddress, _: &[u8]) -> Result<()> { Ok(()) }
//! #     fn accept(&mut self, _: DeviceAddress) -> Result<()> { Ok(()) }
//! #     fn reject(&mut self, _: DeviceAddress) -> Result<()> { Ok(()) }
//! # }
//! # impl Discovery for Stack {
//! #     fn do_discovery(&mut self, _: DeviceAddress, _: Role) -> Result<()> { Ok(()) }
//! # }
//! # impl AudioLink for Stack {
//! #     fn connect_audio(&mut self, _: DeviceAddress, _: u8) -> Result<()> { Ok(()) }
//! #     fn accept_audio_connection(&mut self, _: DeviceAddress, _: u8) -> Result<()> { Ok(()) }
//! #     fn disconnect_audio(&mut self, _: DeviceAddress) -> Result<()> { Ok(()) }
//! # }
//!
//! let (events, notifications) = EventSender::channel();
//! let mut service = HfService::new(
//!     &HfConfig::default(),
//!     Box::new(Stack),
//!     Box::new(Stack),
//!     Box::new(Stack),
//!     events,
//! )?;
//!
//! let phone = "00:1A:7D:DA:71:13".parse()?;
//! service.handle(Message::Connect(phone));
//! service.advance_to(Timestamp::from_secs(1));
//! for notification in notifications.try_iter() {
//!     println!("{:?}", notification);
//! }
//! # Ok::<(), hfp_hf::HfError>(())
//! ```

pub mod call_manager;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod indicators;
pub mod processor;
pub mod profile;
pub mod service;
pub mod state_machine;
pub mod telemetry;
pub mod timer;
pub mod types;

pub use call_manager::{Call, CallChange, CallManager, CallState};
pub use collaborators::{AudioLink, DeviceIo, Discovery, Transport};
pub use config::{HfConfig, HfFeatures, LocalCapabilities};
pub use context::ConnectionContext;
pub use error::{CommandErrorKind, HfError, Result};
pub use events::{EventSender, Notification};
pub use indicators::{AgIndicator, AgIndicatorKind, AgIndicatorTable, HfIndicator, HfIndicatorSet};
pub use processor::{CommandProcessor, PendingCommand, ProcessorEvent, SlcStep};
pub use profile::{Intent, Profile, ProfileSignal};
pub use service::{HfService, Message};
pub use state_machine::{AudioPhase, Outcome, Session, SessionEvent, State};
pub use timer::{TimerKind, TimerQueue};
pub use types::{AudioState, ConnectionState, DeviceAddress, Role, Timestamp, VolumeKind};

pub use hfp_at_protocol as at;
