//! NCID caller-ID client for Rust
//!
//! This crate connects to an NCID server (or any caller-ID gateway speaking
//! the NCID text protocol), keeps the link alive across disconnects, and
//! turns the line stream into a normalized call state plus the identity of
//! the current caller.
//!
//! # Architecture
//!
//! The library is layered, leaf-first:
//! - [`parse`] / [`parse_status`]: raw line to [`Message`], pure
//! - [`extract_identity`]: [`Message`] to [`CallerIdentity`], pure
//! - [`advance`]: ([`CallState`], [`Message`]) to [`Transition`], pure
//! - [`NcidConnection`] + [`NcidLineStream`]: socket lifecycle in a background task
//! - [`NcidSession`]: wires the above together and notifies a [`CallObserver`]
//!
//! # Examples
//!
//! ## Watching a line
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ncid_tokio::{CallEvent, CallPresence, NcidConfig, NcidError, NcidSession};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), NcidError> {
//!     let (tx, mut events) = mpsc::unbounded_channel();
//!     let session = NcidSession::spawn(NcidConfig::new("localhost", 3333), Arc::new(tx))?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let CallEvent::CallIdentified { direction, identity } = event {
//!             println!("{} call from {}", direction, identity);
//!         }
//!         println!("line is {}", session.current_state());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Parsing without a socket
//!
//! ```rust
//! use ncid_tokio::{advance, extract_identity, parse, CallState, FieldName};
//!
//! let msg = parse("CID: *DATE*01152017*TIME*0010*NMBR*5551234*NAME*NO NAME*").unwrap();
//! assert_eq!(msg.field(FieldName::Number), Some("5551234"));
//!
//! let identity = extract_identity(&msg);
//! assert_eq!(identity.name, None);
//!
//! let t = advance(CallState::OnHook, &msg);
//! assert_eq!(t.next, CallState::IncomingRinging);
//! ```

#[macro_use]
mod macros;

pub mod call;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod fields;
pub mod identity;
pub mod protocol;
pub mod session;

pub(crate) mod buffer;

pub use call::{advance, CallDirection, CallState, RingStatus, Transition};
pub use config::{NcidConfig, RetryPolicy};
pub use connection::{ConnectionStatus, DisconnectReason, NcidConnection, NcidLineStream};
pub use constants::DEFAULT_NCID_PORT;
pub use error::{NcidError, NcidResult};
pub use fields::{FieldName, ParseFieldNameError};
pub use identity::{extract_identity, CallerIdentity};
pub use protocol::{parse, parse_status, Command, Message, ParseCommandError, ParseError, StatusLine};
pub use session::{CallEvent, CallObserver, CallPresence, CallSnapshot, NcidSession, SessionCore};
