//! dpsk — embedded-friendly DTLS 1.2 PSK endpoint (Sans-IO, callback-driven)
//!
//! dpsk is a small DTLS engine for pre-shared-key deployments on
//! constrained devices. It performs no I/O and owns no sockets or timers:
//! the application feeds it received datagrams and a clock, and the engine
//! talks back exclusively through a set of callbacks. One [`Context`]
//! multiplexes any number of concurrent peer sessions, acting as server,
//! client, or both at once.
//!
//! # Goals
//! - **PSK only**: the mandatory-to-implement `TLS_PSK_WITH_AES_128_CCM_8`
//!   suite, nothing else. No certificates, no PKI.
//! - **Safety**: `forbid(unsafe_code)` throughout the crate.
//! - **Small footprint**: bounded buffers, no background tasks, key
//!   material zeroised with the peer that owned it.
//! - **Sans-IO**: UDP socket, event loop, timer source and key database
//!   all live in the application.
//!
//! ## Non-goals
//! - **Cipher suite negotiation** beyond the one PSK suite
//! - **Handshake fragmentation** (oversized flights are rejected)
//! - **Session resumption / renegotiation**
//! - **Async** (the crate is Sans-IO and event-loop agnostic)
//!
//! # Integration model
//!
//! Implement [`DtlsHandler`] and hand it to [`Context::new`]. Then drive
//! the engine with four calls:
//! - [`Context::handle_message`] — feed an entire received UDP datagram.
//! - [`Context::check_retransmit`] — periodic timer tick.
//! - [`Context::connect`] — actively open a channel (client role).
//! - [`Context::write`] — send application data once connected.
//!
//! The engine calls back into the handler: `write` for every outbound
//! datagram, `read` for every verified plaintext, `event` for alerts and
//! state changes, and `psk` for key lookups.
//!
//! # Example (server)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use dpsk::{Config, Context, DtlsHandler, Event, Psk, Session};
//!
//! struct Echo;
//!
//! impl DtlsHandler for Echo {
//!     fn write(&mut self, _session: &Session, datagram: &[u8]) -> isize {
//!         // sendto(sock, datagram, session.addr())
//!         datagram.len() as isize
//!     }
//!
//!     fn read(&mut self, _session: &Session, data: &[u8]) {
//!         // verified plaintext arrived
//!         let _ = data;
//!     }
//!
//!     fn event(&mut self, _session: &Session, event: Event) {
//!         if event == Event::Connected {
//!             // channel established
//!         }
//!     }
//!
//!     fn psk(&mut self, _session: &Session, _id: Option<&[u8]>) -> Option<Psk> {
//!         Some(Psk::new(&b"Client_identity"[..], &b"secretPSK"[..]))
//!     }
//! }
//!
//! let mut ctx = Context::new(Arc::new(Config::default()), Echo);
//!
//! loop {
//!     // let (n, from) = sock.recv_from(&mut buf)?;
//!     # let (buf, from): (Vec<u8>, std::net::SocketAddr) = todo!();
//!     let session = Session::new(from);
//!     let _ = ctx.handle_message(Instant::now(), &session, &buf);
//!     ctx.check_retransmit(Instant::now());
//! }
//! ```
//!
//! ### MSRV
//! Rust 1.81.0

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::upper_case_acronyms)]
#![deny(missing_docs)]

// The PSK handshake this crate implements:
//
// Client                                               Server
//
// 1     ClientHello                  -------->
//       (empty cookie)
// 2                                  <--------   HelloVerifyRequest
//                                                 (contains cookie)
// 3     ClientHello                  -------->
//       (with cookie)
// 4                                                     ServerHello
//                                    <--------      ServerHelloDone
// 5     ClientKeyExchange
//       [ChangeCipherSpec]
//       Finished                     -------->
// 6                                              [ChangeCipherSpec]
//                                    <--------             Finished
//       Application Data             <------->     Application Data

#[macro_use]
extern crate log;

mod buffer;
mod codec;
mod context;
mod crypto;
mod error;
mod handler;
mod message;
mod peer;
mod rng;
mod session;
mod timer;
mod transcript;
mod window;

mod config;
pub use config::{Config, ConfigBuilder};

pub use context::{Connect, Context};
pub use error::Error;
pub use handler::{DtlsHandler, Event, Psk};
pub use message::{AlertDescription, AlertLevel, ProtocolVersion};
pub use session::Session;
