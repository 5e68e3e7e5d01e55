//! # hopsocks
//!
//! A SOCKS5 CONNECT proxy split across two cooperating hops.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────┐  greeting   ┌───────────┐   raw bytes   ┌──────────────┐  dial  ┌────────┐
//! │ client │ ──────────► │ entry hop │ ════════════► │ terminal hop │ ─────► │ target │
//! │        │ ◄────────── │ (05 00)   │ ◄════════════ │ (request +   │ ◄───── │        │
//! └────────┘             └───────────┘               │  reply)      │        └────────┘
//!                                                    └──────────────┘
//! ```
//!
//! The entry hop answers the greeting and then relays bytes untouched; the
//! destination request is parsed only by the terminal hop. Only
//! CONNECT-over-domain-name with "no authentication" is supported.
//!
//! ## Layers
//!
//! 1. [`proxy::codec`]: byte-exact framing of the four SOCKS5 messages
//! 2. [`proxy::socks5`]: greeting negotiation and destination resolution
//! 3. [`proxy::relay`]: joined bidirectional copy with half-close
//! 4. `server`: per-connection orchestration, configuration, metrics

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod proxy;

#[cfg(feature = "server")]
pub mod server;

pub use error::{Error, Result};
