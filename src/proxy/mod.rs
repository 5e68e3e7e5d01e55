//! SOCKS5 framing, handshake drivers and the byte relay.
//!
//! Entry side: answer the greeting, then relay raw bytes upstream.
//! Terminal side: parse the destination request, reply, then relay to the target.

pub mod codec;
pub mod relay;
pub mod socks5;

pub use codec::{ConnectReply, DestinationRequest, DialTarget, Greeting, NegotiationReply};
pub use relay::{relay, RelayReport};
pub use socks5::{negotiate, resolve_destination};
