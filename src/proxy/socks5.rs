//! SOCKS5 handshake drivers for the two hops.
//!
//! The entry hop only answers the greeting and leaves the destination
//! request on the stream for the terminal hop, which parses it and replies.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::proxy::codec::{self, ConnectReply, DialTarget, Greeting, METHOD_NO_AUTH};

/// Answer the client greeting, always selecting "no authentication".
///
/// The offered methods are read but not inspected. On return the stream is
/// positioned right after the greeting, so the destination request that
/// follows can be forwarded byte-for-byte.
pub async fn negotiate<S>(stream: &mut S) -> Result<Greeting>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = codec::read_greeting(stream).await?;
    tracing::debug!("greeting offers {} method(s)", greeting.methods().len());

    codec::write_negotiation_reply(stream, METHOD_NO_AUTH).await?;
    Ok(greeting)
}

/// Read and validate the destination request without replying.
pub async fn read_destination<S>(stream: &mut S) -> Result<DialTarget>
where
    S: AsyncRead + Unpin,
{
    let request = codec::read_destination_request(stream).await?;
    let target = request.target()?;
    tracing::debug!("destination request for {}", target);
    Ok(target)
}

/// Read the destination request and answer with the fixed success reply.
///
/// The reply goes out before the caller dials, so it does not reflect
/// whether the target is reachable.
pub async fn resolve_destination<S>(stream: &mut S) -> Result<DialTarget>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let target = read_destination(stream).await?;
    codec::write_connect_reply(stream).await?;
    Ok(target)
}

/// Report `err` to the client as a connect reply with a non-zero code.
///
/// Only meaningful after a complete request was read, or after a request
/// was rejected for its command or address type.
pub async fn reply_failure<S>(stream: &mut S, err: &Error) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    ConnectReply::failure(err.reply_code())
        .write_to(stream)
        .await
}
