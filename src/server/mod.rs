//! Hop orchestration.
//!
//! One [`Hop`] serves one listener in one of three modes:
//!
//! ```text
//!            entry                          terminal
//! client ──► negotiate ──► relay ══════════► resolve ──► relay ══════► target
//!            (05 00)       raw bytes        (reply)      dial target
//!
//!            standalone
//! client ──► negotiate ──► resolve ──► relay ══════► target
//! ```
//!
//! Every accepted connection runs in its own task; the relay adds two copy
//! tasks joined before the session ends. Any protocol, timeout or dial error
//! ends the session and closes the accepted connection.

pub mod config;
mod metrics;
mod session;

pub use config::{HopConfig, HopConfigFile, HopMode};
pub use metrics::{HopMetrics, MetricsSnapshot};
pub use session::{Session, SessionId, SessionState};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::proxy::codec::{self, DialTarget};
use crate::proxy::{relay, socks5};

/// Connect to `target`, bounded by `timeout`.
pub async fn dial(target: &str, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::DialFailure {
            target: target.to_string(),
            source: e,
        }),
        Err(_) => Err(Error::DialTimeout {
            target: target.to_string(),
            timeout,
        }),
    }
}

async fn within<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::HandshakeTimeout(limit)),
    }
}

/// Main hop instance.
pub struct Hop {
    handler: Handler,
    next_session_id: AtomicU64,
}

impl Hop {
    /// Create a new hop with the given configuration.
    pub fn new(config: HopConfig) -> Self {
        Self {
            handler: Handler {
                config: Arc::new(config),
                metrics: Arc::new(HopMetrics::new()),
            },
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HopConfig {
        &self.handler.config
    }

    /// Get hop metrics.
    pub fn metrics(&self) -> &HopMetrics {
        &self.handler.metrics
    }

    /// Bind the configured endpoint and serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        self.handler.config.validate()?;

        let endpoint = self.handler.config.listen_endpoint();
        let listener = TcpListener::bind(&endpoint).await?;
        tracing::info!("{} hop listening on {}", self.handler.config.mode, endpoint);
        if let Some(upstream) = &self.handler.config.upstream_addr {
            tracing::info!("forwarding to upstream {}", upstream);
        }

        tokio::select! {
            result = self.serve(listener) => result,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("shutting down\n{}", self.metrics().format_report());
                Ok(())
            }
        }
    }

    /// Accept connections from `listener` forever.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    if self.handler.config.nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("set_nodelay for {}: {}", peer_addr, e);
                        }
                    }

                    let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    let handler = self.handler.clone();
                    let span = tracing::info_span!("session", id, peer = %peer_addr);

                    tokio::spawn(
                        async move {
                            let _ = handler.run_session(id, peer_addr, stream).await;
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }
    }

    /// Serve a single already-accepted stream to completion.
    pub async fn handle_stream<S>(&self, stream: S, peer_addr: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.handler.run_session(id, peer_addr, stream).await
    }
}

/// Per-session view of the hop; cheap to clone into each task.
#[derive(Clone)]
struct Handler {
    config: Arc<HopConfig>,
    metrics: Arc<HopMetrics>,
}

impl Handler {
    async fn run_session<S>(&self, id: SessionId, peer_addr: SocketAddr, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.metrics.increment_connections();
        let mut session = Session::new(id, peer_addr, self.config.mode);
        tracing::debug!("accepted {} connection", self.config.mode);

        let result = match self.config.mode {
            HopMode::Entry => self.entry_session(&mut session, stream).await,
            HopMode::Terminal => self.terminal_session(&mut session, stream).await,
            HopMode::Standalone => self.standalone_session(&mut session, stream).await,
        };

        match &result {
            Ok(()) => {}
            Err(e) if e.is_dial_error() => tracing::warn!("session {} aborted: {}", id, e),
            Err(e) if e.is_protocol_error() => {
                tracing::debug!("session {} rejected malformed handshake: {}", id, e)
            }
            Err(e) => tracing::debug!("session {} aborted: {}", id, e),
        }

        session.close();
        self.metrics.decrement_sessions();
        tracing::debug!(
            "{} session {} from {} closed after {:?}",
            session.mode(),
            session.id(),
            session.peer_addr(),
            session.age()
        );
        result
    }

    fn handshake<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.metrics.increment_handshake_failures();
        }
        result
    }

    async fn dial(&self, target: &str) -> Result<TcpStream> {
        let stream = match dial(target, self.config.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.metrics.increment_dial_failures();
                return Err(e);
            }
        };
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(stream)
    }

    async fn greet<S>(&self, session: &mut Session, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let greeting = within(self.config.handshake_timeout, socks5::negotiate(stream)).await;
        self.handshake(greeting)?;
        session.advance(SessionState::Greeted);
        Ok(())
    }

    async fn entry_session<S>(&self, session: &mut Session, mut inbound: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.greet(session, &mut inbound).await?;

        let upstream_addr = self
            .config
            .upstream_addr
            .as_deref()
            .ok_or_else(|| Error::config("entry hop requires upstream_addr"))?;
        let upstream = self.dial(upstream_addr).await?;

        // The destination request is still unread on `inbound`; the
        // terminal hop parses it.
        self.relay(session, inbound, upstream).await
    }

    async fn standalone_session<S>(&self, session: &mut Session, mut inbound: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.greet(session, &mut inbound).await?;
        session.advance(SessionState::AwaitRequest);
        self.terminal_session(session, inbound).await
    }

    async fn terminal_session<S>(&self, session: &mut Session, mut inbound: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let target = if self.config.strict_reply {
            self.strict_request(&mut inbound).await?
        } else {
            let target = within(
                self.config.handshake_timeout,
                socks5::resolve_destination(&mut inbound),
            )
            .await;
            self.handshake(target)?
        };
        session.advance(SessionState::RequestResolved);

        let outbound = if self.config.strict_reply {
            match self.dial(&target.to_string()).await {
                Ok(outbound) => {
                    codec::write_connect_reply(&mut inbound).await?;
                    outbound
                }
                Err(e) => {
                    if let Err(reply_err) = socks5::reply_failure(&mut inbound, &e).await {
                        tracing::debug!("failure reply not delivered: {}", reply_err);
                    }
                    return Err(e);
                }
            }
        } else {
            self.dial(&target.to_string()).await?
        };

        tracing::info!("connected to {}", target);
        self.relay(session, inbound, outbound).await
    }

    async fn strict_request<S>(&self, inbound: &mut S) -> Result<DialTarget>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let target = within(
            self.config.handshake_timeout,
            socks5::read_destination(&mut *inbound),
        )
        .await;

        match target {
            Ok(target) => Ok(target),
            Err(e) => {
                self.metrics.increment_handshake_failures();
                if matches!(
                    e,
                    Error::UnsupportedCommand(_) | Error::UnsupportedAddressType(_)
                ) {
                    if let Err(reply_err) = socks5::reply_failure(inbound, &e).await {
                        tracing::debug!("failure reply not delivered: {}", reply_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn relay<A>(&self, session: &mut Session, inbound: A, outbound: TcpStream) -> Result<()>
    where
        A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        session.advance(SessionState::Relaying);

        let report = relay::relay(inbound, outbound).await?;
        self.metrics.record_relay(&report);

        tracing::debug!(
            "relay finished: {} bytes up, {} bytes down",
            report.forward.bytes,
            report.backward.bytes
        );
        match report.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
