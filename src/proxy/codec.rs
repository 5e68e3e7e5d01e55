//! SOCKS5 wire framing for the CONNECT-over-domain-name subset.
//!
//! ```text
//! greeting:  [05][N][method_1 .. method_N]
//! selection: [05][method]
//! request:   [05][01][00][03][L][domain, L bytes][port, u16 BE]
//! reply:     [05][REP][00][01][00 00 00 00][00 00]
//! ```
//!
//! Readers pull exactly the bytes of the frame they decode and nothing
//! more, so whatever follows on the stream is left untouched for the next
//! consumer.

use std::fmt;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// SOCKS protocol version.
pub const SOCKS5_VERSION: u8 = 0x05;

/// "No authentication required" method.
pub const METHOD_NO_AUTH: u8 = 0x00;

/// CONNECT command.
pub const CMD_CONNECT: u8 = 0x01;
/// BIND command (rejected).
pub const CMD_BIND: u8 = 0x02;
/// UDP ASSOCIATE command (rejected).
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

/// IPv4 address type (rejected).
pub const ATYP_IPV4: u8 = 0x01;
/// Domain name address type.
pub const ATYP_DOMAIN: u8 = 0x03;
/// IPv6 address type (rejected).
pub const ATYP_IPV6: u8 = 0x04;

/// Reply: succeeded.
pub const REPLY_SUCCEEDED: u8 = 0x00;
/// Reply: general SOCKS server failure.
pub const REPLY_GENERAL_FAILURE: u8 = 0x01;
/// Reply: host unreachable.
pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
/// Reply: connection refused.
pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;
/// Reply: command not supported.
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
/// Reply: address type not supported.
pub const REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// Length of a connect reply frame.
pub const CONNECT_REPLY_LEN: usize = 10;

/// Success reply with the bound address and port zeroed.
pub const CONNECT_REPLY_SUCCESS: [u8; CONNECT_REPLY_LEN] =
    [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

async fn read_byte<R>(reader: &mut R, field: &'static str) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    reader
        .read_u8()
        .await
        .map_err(|e| Error::from_field_read(field, e))
}

async fn read_version<R>(reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let version = read_byte(reader, "version").await?;
    if version != SOCKS5_VERSION {
        return Err(Error::ProtocolVersionMismatch {
            expected: SOCKS5_VERSION,
            actual: version,
        });
    }
    Ok(())
}

/// Read a 1-byte length prefix followed by exactly that many bytes.
async fn read_prefixed<R>(reader: &mut R, field: &'static str) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = read_byte(reader, field).await? as usize;
    let mut data = vec![0u8; len];
    reader
        .read_exact(&mut data)
        .await
        .map_err(|e| Error::from_field_read(field, e))?;
    Ok(data)
}

fn check_prefixed_len(field: &'static str, len: usize) -> Result<()> {
    if len > u8::MAX as usize {
        return Err(Error::FieldTooLong { field, len });
    }
    Ok(())
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Client greeting: the offered authentication methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    methods: Vec<u8>,
}

impl Greeting {
    /// Build a greeting offering `methods` (at most 255).
    pub fn new(methods: impl Into<Vec<u8>>) -> Result<Self> {
        let methods = methods.into();
        check_prefixed_len("methods", methods.len())?;
        Ok(Self { methods })
    }

    /// Greeting offering only "no authentication".
    pub fn no_auth() -> Self {
        Self {
            methods: vec![METHOD_NO_AUTH],
        }
    }

    /// Offered methods, in wire order.
    pub fn methods(&self) -> &[u8] {
        &self.methods
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        2 + self.methods.len()
    }

    /// Append the wire form to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(SOCKS5_VERSION);
        buf.put_u8(self.methods.len() as u8);
        buf.put_slice(&self.methods);
    }

    /// Decode a greeting, consuming exactly its bytes.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        read_version(reader).await?;
        let methods = read_prefixed(reader, "methods").await?;
        Ok(Self { methods })
    }

    /// Write the greeting to `writer`.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        write_frame(writer, &buf).await
    }
}

/// Server method selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationReply {
    /// Selected method
    pub method: u8,
}

impl NegotiationReply {
    /// Selection of "no authentication".
    pub const NO_AUTH: Self = Self {
        method: METHOD_NO_AUTH,
    };

    /// Wire form.
    pub fn to_bytes(self) -> [u8; 2] {
        [SOCKS5_VERSION, self.method]
    }

    /// Decode a selection message.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        read_version(reader).await?;
        let method = read_byte(reader, "method").await?;
        Ok(Self { method })
    }

    /// Write the selection to `writer`.
    pub async fn write_to<W>(self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_frame(writer, &self.to_bytes()).await
    }
}

/// Request command. Only CONNECT is understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Establish a TCP relay to the destination.
    Connect,
}

impl Command {
    /// Wire code.
    pub fn code(self) -> u8 {
        match self {
            Command::Connect => CMD_CONNECT,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            CMD_CONNECT => Ok(Command::Connect),
            other => Err(Error::UnsupportedCommand(other)),
        }
    }
}

/// Destination request for a domain-name CONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRequest {
    /// Requested command
    pub command: Command,
    address: Vec<u8>,
    /// Destination port
    pub port: u16,
}

impl DestinationRequest {
    /// Build a CONNECT request for `host:port` (host at most 255 bytes).
    pub fn connect(host: impl Into<Vec<u8>>, port: u16) -> Result<Self> {
        let address = host.into();
        check_prefixed_len("address", address.len())?;
        Ok(Self {
            command: Command::Connect,
            address,
            port,
        })
    }

    /// Raw domain bytes as sent on the wire.
    pub fn address(&self) -> &[u8] {
        &self.address
    }

    /// Dial target formatted from this request.
    ///
    /// Fails with [`Error::InvalidDomain`] if the domain is not UTF-8.
    pub fn target(&self) -> Result<DialTarget> {
        let host = std::str::from_utf8(&self.address).map_err(|_| Error::InvalidDomain {
            len: self.address.len(),
        })?;
        Ok(DialTarget {
            host: host.to_string(),
            port: self.port,
        })
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + 1 + self.address.len() + 2
    }

    /// Append the wire form to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(SOCKS5_VERSION);
        buf.put_u8(self.command.code());
        buf.put_u8(0x00);
        buf.put_u8(ATYP_DOMAIN);
        buf.put_u8(self.address.len() as u8);
        buf.put_slice(&self.address);
        buf.put_u16(self.port);
    }

    /// Decode and validate a request, consuming exactly its bytes.
    ///
    /// Stops at the first field that fails validation; nothing after that
    /// field is read.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        read_version(reader).await?;
        let command = Command::from_code(read_byte(reader, "command").await?)?;
        let _reserved = read_byte(reader, "reserved").await?;

        let atyp = read_byte(reader, "address type").await?;
        if atyp != ATYP_DOMAIN {
            return Err(Error::UnsupportedAddressType(atyp));
        }

        let address = read_prefixed(reader, "address").await?;
        let port = reader
            .read_u16()
            .await
            .map_err(|e| Error::from_field_read("port", e))?;

        Ok(Self {
            command,
            address,
            port,
        })
    }

    /// Write the request to `writer`.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        write_frame(writer, &buf).await
    }
}

/// Reply to a destination request. The bound address is always zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReply {
    /// Reply code, [`REPLY_SUCCEEDED`] on success
    pub code: u8,
}

impl ConnectReply {
    /// The fixed success frame.
    pub const SUCCESS: Self = Self {
        code: REPLY_SUCCEEDED,
    };

    /// Failure reply carrying `code`.
    pub fn failure(code: u8) -> Self {
        Self { code }
    }

    /// Whether this reply reports success.
    pub fn is_success(self) -> bool {
        self.code == REPLY_SUCCEEDED
    }

    /// Wire form.
    pub fn to_bytes(self) -> [u8; CONNECT_REPLY_LEN] {
        let mut frame = CONNECT_REPLY_SUCCESS;
        frame[1] = self.code;
        frame
    }

    /// Decode a reply. Only the zeroed IPv4 bound-address form is accepted.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        read_version(reader).await?;
        let code = read_byte(reader, "reply code").await?;
        let _reserved = read_byte(reader, "reserved").await?;

        let atyp = read_byte(reader, "address type").await?;
        if atyp != ATYP_IPV4 {
            return Err(Error::UnsupportedAddressType(atyp));
        }

        let mut bound = [0u8; 6];
        reader
            .read_exact(&mut bound)
            .await
            .map_err(|e| Error::from_field_read("bound address", e))?;

        Ok(Self { code })
    }

    /// Write the reply to `writer`.
    pub async fn write_to<W>(self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_frame(writer, &self.to_bytes()).await
    }
}

/// `host:port` string handed to the dialer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialTarget {
    /// Host name
    pub host: String,
    /// Port
    pub port: u16,
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Read the client greeting.
pub async fn read_greeting<R>(reader: &mut R) -> Result<Greeting>
where
    R: AsyncRead + Unpin,
{
    Greeting::read_from(reader).await
}

/// Write `[05, method]`.
pub async fn write_negotiation_reply<W>(writer: &mut W, method: u8) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    NegotiationReply { method }.write_to(writer).await
}

/// Read and validate a destination request.
pub async fn read_destination_request<R>(reader: &mut R) -> Result<DestinationRequest>
where
    R: AsyncRead + Unpin,
{
    DestinationRequest::read_from(reader).await
}

/// Write the fixed 10-byte success reply.
pub async fn write_connect_reply<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    ConnectReply::SUCCESS.write_to(writer).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_bytes(atyp: u8, domain: &[u8], port: u16) -> Vec<u8> {
        let mut bytes = vec![0x05, 0x01, 0x00, atyp, domain.len() as u8];
        bytes.extend_from_slice(domain);
        bytes.extend_from_slice(&port.to_be_bytes());
        bytes
    }

    #[tokio::test]
    async fn test_greeting_roundtrip_bounds() {
        for count in [0usize, 1, 3, 255] {
            let methods: Vec<u8> = (0..count).map(|i| i as u8).collect();
            let greeting = Greeting::new(methods.clone()).unwrap();

            let mut buf = BytesMut::new();
            greeting.encode(&mut buf);
            assert_eq!(buf.len(), 2 + count);

            let mut input: &[u8] = &buf;
            let decoded = read_greeting(&mut input).await.unwrap();
            assert_eq!(decoded.methods(), &methods[..]);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn test_greeting_rejects_too_many_methods() {
        let err = Greeting::new(vec![0u8; 256]).unwrap_err();
        assert!(matches!(err, Error::FieldTooLong { field: "methods", len: 256 }));
    }

    #[tokio::test]
    async fn test_greeting_leaves_trailing_bytes() {
        let mut input: &[u8] = &[0x05, 0x01, 0x00, 0x05, 0x01];
        let greeting = read_greeting(&mut input).await.unwrap();
        assert_eq!(greeting.methods(), &[0x00]);
        assert_eq!(input, &[0x05, 0x01]);
    }

    #[tokio::test]
    async fn test_version_gate_consumes_one_byte() {
        let mut input: &[u8] = &[0x04, 0x01, 0x00];
        let err = read_greeting(&mut input).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolVersionMismatch {
                expected: 5,
                actual: 4
            }
        ));
        assert_eq!(input.len(), 2);

        let bytes = request_bytes(ATYP_DOMAIN, b"example.com", 443);
        let mut tampered = bytes.clone();
        tampered[0] = 0x04;
        let mut input: &[u8] = &tampered;
        let err = read_destination_request(&mut input).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolVersionMismatch { .. }));
        assert_eq!(input.len(), bytes.len() - 1);
    }

    #[tokio::test]
    async fn test_request_localhost_port_80() {
        let wire: Vec<u8> = [
            &[0x05, 0x01, 0x00, 0x03, 0x09][..],
            b"localhost",
            &[0x00, 0x50],
        ]
        .concat();
        let mut input: &[u8] = &wire;
        let request = read_destination_request(&mut input).await.unwrap();

        assert_eq!(request.command, Command::Connect);
        assert_eq!(request.address(), b"localhost");
        assert_eq!(request.port, 80);
        assert_eq!(request.target().unwrap().to_string(), "localhost:80");
    }

    #[tokio::test]
    async fn test_request_roundtrip_bounds() {
        let long = vec![b'a'; 255];
        let cases: [(&[u8], u16); 4] = [
            (b"", 0),
            (b"a", 1),
            (b"example.com", 32768),
            (long.as_slice(), 65535),
        ];

        for (host, port) in cases {
            let request = DestinationRequest::connect(host, port).unwrap();
            let mut buf = BytesMut::new();
            request.encode(&mut buf);
            assert_eq!(buf.len(), request.encoded_len());

            let mut input: &[u8] = &buf;
            let decoded = read_destination_request(&mut input).await.unwrap();
            assert_eq!(decoded, request);
            assert!(input.is_empty());
        }
    }

    #[tokio::test]
    async fn test_high_ports_are_unsigned() {
        let bytes = request_bytes(ATYP_DOMAIN, b"example.com", 0xFFFF);
        let mut input: &[u8] = &bytes;
        let request = read_destination_request(&mut input).await.unwrap();
        assert_eq!(request.target().unwrap().to_string(), "example.com:65535");

        let bytes = request_bytes(ATYP_DOMAIN, b"example.com", 40000);
        let mut input: &[u8] = &bytes;
        let request = read_destination_request(&mut input).await.unwrap();
        assert_eq!(request.port, 40000);
    }

    #[tokio::test]
    async fn test_address_type_gate() {
        for atyp in [ATYP_IPV4, ATYP_IPV6] {
            let bytes = request_bytes(atyp, &[127, 0, 0, 1], 80);
            let mut input: &[u8] = &bytes;
            let err = read_destination_request(&mut input).await.unwrap_err();
            assert!(matches!(err, Error::UnsupportedAddressType(t) if t == atyp));
        }
    }

    #[tokio::test]
    async fn test_command_gate() {
        for cmd in [CMD_BIND, CMD_UDP_ASSOCIATE] {
            let mut bytes = request_bytes(ATYP_DOMAIN, b"example.com", 80);
            bytes[1] = cmd;
            let mut input: &[u8] = &bytes;
            let err = read_destination_request(&mut input).await.unwrap_err();
            assert!(matches!(err, Error::UnsupportedCommand(c) if c == cmd));
        }
    }

    #[tokio::test]
    async fn test_reserved_byte_unchecked() {
        let mut bytes = request_bytes(ATYP_DOMAIN, b"example.com", 80);
        bytes[2] = 0xAB;
        let mut input: &[u8] = &bytes;
        assert!(read_destination_request(&mut input).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_utf8_domain_rejected() {
        let bytes = request_bytes(ATYP_DOMAIN, &[b'a', 0xff, 0xfe], 80);
        let mut input: &[u8] = &bytes;
        let request = read_destination_request(&mut input).await.unwrap();
        assert_eq!(request.address(), &[b'a', 0xff, 0xfe]);

        let err = request.target().unwrap_err();
        assert!(matches!(err, Error::InvalidDomain { len: 3 }));
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_short_reads() {
        let mut input: &[u8] = &[0x05, 0x03, 0x00];
        let err = read_greeting(&mut input).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { field: "methods" }));

        let mut input: &[u8] = &[0x05];
        let err = read_greeting(&mut input).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { field: "methods" }));

        let full = request_bytes(ATYP_DOMAIN, b"example.com", 443);
        // Cut inside the address and inside the port.
        for (cut, field) in [(8, "address"), (full.len() - 1, "port")] {
            let mut input: &[u8] = &full[..cut];
            let err = read_destination_request(&mut input).await.unwrap_err();
            assert!(
                matches!(err, Error::ShortRead { field: f } if f == field),
                "cut at {}: {:?}",
                cut,
                err
            );
        }

        let mut input: &[u8] = &[];
        let err = read_destination_request(&mut input).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { field: "version" }));
    }

    #[tokio::test]
    async fn test_negotiation_reply_bytes() {
        let mut out = Vec::new();
        write_negotiation_reply(&mut out, METHOD_NO_AUTH).await.unwrap();
        assert_eq!(out, vec![0x05, 0x00]);

        let mut input: &[u8] = &out;
        assert_eq!(
            NegotiationReply::read_from(&mut input).await.unwrap(),
            NegotiationReply::NO_AUTH
        );
    }

    #[tokio::test]
    async fn test_connect_reply_bytes() {
        let mut out = Vec::new();
        write_connect_reply(&mut out).await.unwrap();
        assert_eq!(out, CONNECT_REPLY_SUCCESS.to_vec());

        let mut input: &[u8] = &out;
        let reply = ConnectReply::read_from(&mut input).await.unwrap();
        assert!(reply.is_success());

        let failure = ConnectReply::failure(REPLY_GENERAL_FAILURE).to_bytes();
        assert_eq!(failure, [0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }
}
