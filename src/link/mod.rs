use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

pub const DEFAULT_REMOTE_HOST: &str = "127.0.0.1";
pub const DEFAULT_REMOTE_PORT: u16 = 16666;

/// Close codes following the WebSocket convention the original transport used.
pub const NORMAL_CLOSE_CODE: u16 = 1000;
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;
pub const POLICY_CLOSE_CODE: u16 = 1008;

const WRITE_RETRY_DELAY: Duration = Duration::from_millis(1);
const WRITE_RETRY_LIMIT: u32 = 2_000;

/// Connection URI embedding the opaque bearer credential as a query parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkUri {
    pub host: String,
    pub port: u16,
    pub token: String,
}

impl LinkUri {
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
        }
    }

    /// Same URI with the credential masked, safe for log lines.
    pub fn redacted(&self) -> String {
        format!("storehop://{}:{}/?token=<redacted>", self.host, self.port)
    }
}

impl fmt::Display for LinkUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "storehop://{}:{}/?token={}",
            self.host,
            self.port,
            encode_query_component(&self.token)
        )
    }
}

fn encode_query_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

#[derive(Debug)]
pub enum LinkError {
    Connect { address: String, source: io::Error },
    ConfigureStream { source: io::Error },
    Preamble { source: io::Error },
    Write { source: io::Error },
    WriteStalled { pending_bytes: usize },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { address, source } => {
                write!(f, "failed to connect to remote storage at {address}: {source}")
            }
            Self::ConfigureStream { source } => {
                write!(f, "failed to configure connected stream: {source}")
            }
            Self::Preamble { source } => {
                write!(f, "failed to transmit connection preamble: {source}")
            }
            Self::Write { source } => write!(f, "failed to write wire frame: {source}"),
            Self::WriteStalled { pending_bytes } => write!(
                f,
                "wire frame write stalled with {pending_bytes} bytes pending"
            ),
        }
    }
}

impl std::error::Error for LinkError {}

/// One poll over the link: complete inbound lines plus whether the peer
/// closed its end.
#[derive(Debug, Default)]
pub struct LinkPoll {
    pub lines: Vec<String>,
    pub closed: bool,
}

/// Client side of the persistent full-duplex connection. Frames are JSON text
/// lines; the first transmitted line is the connection URI carrying the
/// bearer token, standing in for the upgrade request of the original
/// transport.
pub struct StorageLink {
    stream: TcpStream,
    peer_addr: SocketAddr,
    inbound_buffer: Vec<u8>,
}

impl StorageLink {
    pub fn connect(uri: &LinkUri) -> Result<Self, LinkError> {
        let address = format!("{}:{}", uri.host, uri.port);
        let stream = TcpStream::connect(&address).map_err(|source| LinkError::Connect {
            address: address.clone(),
            source,
        })?;
        stream
            .set_nodelay(true)
            .map_err(|source| LinkError::ConfigureStream { source })?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|source| LinkError::ConfigureStream { source })?;

        let mut link = Self {
            stream,
            peer_addr,
            inbound_buffer: Vec::new(),
        };

        // Preamble while still blocking, then switch to the non-blocking
        // mode the session pump expects.
        link.write_line_blocking(&uri.to_string())
            .map_err(|source| LinkError::Preamble { source })?;
        link.stream
            .set_nonblocking(true)
            .map_err(|source| LinkError::ConfigureStream { source })?;

        Ok(link)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Writes one frame line, retrying short non-blocking stalls.
    pub fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');

        let mut written = 0;
        let mut retries = 0;
        while written < frame.len() {
            match self.stream.write(&frame[written..]) {
                Ok(0) => {
                    return Err(LinkError::Write {
                        source: io::Error::new(io::ErrorKind::WriteZero, "peer stopped reading"),
                    });
                }
                Ok(count) => written += count,
                Err(source) if source.kind() == io::ErrorKind::WouldBlock => {
                    retries += 1;
                    if retries > WRITE_RETRY_LIMIT {
                        return Err(LinkError::WriteStalled {
                            pending_bytes: frame.len() - written,
                        });
                    }
                    thread::sleep(WRITE_RETRY_DELAY);
                }
                Err(source) if source.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(LinkError::Write { source }),
            }
        }
        Ok(())
    }

    /// Drains whatever the socket currently holds and splits it into complete
    /// lines; a partial trailing line stays buffered for the next poll.
    pub fn poll(&mut self) -> io::Result<LinkPoll> {
        let mut poll = LinkPoll::default();
        let mut chunk = [0_u8; 4096];

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    poll.closed = true;
                    break;
                }
                Ok(count) => self.inbound_buffer.extend_from_slice(&chunk[..count]),
                Err(source) if source.kind() == io::ErrorKind::WouldBlock => break,
                Err(source) if source.kind() == io::ErrorKind::Interrupted => {}
                // A reset peer is a close, not a poll failure; the session
                // tears down the same way as for an orderly shutdown.
                Err(source)
                    if matches!(
                        source.kind(),
                        io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::BrokenPipe
                    ) =>
                {
                    poll.closed = true;
                    break;
                }
                Err(source) => return Err(source),
            }
        }

        while let Some(newline_at) = self.inbound_buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.inbound_buffer.drain(..=newline_at).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }
            poll.lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        Ok(poll)
    }

    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn write_line_blocking(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()
    }
}
