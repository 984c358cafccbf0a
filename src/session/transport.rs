//! Duplex transport: WebSocket connection setup and the frame-level seam
//! the session loop runs against.

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::cancel::CancelToken;
use crate::error::{PodioError, Result};

/// Frame-level operations the session controller needs from a connection.
pub trait FrameTransport {
    /// Send one text frame.
    fn send_text(&mut self, text: String) -> tungstenite::Result<()>;

    /// Write out frames still buffered after a timed-out send.
    fn flush(&mut self) -> tungstenite::Result<()>;

    /// Block until the next frame arrives or the read times out.
    fn read_frame(&mut self) -> tungstenite::Result<Message>;

    /// Best-effort close. Errors are ignored; the connection is going away.
    fn close(&mut self);
}

impl<S: Read + Write> FrameTransport for WebSocket<S> {
    fn send_text(&mut self, text: String) -> tungstenite::Result<()> {
        self.send(Message::Text(text))
    }

    fn flush(&mut self) -> tungstenite::Result<()> {
        WebSocket::flush(self)
    }

    fn read_frame(&mut self) -> tungstenite::Result<Message> {
        self.read()
    }

    fn close(&mut self) {
        let _ = WebSocket::close(self, None);
        let _ = WebSocket::flush(self);
    }
}

/// Socket-level timeouts for a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Upper bound for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Read/write timeout; the cancel token is checked each time it elapses.
    pub poll_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub type Connection = WebSocket<MaybeTlsStream<TcpStream>>;

/// Granularity of the pending-connect check.
const CONNECT_STEP: Duration = Duration::from_millis(5);

/// Open a WebSocket connection to `uri` (`ws://` or `wss://`).
pub fn connect(uri: &str, options: &ConnectOptions, cancel: &CancelToken) -> Result<Connection> {
    let request = uri.into_client_request().map_err(PodioError::connect)?;
    let target = request.uri();
    let host = target
        .host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| {
            PodioError::connect(tungstenite::Error::Url(
                tungstenite::error::UrlError::NoHostName,
            ))
        })?;
    let port = target.port_u16().unwrap_or(match target.scheme_str() {
        Some("wss") => 443,
        _ => 80,
    });

    let stream = open_tcp(&host, port, options, cancel)?;
    stream
        .set_read_timeout(Some(options.poll_interval))
        .map_err(io_connect_error)?;
    stream
        .set_write_timeout(Some(options.poll_interval))
        .map_err(io_connect_error)?;
    stream.set_nodelay(true).map_err(io_connect_error)?;

    debug!(host = %host, port, "websocket handshake");
    let mut attempt = tungstenite::client_tls_with_config(request, stream, None, None);
    loop {
        match attempt {
            Ok((socket, response)) => {
                debug!(status = %response.status(), "websocket connected");
                return Ok(socket);
            }
            Err(HandshakeError::Interrupted(mid)) => {
                if cancel.is_cancelled() {
                    return Err(PodioError::Cancelled);
                }
                attempt = mid.handshake();
            }
            Err(HandshakeError::Failure(err)) => return Err(PodioError::connect(err)),
        }
    }
}

fn open_tcp(
    host: &str,
    port: u16,
    options: &ConnectOptions,
    cancel: &CancelToken,
) -> Result<TcpStream> {
    let addrs = resolve(host, port, options, cancel)?;
    let mut last_err = None;
    for addr in addrs {
        match connect_addr(addr, options, cancel) {
            Ok(stream) => return Ok(stream),
            Err(PodioError::Cancelled) => return Err(PodioError::Cancelled),
            Err(e) => {
                debug!(%addr, error = %e, "tcp connect failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io_connect_error(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        ))
    }))
}

/// Resolve `host`. Name lookups run on a short-lived thread so a cancel
/// does not have to wait for the resolver.
fn resolve(
    host: &str,
    port: u16,
    options: &ConnectOptions,
    cancel: &CancelToken,
) -> Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    if cancel.is_cancelled() {
        return Err(PodioError::Cancelled);
    }
    let (tx, rx) = mpsc::channel();
    let target = (host.to_string(), port);
    thread::Builder::new()
        .name("podio-resolve".to_string())
        .spawn(move || {
            let _ = tx.send(target.to_socket_addrs().map(Iterator::collect));
        })
        .map_err(io_connect_error)?;
    recv_cancellable(&rx, options.poll_interval, cancel)?.map_err(io_connect_error)
}

/// Wait for one value on `rx`, checking `cancel` every `poll`.
fn recv_cancellable<T>(rx: &Receiver<T>, poll: Duration, cancel: &CancelToken) -> Result<T> {
    loop {
        if cancel.is_cancelled() {
            return Err(PodioError::Cancelled);
        }
        match rx.recv_timeout(poll) {
            Ok(value) => return Ok(value),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(io_connect_error(io::Error::other("resolver exited")))
            }
        }
    }
}

/// Non-blocking connect to one address, bounded by `connect_timeout`.
fn connect_addr(
    addr: SocketAddr,
    options: &ConnectOptions,
    cancel: &CancelToken,
) -> Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(io_connect_error)?;
    socket.set_nonblocking(true).map_err(io_connect_error)?;
    if let Err(e) = socket.connect(&addr.into()) {
        if !connect_in_progress(&e) {
            return Err(io_connect_error(e));
        }
    }

    let deadline = Instant::now() + options.connect_timeout;
    wait_until_connected(|| poll_connected(&socket), deadline, options.poll_interval, cancel)?;
    socket.set_nonblocking(false).map_err(io_connect_error)?;
    Ok(socket.into())
}

#[cfg(unix)]
fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(not(unix))]
fn connect_in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

/// `Ok(true)` once the pending connect has completed.
fn poll_connected(socket: &Socket) -> io::Result<bool> {
    if let Some(e) = socket.take_error()? {
        return Err(e);
    }
    match socket.peer_addr() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
        Err(e) => Err(e),
    }
}

fn wait_until_connected(
    mut connected: impl FnMut() -> io::Result<bool>,
    deadline: Instant,
    poll: Duration,
    cancel: &CancelToken,
) -> Result<()> {
    let step = poll.min(CONNECT_STEP);
    loop {
        if connected().map_err(io_connect_error)? {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PodioError::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(io_connect_error(io::Error::from(io::ErrorKind::TimedOut)));
        }
        thread::sleep(step);
    }
}

fn io_connect_error(e: io::Error) -> PodioError {
    PodioError::connect(tungstenite::Error::Io(e))
}

/// Whether a read error is just the poll timeout elapsing.
pub fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    )
}
