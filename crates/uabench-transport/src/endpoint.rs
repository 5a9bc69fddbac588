use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::UaStream;

/// URL scheme of OPC-UA binary TCP endpoints.
pub const OPC_TCP_SCHEME: &str = "opc.tcp://";

/// Listening TCP endpoint for the bench.
///
/// Accepts plain `host:port` addresses as well as `opc.tcp://host:port/path`
/// endpoint URLs; the path component is ignored at this layer.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on `addr`.
    pub fn bind(addr: &str) -> Result<Self> {
        let authority = authority(addr);
        let listener = TcpListener::bind(authority).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(%local_addr, "listening on tcp endpoint");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking unless the endpoint was made
    /// non-blocking).
    pub fn accept(&self) -> Result<UaStream> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        // Accepted sockets do not inherit the listener's non-blocking flag
        // on every platform; normalise to blocking.
        stream.set_nonblocking(false)?;
        debug!(peer = %addr, "accepted connection");
        UaStream::from_tcp(stream)
    }

    /// Accept a pending connection without blocking.
    ///
    /// Returns `Ok(None)` when nobody is waiting. The endpoint must have been
    /// switched to non-blocking mode first.
    pub fn try_accept(&self) -> Result<Option<UaStream>> {
        match self.accept() {
            Ok(stream) => Ok(Some(stream)),
            Err(TransportError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Switch the listener between blocking and non-blocking accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Connect to a listening endpoint (blocking).
    pub fn connect(addr: &str) -> Result<UaStream> {
        let stream = TcpStream::connect(authority(addr)).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr, "connected to tcp endpoint");
        UaStream::from_tcp(stream)
    }

    /// Connect with an upper bound on the time spent per resolved address.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<UaStream> {
        let resolved = authority(addr)
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?
            .collect::<Vec<_>>();
        if resolved.is_empty() {
            return Err(TransportError::Unresolved(addr.to_string()));
        }

        let mut last_err = None;
        for candidate in resolved {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    debug!(addr, %candidate, "connected to tcp endpoint");
                    return UaStream::from_tcp(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(TransportError::Connect {
            addr: addr.to_string(),
            source: last_err.unwrap_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound)),
        })
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Endpoint URL clients should put in their Hello.
    pub fn endpoint_url(&self) -> String {
        format!("{OPC_TCP_SCHEME}{}", self.local_addr)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "opc-tcp"
    }
}

/// Strip the `opc.tcp://` scheme and any path from an endpoint URL.
///
/// Plain `host:port` strings are returned unchanged.
pub fn authority(addr: &str) -> &str {
    let rest = addr.strip_prefix(OPC_TCP_SCHEME).unwrap_or(addr);
    match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}
