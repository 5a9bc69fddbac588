use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};

/// How long [`UaStream::write_raw`] waits for a peer that stops reading
/// when the stream has no write timeout.
pub const DEFAULT_WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected bench stream. Implements `Read` and `Write`.
///
/// Besides the normal byte stream it exposes the two operations fault
/// injection needs: [`UaStream::write_raw`], which puts already-encoded
/// bytes on the socket, and [`UaStream::force_close`], which tears the
/// connection down without any protocol-level close exchange.
pub struct UaStream {
    inner: TcpStream,
    peer: SocketAddr,
    closed: bool,
}

impl Read for UaStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for UaStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl UaStream {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: stream,
            peer,
            closed: false,
        })
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of this end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Switch the socket between blocking and non-blocking mode.
    ///
    /// The flag lives on the socket itself, so clones made with
    /// [`UaStream::try_clone`] observe the change too.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.inner.set_nonblocking(nonblocking).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer: self.peer,
            closed: self.closed,
        })
    }

    /// Whether [`UaStream::force_close`] was called on this handle.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write pre-encoded bytes straight to the socket and flush.
    ///
    /// Works on blocking and non-blocking sockets alike. When the socket
    /// buffer is full the call waits for it to drain, but never longer than
    /// the write timeout (or [`DEFAULT_WRITE_STALL_TIMEOUT`] when none is
    /// set). A peer that stops reading yields `ErrorKind::TimedOut`.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed(self.peer));
        }

        let stall = self
            .inner
            .write_timeout()?
            .unwrap_or(DEFAULT_WRITE_STALL_TIMEOUT);
        let deadline = Instant::now() + stall;

        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => {
                    return Err(TransportError::Io(std::io::Error::from(
                        ErrorKind::WriteZero,
                    )))
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    self.wait_writable(deadline, offset, bytes.len())?
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    self.wait_writable(deadline, offset, bytes.len())?
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn wait_writable(&self, deadline: Instant, written: usize, total: usize) -> Result<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(peer = %self.peer, written, total, "peer stopped reading");
            return Err(TransportError::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("peer stopped reading after {written} of {total} bytes"),
            )));
        }
        self.poll_writable(remaining)
    }

    #[cfg(unix)]
    fn poll_writable(&self, timeout: Duration) -> Result<()> {
        use std::os::fd::AsRawFd;

        let mut fd = libc::pollfd {
            fd: self.inner.as_raw_fd(),
            events: libc::POLLOUT,
            revents: 0,
        };
        let millis = timeout.as_millis().clamp(1, libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `fd` points to one valid `pollfd` for the duration of the
        // call, and the descriptor is an open socket owned by this stream.
        let rc = unsafe { libc::poll(&mut fd, 1, millis) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(TransportError::Io(err));
            }
        }
        // Readiness, hangup and timeout all go back to `write`, which
        // either makes progress, reports the error or hits the deadline.
        Ok(())
    }

    #[cfg(not(unix))]
    fn poll_writable(&self, timeout: Duration) -> Result<()> {
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
        Ok(())
    }

    /// Tear the connection down abruptly.
    ///
    /// Linger is set to zero so the kernel discards unsent data and resets
    /// the connection once the last handle is dropped, then both directions
    /// are shut down so readers on any clone observe EOF immediately.
    pub fn force_close(&mut self) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed(self.peer));
        }
        self.closed = true;

        #[cfg(unix)]
        self.set_zero_linger()?;

        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => {}
            // The peer may already have gone away.
            Err(err) if err.kind() == ErrorKind::NotConnected => {}
            Err(err) => return Err(TransportError::Io(err)),
        }
        debug!(peer = %self.peer, "transport force-closed");
        Ok(())
    }

    #[cfg(unix)]
    fn set_zero_linger(&self) -> Result<()> {
        use std::os::fd::AsRawFd;

        let fd = self.inner.as_raw_fd();
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };

        // SAFETY: `linger` is a valid readable pointer for the provided size,
        // and `fd` is an open TCP socket descriptor owned by this process.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                (&linger as *const libc::linger).cast::<libc::c_void>(),
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        };

        if rc == 0 {
            Ok(())
        } else {
            Err(TransportError::Io(std::io::Error::last_os_error()))
        }
    }
}

impl std::fmt::Debug for UaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UaStream")
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}
