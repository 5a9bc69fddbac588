use std::net::SocketAddr;

/// Errors that can occur in bench transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint address could not be resolved.
    #[error("endpoint address {0} did not resolve")]
    Unresolved(String),

    /// The stream was already torn down.
    #[error("transport to {0} already closed")]
    Closed(SocketAddr),
}

pub type Result<T> = std::result::Result<T, TransportError>;
