//! TCP transport for the OPC-UA test bench.
//!
//! This is the lowest layer of uabench. It provides:
//! - [`TcpEndpoint`] to bind, accept and connect `opc.tcp` style endpoints
//! - [`UaStream`], a connected stream that supports raw writes and an
//!   abrupt, RST-style close used for fault injection

pub mod endpoint;
pub mod error;
pub mod stream;

pub use endpoint::TcpEndpoint;
pub use error::{Result, TransportError};
pub use stream::{UaStream, DEFAULT_WRITE_STALL_TIMEOUT};
