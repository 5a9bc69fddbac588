//! OPC-UA test bench with client-triggered fault injection.
//!
//! Clients under test call a bench method and receive a normal response,
//! followed by an injected `ERR` message or an abrupt connection reset.
//! Used to exercise reconnection logic.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoint and the raw stream handle
//! - [`frame`]: message header, ERR/HEL/ACK bodies and the chunk codec
//! - [`fault`]: transport registry, fault simulator and the bench server

/// Re-export transport types.
pub mod transport {
    pub use uabench_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use uabench_frame::*;
}

/// Re-export fault injection types.
pub mod fault {
    pub use uabench_fault::*;
}
