//! Fault injection for OPC-UA client reconnection testing.
//!
//! A client calls one of the `simulate_*_failure` methods; the
//! [`FaultSimulator`] answers synchronously with an empty result and queues
//! a deferred task. The [`BenchServer`] loop writes the method response
//! first and only then drains the queue, so the injected ERR frame or the
//! forced close always follows the response on the wire.

pub mod client;
pub mod config;
pub mod deferred;
pub mod error;
pub mod handshake;
pub mod method;
pub mod registry;
pub mod server;
pub mod simulator;
pub mod stack;

pub use client::{BenchClient, Observation, CLIENT_CHANNEL_ID};
pub use config::BenchConfig;
pub use deferred::{deferred_queue, DeferredQueue, DeferredScheduler, DeferredTask};
pub use error::{BenchError, MethodInvocationError, Result, ScheduleError, TaskError};
pub use handshake::{accept_hello, handshake_client, HandshakeResult};
pub use method::{MethodCall, MethodRegistry};
pub use registry::{RawTransport, RegisteredTransport, TransportId, TransportRegistry};
pub use server::{BenchServer, PollOutcome, Reply, ServiceStack};
pub use simulator::{FaultKind, FaultSimulator, DEFAULT_FAULT_REASON};
pub use stack::BenchCallStack;
