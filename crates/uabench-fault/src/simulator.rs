//! Client-triggered fault injection.
//!
//! Each `simulate_*` entry point only queues work: the response to the
//! method call has to reach the client before the fault does.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use tracing::{debug, info, warn};
use uabench_frame::{build_error_frame, StatusCode};

use crate::deferred::DeferredScheduler;
use crate::error::{MethodInvocationError, TaskError};
use crate::method::MethodRegistry;
use crate::registry::TransportRegistry;

/// Reason text carried by injected ERR frames unless configured otherwise.
pub const DEFAULT_FAULT_REASON: &str = "test bench simulation";

/// The failures a client can ask the bench to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Abrupt teardown of every live transport.
    Connection,
    SecureChannel,
    Session,
    Subscription,
}

impl FaultKind {
    pub const ALL: [FaultKind; 4] = [
        FaultKind::Connection,
        FaultKind::SecureChannel,
        FaultKind::Session,
        FaultKind::Subscription,
    ];

    /// Name under which the fault is exposed as a callable method.
    pub fn method_name(self) -> &'static str {
        match self {
            FaultKind::Connection => "simulate_connection_failure",
            FaultKind::SecureChannel => "simulate_securechannel_failure",
            FaultKind::Session => "simulate_session_failure",
            FaultKind::Subscription => "simulate_subscription_failure",
        }
    }

    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.method_name() == name)
    }

    /// Status carried by the injected ERR frame. `None` for a connection
    /// failure, which writes nothing.
    pub fn status_code(self) -> Option<StatusCode> {
        match self {
            FaultKind::Connection => None,
            FaultKind::SecureChannel => Some(StatusCode::BAD_SECURE_CHANNEL_ID_INVALID),
            FaultKind::Session => Some(StatusCode::BAD_SESSION_ID_INVALID),
            FaultKind::Subscription => Some(StatusCode::BAD_SUBSCRIPTION_ID_INVALID),
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

impl FromStr for FaultKind {
    type Err = MethodInvocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_method_name(s).ok_or_else(|| MethodInvocationError::UnknownMethod(s.to_string()))
    }
}

/// Schedules faults against the server's live transports.
#[derive(Debug, Clone)]
pub struct FaultSimulator {
    scheduler: DeferredScheduler,
    reason: Option<String>,
}

impl FaultSimulator {
    /// `reason` is written into every injected ERR frame; `None` encodes a
    /// null string.
    pub fn new(scheduler: DeferredScheduler, reason: Option<String>) -> Self {
        Self { scheduler, reason }
    }

    /// A simulator using [`DEFAULT_FAULT_REASON`].
    pub fn with_default_reason(scheduler: DeferredScheduler) -> Self {
        Self::new(scheduler, Some(DEFAULT_FAULT_REASON.to_string()))
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Queue the fault for `kind`. Returns as soon as the task is queued.
    pub fn simulate(&self, kind: FaultKind) -> Result<(), MethodInvocationError> {
        match kind.status_code() {
            None => self.schedule_close_all(kind),
            Some(status) => {
                let frame = build_error_frame(status, self.reason.as_deref())?;
                self.schedule_error_frame(kind, frame)
            }
        }
    }

    pub fn simulate_connection_failure(&self) -> Result<(), MethodInvocationError> {
        self.simulate(FaultKind::Connection)
    }

    pub fn simulate_secure_channel_failure(&self) -> Result<(), MethodInvocationError> {
        self.simulate(FaultKind::SecureChannel)
    }

    pub fn simulate_session_failure(&self) -> Result<(), MethodInvocationError> {
        self.simulate(FaultKind::Session)
    }

    pub fn simulate_subscription_failure(&self) -> Result<(), MethodInvocationError> {
        self.simulate(FaultKind::Subscription)
    }

    /// Expose every [`FaultKind`] as a zero-argument method.
    pub fn register_methods(&self, methods: &mut MethodRegistry) {
        for kind in FaultKind::ALL {
            let simulator = self.clone();
            methods.register(kind.method_name(), move |call| {
                call.expect_inputs(0)?;
                simulator.simulate(kind)?;
                Ok(Vec::new())
            });
        }
    }

    fn schedule_close_all(&self, kind: FaultKind) -> Result<(), MethodInvocationError> {
        self.scheduler.schedule(kind.method_name(), close_all)?;
        Ok(())
    }

    fn schedule_error_frame(
        &self,
        kind: FaultKind,
        frame: Bytes,
    ) -> Result<(), MethodInvocationError> {
        self.scheduler.schedule(kind.method_name(), move |registry| {
            inject_frame(registry, kind, &frame)
        })?;
        Ok(())
    }
}

fn close_all(registry: &mut TransportRegistry) -> Result<(), TaskError> {
    if registry.is_empty() {
        debug!("no active transport; connection failure skipped");
        return Ok(());
    }

    let total = registry.len();
    let mut failed = 0;
    for entry in registry.iter_mut() {
        let id = entry.id();
        match entry.transport_mut().force_close() {
            Ok(()) => info!(transport = %id, peer = %entry.peer_label(), "transport force-closed"),
            Err(err) => {
                warn!(transport = %id, error = %err, "force close failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(TaskError::CloseFailed { failed, total });
    }
    Ok(())
}

fn inject_frame(
    registry: &mut TransportRegistry,
    kind: FaultKind,
    frame: &[u8],
) -> Result<(), TaskError> {
    let Some(entry) = registry.first_mut() else {
        debug!(fault = %kind, "no active transport; fault skipped");
        return Ok(());
    };

    let id = entry.id();
    if let Err(source) = entry.transport_mut().write_raw(frame) {
        // A partial frame leaves the stream unusable; the server reaps the
        // closed transport on its next poll.
        if let Err(err) = entry.transport_mut().force_close() {
            debug!(transport = %id, error = %err, "close after failed injection");
        }
        return Err(TaskError::Transport {
            transport: id,
            source,
        });
    }
    info!(transport = %id, fault = %kind, bytes = frame.len(), "error frame injected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use uabench_frame::{decode_header, ErrorMessage, MessageType, Variant, HEADER_SIZE};

    use super::*;
    use crate::deferred::deferred_queue;
    use crate::method::MethodCall;
    use crate::registry::testing::RecordingTransport;

    fn decode_err(frame: &[u8]) -> ErrorMessage {
        let header = decode_header(frame).unwrap();
        assert_eq!(header.message_type, MessageType::Error);
        assert_eq!(header.body_size as usize, frame.len() - HEADER_SIZE);
        ErrorMessage::decode(&frame[HEADER_SIZE..]).unwrap()
    }

    #[test]
    fn method_names() {
        assert_eq!(
            FaultKind::ALL.map(FaultKind::method_name),
            [
                "simulate_connection_failure",
                "simulate_securechannel_failure",
                "simulate_session_failure",
                "simulate_subscription_failure",
            ]
        );
        for kind in FaultKind::ALL {
            assert_eq!(kind.method_name().parse::<FaultKind>().unwrap(), kind);
        }
        assert!(FaultKind::from_method_name("simulate_everything").is_none());
    }

    #[test]
    fn nothing_is_written_before_the_drain() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut registry = TransportRegistry::new();
        let (transport, log) = RecordingTransport::new("client");
        registry.insert(Box::new(transport));

        simulator.simulate_session_failure().unwrap();
        assert!(log.lock().unwrap().writes.is_empty());

        assert_eq!(queue.run_ready(&mut registry), 1);
        let writes = &log.lock().unwrap().writes;
        assert_eq!(writes.len(), 1);
        let message = decode_err(&writes[0]);
        assert_eq!(message.status, StatusCode::BAD_SESSION_ID_INVALID);
        assert_eq!(message.reason.as_deref(), Some(DEFAULT_FAULT_REASON));
    }

    #[test]
    fn each_error_fault_writes_its_status() {
        for kind in [FaultKind::SecureChannel, FaultKind::Session, FaultKind::Subscription] {
            let (scheduler, mut queue) = deferred_queue();
            let simulator = FaultSimulator::with_default_reason(scheduler);
            let mut registry = TransportRegistry::new();
            let (transport, log) = RecordingTransport::new("client");
            registry.insert(Box::new(transport));

            simulator.simulate(kind).unwrap();
            queue.run_ready(&mut registry);

            let log = log.lock().unwrap();
            assert_eq!(log.writes.len(), 1);
            assert_eq!(Some(decode_err(&log.writes[0]).status), kind.status_code());
            assert_eq!(log.closes, 0);
        }
    }

    #[test]
    fn error_frame_goes_to_first_transport_only() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut registry = TransportRegistry::new();
        let (first, first_log) = RecordingTransport::new("first");
        let (second, second_log) = RecordingTransport::new("second");
        registry.insert(Box::new(first));
        registry.insert(Box::new(second));

        simulator.simulate_subscription_failure().unwrap();
        queue.run_ready(&mut registry);

        assert_eq!(first_log.lock().unwrap().writes.len(), 1);
        assert!(second_log.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn connection_failure_closes_all_and_keeps_entries() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut registry = TransportRegistry::new();
        let (a, a_log) = RecordingTransport::new("a");
        let (b, b_log) = RecordingTransport::new("b");
        registry.insert(Box::new(a));
        registry.insert(Box::new(b));

        simulator.simulate_connection_failure().unwrap();
        queue.run_ready(&mut registry);

        assert_eq!(a_log.lock().unwrap().closes, 1);
        assert_eq!(b_log.lock().unwrap().closes, 1);
        assert!(a_log.lock().unwrap().writes.is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut registry = TransportRegistry::new();

        for kind in FaultKind::ALL {
            simulator.simulate(kind).unwrap();
        }
        assert_eq!(queue.run_ready(&mut registry), 4);
        assert!(registry.is_empty());
    }

    #[test]
    fn repeated_calls_are_not_deduplicated() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut registry = TransportRegistry::new();
        let (transport, log) = RecordingTransport::new("client");
        registry.insert(Box::new(transport));

        simulator.simulate_secure_channel_failure().unwrap();
        simulator.simulate_secure_channel_failure().unwrap();
        assert_eq!(queue.run_ready(&mut registry), 2);
        assert_eq!(log.lock().unwrap().writes.len(), 2);
    }

    #[test]
    fn write_failure_closes_transport() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut registry = TransportRegistry::new();
        let (mut transport, log) = RecordingTransport::new("client");
        transport.fail_writes = true;
        registry.insert(Box::new(transport));

        simulator.simulate_session_failure().unwrap();
        assert_eq!(queue.run_ready(&mut registry), 1);
        let log = log.lock().unwrap();
        assert!(log.writes.is_empty());
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn null_reason_is_encoded_as_null() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::new(scheduler, None);
        let mut registry = TransportRegistry::new();
        let (transport, log) = RecordingTransport::new("client");
        registry.insert(Box::new(transport));

        simulator.simulate_session_failure().unwrap();
        queue.run_ready(&mut registry);
        let writes = &log.lock().unwrap().writes;
        assert_eq!(decode_err(&writes[0]).reason, None);
        assert_eq!(writes[0].len(), HEADER_SIZE + 8);
    }

    #[test]
    fn scheduling_fails_when_queue_is_gone() {
        let (scheduler, queue) = deferred_queue();
        drop(queue);
        let simulator = FaultSimulator::with_default_reason(scheduler);

        let err = simulator.simulate_connection_failure().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_SERVER_HALTED);
    }

    #[test]
    fn registered_methods_return_empty_outputs() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut methods = MethodRegistry::new();
        simulator.register_methods(&mut methods);

        for kind in FaultKind::ALL {
            assert!(methods.contains(kind.method_name()));
            let outputs = methods
                .call(&MethodCall::new("ns=0;i=2253", kind.method_name()))
                .unwrap();
            assert!(outputs.is_empty());
        }
        assert_eq!(queue.run_ready(&mut TransportRegistry::new()), 4);
    }

    #[test]
    fn registered_methods_reject_inputs() {
        let (scheduler, mut queue) = deferred_queue();
        let simulator = FaultSimulator::with_default_reason(scheduler);
        let mut methods = MethodRegistry::new();
        simulator.register_methods(&mut methods);

        let mut call = MethodCall::new("obj", "simulate_session_failure");
        call.inputs.push(Variant::Int32(1));
        let err = methods.call(&call).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TOO_MANY_ARGUMENTS);
        assert_eq!(queue.run_ready(&mut TransportRegistry::new()), 0);
    }
}
