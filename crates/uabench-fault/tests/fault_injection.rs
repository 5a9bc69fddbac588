//! End-to-end fault scenarios over loopback TCP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use uabench_fault::{
    BenchClient, BenchConfig, BenchError, BenchServer, FaultKind, Observation,
    DEFAULT_FAULT_REASON,
};
use uabench_frame::{StatusCode, Variant};

const OBJECT: &str = "ns=1;s=TestBench";
const WAIT: Duration = Duration::from_millis(500);

struct RunningServer {
    addr: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<BenchServer>>,
}

impl RunningServer {
    fn start() -> Self {
        Self::start_with(BenchConfig {
            poll_interval_ms: 1,
            ..BenchConfig::default()
        })
    }

    fn start_with(config: BenchConfig) -> Self {
        let server = BenchServer::bind("127.0.0.1:0", config).expect("server should bind");
        Self::spawn(server)
    }

    fn spawn(mut server: BenchServer) -> Self {
        let addr = server.local_addr().to_string();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            server.run(&flag).expect("server loop should not fail");
            server
        });
        Self {
            addr,
            stop,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> BenchClient {
        BenchClient::connect(&self.addr).expect("client should connect")
    }

    fn stop(mut self) -> BenchServer {
        self.stop.store(true, Ordering::SeqCst);
        self.handle
            .take()
            .expect("server thread should exist")
            .join()
            .expect("server thread should not panic")
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Keep polling a stopped server until `done` holds.
fn settle(mut server: BenchServer, done: impl Fn(&BenchServer) -> bool) -> BenchServer {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(&server) {
        assert!(Instant::now() < deadline, "server did not settle");
        server.poll_once().unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    server
}

fn expect_error(observation: Observation) -> (StatusCode, Option<String>) {
    match observation {
        Observation::Error(message) => (message.status, message.reason),
        other => panic!("expected an ERR frame, got {other:?}"),
    }
}

#[test]
fn secure_channel_failure_follows_response() {
    let server = RunningServer::start();
    let mut client = server.connect();

    let response = client
        .call(OBJECT, "simulate_securechannel_failure", Vec::new())
        .unwrap();
    assert_eq!(response.status, StatusCode::GOOD);
    assert!(response.outputs.is_empty());

    let (status, reason) = expect_error(client.observe(WAIT).unwrap());
    assert_eq!(status, StatusCode::BAD_SECURE_CHANNEL_ID_INVALID);
    assert_eq!(reason.as_deref(), Some(DEFAULT_FAULT_REASON));

    assert_eq!(client.observe(Duration::from_millis(50)).unwrap(), Observation::Quiet);
}

#[test]
fn session_and_subscription_failures_carry_their_status() {
    let server = RunningServer::start();
    let mut client = server.connect();

    for kind in [FaultKind::Session, FaultKind::Subscription] {
        let response = client.call(OBJECT, kind.method_name(), Vec::new()).unwrap();
        assert_eq!(response.status, StatusCode::GOOD);
        let (status, _) = expect_error(client.observe(WAIT).unwrap());
        assert_eq!(Some(status), kind.status_code());
    }
}

#[test]
fn connection_failure_closes_after_response() {
    let server = RunningServer::start();
    let mut client = server.connect();

    let response = client
        .call(OBJECT, "simulate_connection_failure", Vec::new())
        .unwrap();
    assert_eq!(response.status, StatusCode::GOOD);
    assert_eq!(client.observe(WAIT).unwrap(), Observation::Closed);

    let server = settle(server.stop(), |s| s.connection_count() == 0);
    assert!(server.registry().is_empty());
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn connection_failure_closes_every_client() {
    let server = RunningServer::start();
    let mut first = server.connect();
    let mut second = server.connect();

    first
        .call(OBJECT, "simulate_connection_failure", Vec::new())
        .unwrap();
    assert_eq!(first.observe(WAIT).unwrap(), Observation::Closed);
    assert_eq!(second.observe(WAIT).unwrap(), Observation::Closed);
}

#[test]
fn two_calls_inject_two_frames() {
    let server = RunningServer::start();
    let mut client = server.connect();

    client
        .call(OBJECT, "simulate_session_failure", Vec::new())
        .unwrap();
    // The first ERR may already be in flight; calls still answer in order.
    let second = client.call(OBJECT, "simulate_session_failure", Vec::new());
    let mut errors = 0;
    match second {
        Ok(response) => assert_eq!(response.status, StatusCode::GOOD),
        Err(BenchError::Rejected(message)) => {
            assert_eq!(message.status, StatusCode::BAD_SESSION_ID_INVALID);
            errors += 1;
            let response = client.recv_chunk().unwrap();
            assert_eq!(response.message_type(), uabench_frame::MessageType::Message);
        }
        Err(err) => panic!("unexpected error: {err}"),
    }

    while errors < 2 {
        let (status, _) = expect_error(client.observe(WAIT).unwrap());
        assert_eq!(status, StatusCode::BAD_SESSION_ID_INVALID);
        errors += 1;
    }
    assert_eq!(client.observe(Duration::from_millis(50)).unwrap(), Observation::Quiet);
}

#[test]
fn fault_goes_to_first_registered_client() {
    let server = RunningServer::start();
    let mut first = server.connect();
    let mut second = server.connect();

    let response = second
        .call(OBJECT, "simulate_subscription_failure", Vec::new())
        .unwrap();
    assert_eq!(response.status, StatusCode::GOOD);

    let (status, _) = expect_error(first.observe(WAIT).unwrap());
    assert_eq!(status, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
    assert_eq!(second.observe(Duration::from_millis(50)).unwrap(), Observation::Quiet);
}

#[test]
fn fault_methods_reject_arguments() {
    let server = RunningServer::start();
    let mut client = server.connect();

    let response = client
        .call(OBJECT, "simulate_session_failure", vec![Variant::Int32(1)])
        .unwrap();
    assert_eq!(response.status, StatusCode::BAD_TOO_MANY_ARGUMENTS);
    assert_eq!(client.observe(Duration::from_millis(100)).unwrap(), Observation::Quiet);
}

#[test]
fn unknown_method_fails_the_call() {
    let server = RunningServer::start();
    let mut client = server.connect();

    let response = client.call(OBJECT, "simulate_everything", Vec::new()).unwrap();
    assert_eq!(response.status, StatusCode::BAD_METHOD_INVALID);
}

#[test]
fn configured_null_reason_is_sent() {
    let server = RunningServer::start_with(BenchConfig {
        poll_interval_ms: 1,
        fault_reason: None,
        ..BenchConfig::default()
    });
    let mut client = server.connect();

    client
        .call(OBJECT, "simulate_securechannel_failure", Vec::new())
        .unwrap();
    let (_, reason) = expect_error(client.observe(WAIT).unwrap());
    assert_eq!(reason, None);
}

#[test]
fn no_client_fault_is_a_no_op() {
    let mut server = BenchServer::bind("127.0.0.1:0", BenchConfig::default()).unwrap();
    server.fault_simulator().simulate_session_failure().unwrap();

    let outcome = server.poll_once().unwrap();
    assert_eq!(outcome.deferred, 1);
    assert!(server.registry().is_empty());
}

#[test]
fn close_message_ends_connection() {
    let server = RunningServer::start();
    let client = server.connect();
    client.close().unwrap();

    let server = settle(server.stop(), |s| s.connection_count() == 0);
    assert!(server.registry().is_empty());
}

#[test]
fn custom_method_can_trigger_a_fault() {
    let mut server = BenchServer::bind("127.0.0.1:0", BenchConfig::default()).unwrap();
    let simulator = server.fault_simulator().clone();
    server.methods_mut().register("echo_then_fail", move |call| {
        simulator.simulate(FaultKind::Subscription)?;
        Ok(call.inputs.clone())
    });
    let server = RunningServer::spawn(server);
    let mut client = server.connect();

    let inputs = vec![Variant::String(Some("ping".to_string())), Variant::UInt32(7)];
    let response = client.call(OBJECT, "echo_then_fail", inputs.clone()).unwrap();
    assert!(response.status.is_good());
    assert_eq!(response.outputs, inputs);

    let (status, _) = expect_error(client.observe(WAIT).unwrap());
    assert_eq!(status, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
}

#[test]
fn stalled_client_does_not_block_other_clients() {
    let mut server = BenchServer::bind(
        "127.0.0.1:0",
        BenchConfig {
            poll_interval_ms: 1,
            handshake_timeout_ms: 300,
            max_message_size: 64 << 20,
            ..BenchConfig::default()
        },
    )
    .unwrap();
    server.methods_mut().register("bulk", |_| {
        Ok(vec![Variant::String(Some("x".repeat(48 << 20)))])
    });
    let server = RunningServer::spawn(server);

    // Asks for far more than the socket buffers hold, then never reads.
    let mut stalled = server.connect();
    stalled.send_call(OBJECT, "bulk", Vec::new()).unwrap();

    let started = Instant::now();
    let mut healthy = server.connect();
    let response = healthy
        .call(OBJECT, "simulate_session_failure", Vec::new())
        .unwrap();
    assert!(response.status.is_good());
    assert!(started.elapsed() < Duration::from_secs(3));

    // The stalled transport was dropped, so the fault lands on the healthy one.
    let (status, _) = expect_error(healthy.observe(WAIT).unwrap());
    assert_eq!(status, StatusCode::BAD_SESSION_ID_INVALID);

    let server = settle(server.stop(), |s| s.connection_count() == 1);
    assert_eq!(server.registry().len(), 1);
    drop(stalled);
}
