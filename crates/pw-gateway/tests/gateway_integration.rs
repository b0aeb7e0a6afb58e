//! Gateway integration tests
//!
//! Runs the listener on a real TCP port and drives it the way remote
//! clients would.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use pw_core::config::{self, GatewayConfig};
use pw_gateway::plugins::PluginRegistry;
use pw_gateway::{GatewayServer, GatewayState};
use pw_protocol::{ConnectionId, Instruction, InstructionCodec, ProtocolStatus};

/// Base port for test servers - each test gets a unique offset
static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

/// Get a unique port for this test
fn get_test_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    48200 + offset
}

fn test_config(address: &str) -> GatewayConfig {
    GatewayConfig {
        bind_address: address.to_string(),
        select_timeout: Duration::from_secs(1),
        user_poll_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Running gateway plus what the test needs to stop it
struct TestGateway {
    address: String,
    state: Arc<GatewayState>,
    cancel: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl TestGateway {
    async fn start() -> Self {
        let address = format!("127.0.0.1:{}", get_test_port());
        Self::start_with(test_config(&address)).await
    }

    async fn start_with(config: GatewayConfig) -> Self {
        let address = config.bind_address.clone();
        let state = Arc::new(GatewayState::new(config, PluginRegistry::with_builtin()));
        let cancel = CancellationToken::new();

        let server = GatewayServer::new(Arc::clone(&state), cancel.clone());
        let bind = address.clone();
        let handle = tokio::spawn(async move {
            let _ = server.run(&bind).await;
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            address,
            state,
            cancel,
            server: handle,
        }
    }

    /// Create a connection and wait until it can be joined
    async fn create(&self, protocol: &str) -> (TestClient, ConnectionId) {
        let (client, id) = TestClient::select(&self.address, protocol).await;
        let registry = Arc::clone(&self.state.registry);
        let published = id.clone();
        wait_until(move || registry.retrieve(&published).is_some()).await;
        (client, id)
    }

    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.server.await;
        self.state.registry.shutdown().await;
    }
}

/// Protocol client wrapper
struct TestClient {
    framed: Framed<TcpStream, InstructionCodec>,
}

impl TestClient {
    async fn connect(address: &str) -> Self {
        // Retry connection a few times in case server isn't ready
        let mut last_err = None;
        for _ in 0..10 {
            match TcpStream::connect(address).await {
                Ok(stream) => {
                    return Self {
                        framed: Framed::new(stream, InstructionCodec::new()),
                    };
                }
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
        panic!("Failed to connect to gateway at {}: {:?}", address, last_err);
    }

    async fn send(&mut self, instruction: Instruction) {
        self.framed
            .send(instruction)
            .await
            .expect("Failed to send instruction");
    }

    /// Next instruction, or `None` if the gateway closed the connection
    async fn recv(&mut self) -> Option<Instruction> {
        timeout(Duration::from_secs(2), self.framed.next())
            .await
            .expect("Timed out waiting for the gateway")
            .map(|result| result.expect("Failed to decode instruction"))
    }

    /// Open a connection with `select` and return the id from `ready`
    async fn select(address: &str, identifier: &str) -> (Self, ConnectionId) {
        let mut client = Self::connect(address).await;
        client.send(Instruction::select(identifier)).await;

        let ready = client.recv().await.expect("Connection closed before ready");
        assert_eq!(ready.opcode, "ready");
        let id = ConnectionId::parse(ready.arg(0).expect("ready without id"))
            .expect("ready carried an invalid id");
        (client, id)
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition not reached in time");
}

#[tokio::test]
async fn test_create_and_join_share_a_session() {
    let gateway = TestGateway::start().await;

    let (mut first, id) = gateway.create("mirror").await;
    assert_eq!(gateway.state.registry.len(), 1);

    let (mut second, joined) = TestClient::select(&gateway.address, id.as_str()).await;
    assert_eq!(joined, id);
    assert_eq!(gateway.state.registry.len(), 1);

    let handle = gateway.state.registry.retrieve(&id).unwrap();
    assert_eq!(handle.session().user_count(), 2);

    // Input from one user reaches both
    let key = Instruction::new("key", ["65", "1"]);
    second.send(key.clone()).await;
    assert_eq!(first.recv().await, Some(key.clone()));
    assert_eq!(second.recv().await, Some(key));

    gateway.stop().await;
}

#[tokio::test]
async fn test_unknown_connection_is_closed() {
    let gateway = TestGateway::start().await;

    let mut client = TestClient::connect(&gateway.address).await;
    client
        .send(Instruction::select(ConnectionId::generate().as_str()))
        .await;

    assert_eq!(client.recv().await, None);
    assert!(gateway.state.registry.is_empty());

    gateway.stop().await;
}

#[tokio::test]
async fn test_malformed_select_is_closed() {
    let gateway = TestGateway::start().await;

    let mut client = TestClient::connect(&gateway.address).await;
    client
        .send(Instruction::new("select", Vec::<String>::new()))
        .await;

    assert_eq!(client.recv().await, None);
    assert!(gateway.state.registry.is_empty());

    gateway.stop().await;
}

#[tokio::test]
async fn test_unknown_protocol_is_closed() {
    let gateway = TestGateway::start().await;

    let mut client = TestClient::connect(&gateway.address).await;
    client.send(Instruction::select("telnet")).await;

    assert_eq!(client.recv().await, None);
    assert!(gateway.state.registry.is_empty());

    gateway.stop().await;
}

#[tokio::test]
async fn test_connection_withdrawn_after_last_user_leaves() {
    let gateway = TestGateway::start().await;

    let (first, id) = gateway.create("mirror").await;
    let (mut second, _) = TestClient::select(&gateway.address, id.as_str()).await;

    drop(first);
    let handle = gateway.state.registry.retrieve(&id).unwrap();
    wait_until(|| handle.session().user_count() == 1).await;
    assert_eq!(gateway.state.registry.len(), 1);

    second
        .send(Instruction::new("disconnect", Vec::<String>::new()))
        .await;
    assert_eq!(second.recv().await, None);

    let registry = Arc::clone(&gateway.state.registry);
    wait_until(|| registry.is_empty()).await;

    // The id can no longer be joined
    let mut late = TestClient::connect(&gateway.address).await;
    late.send(Instruction::select(id.as_str())).await;
    assert_eq!(late.recv().await, None);

    gateway.stop().await;
}

#[tokio::test]
async fn test_refused_stream_is_acknowledged() {
    let gateway = TestGateway::start().await;

    let (mut client, _) = gateway.create("mirror").await;
    client
        .send(Instruction::new("pipe", ["4", "text/plain", "logs"]))
        .await;

    assert_eq!(
        client.recv().await,
        Some(Instruction::ack(4, "Unsupported", ProtocolStatus::Unsupported))
    );

    gateway.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_users() {
    let gateway = TestGateway::start().await;
    let (mut client, _) = gateway.create("mirror").await;

    gateway.stop().await;

    assert_eq!(client.recv().await, None);
}

#[tokio::test]
async fn test_config_file_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let address = format!("127.0.0.1:{}", get_test_port());

    config::save_config(&path, &test_config(&address)).unwrap();
    let loaded: GatewayConfig = config::load_config(&path).unwrap();
    assert_eq!(loaded.bind_address, address);
    assert_eq!(loaded.user_poll_interval, Duration::from_millis(20));

    let gateway = TestGateway::start_with(loaded).await;
    let (_client, id) = gateway.create("mirror").await;
    assert!(gateway.state.registry.retrieve(&id).is_some());

    gateway.stop().await;
}
