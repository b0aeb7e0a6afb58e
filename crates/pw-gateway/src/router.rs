//! Connection routing
//!
//! Every inbound connection starts with `select`. An argument beginning
//! with `$` joins the connection with that id; anything else names a
//! protocol and creates a new connection with its own backend. Either way
//! the user's transport ends up owned by the backend.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use pw_core::error::RouteError;
use pw_core::Transport;
use pw_protocol::ConnectionId;

use crate::state::GatewayState;

/// How a routed connection was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A new backend was started and published
    Created { id: ConnectionId },
    /// The user joined an existing backend
    Joined { id: ConnectionId },
}

impl RouteOutcome {
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            RouteOutcome::Created { id } | RouteOutcome::Joined { id } => id,
        }
    }
}

/// Read `select` from a new connection and hand the connection to the
/// backend it names.
///
/// On error the transport has been dropped and nothing was published.
pub async fn route_connection(
    state: &GatewayState,
    mut transport: Transport,
) -> Result<RouteOutcome, RouteError> {
    let identifier = read_select(&mut transport, state.config.select_timeout).await?;

    if ConnectionId::is_join_request(&identifier) {
        join(state, &identifier, transport).await
    } else {
        create(state, &identifier, transport).await
    }
}

/// Wait for `select` and return its single argument
async fn read_select(transport: &mut Transport, timeout: Duration) -> Result<String, RouteError> {
    let mut instruction = match tokio::time::timeout(timeout, transport.next()).await {
        Err(_) | Ok(None) => return Err(RouteError::ProtocolTimeout),
        Ok(Some(Err(e))) => return Err(RouteError::ProtocolMalformed(e.to_string())),
        Ok(Some(Ok(instruction))) => instruction,
    };

    if instruction.opcode != "select" {
        return Err(RouteError::ProtocolMalformed(format!(
            "expected \"select\", got \"{}\"",
            instruction.opcode
        )));
    }
    if instruction.argc() != 1 {
        return Err(RouteError::ProtocolMalformed(format!(
            "\"select\" takes 1 argument, got {}",
            instruction.argc()
        )));
    }

    instruction
        .args
        .pop()
        .ok_or_else(|| RouteError::ProtocolMalformed("missing identifier".to_string()))
}

async fn join(
    state: &GatewayState,
    identifier: &str,
    transport: Transport,
) -> Result<RouteOutcome, RouteError> {
    let handle = ConnectionId::parse(identifier)
        .ok()
        .and_then(|id| state.registry.retrieve(&id))
        .ok_or_else(|| RouteError::UnknownConnection(identifier.to_string()))?;

    tracing::info!("Joining existing connection \"{}\"", identifier);
    handle.attach_user(transport).await?;

    Ok(RouteOutcome::Joined {
        id: handle.connection_id().clone(),
    })
}

async fn create(
    state: &GatewayState,
    protocol: &str,
    transport: Transport,
) -> Result<RouteOutcome, RouteError> {
    let id = ConnectionId::generate();
    tracing::info!("Creating new {} connection \"{}\"", protocol, id);

    let handle = Arc::new(state.spawner.spawn(protocol, id.clone()).await?);

    if let Err(e) = handle.attach_user(transport).await {
        tracing::warn!("First user of connection \"{}\" could not attach", id);
        handle.terminate();
        return Err(e);
    }

    if let Err(e) = state.registry.add(id.clone(), Arc::clone(&handle)) {
        tracing::error!("Unable to publish connection \"{}\": {}", id, e);
        handle.terminate();
        return Err(RouteError::BackendSpawn(e.to_string()));
    }

    // Withdraw the entry once the backend exits
    let registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        handle.wait().await;
        if registry.remove_if_same(handle.connection_id(), &handle) {
            tracing::info!("Connection \"{}\" removed", handle.connection_id());
        }
    });

    Ok(RouteOutcome::Created { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{spawn_backend, BackendSpawner, ProcessHandle};
    use async_trait::async_trait;
    use futures::SinkExt;
    use pw_core::client::NoopHandler;
    use pw_core::config::GatewayConfig;
    use pw_core::socket::transport;
    use pw_core::{ClientSession, ClientState};
    use pw_protocol::{Instruction, InstructionCodec};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;
    use tokio_util::codec::Framed;

    type Peer = Framed<DuplexStream, InstructionCodec>;

    /// Spawns real backends and counts calls
    #[derive(Default)]
    struct CountingSpawner {
        spawns: AtomicUsize,
        last_session: parking_lot::Mutex<Option<Arc<ClientSession>>>,
    }

    impl CountingSpawner {
        fn last_session(&self) -> Arc<ClientSession> {
            Arc::clone(self.last_session.lock().as_ref().unwrap())
        }
    }

    #[async_trait]
    impl BackendSpawner for CountingSpawner {
        async fn spawn(
            &self,
            _protocol: &str,
            connection_id: ConnectionId,
        ) -> Result<ProcessHandle, RouteError> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            let handle = spawn_backend(connection_id, Arc::new(NoopHandler), &test_config());
            *self.last_session.lock() = Some(Arc::clone(handle.session()));
            Ok(handle)
        }
    }

    struct FailingSpawner;

    #[async_trait]
    impl BackendSpawner for FailingSpawner {
        async fn spawn(
            &self,
            protocol: &str,
            _connection_id: ConnectionId,
        ) -> Result<ProcessHandle, RouteError> {
            Err(RouteError::BackendSpawn(format!("cannot start {}", protocol)))
        }
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            select_timeout: Duration::from_millis(200),
            user_poll_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn state_with(spawner: Arc<dyn BackendSpawner>) -> GatewayState {
        GatewayState::with_spawner(test_config(), spawner)
    }

    fn pipe() -> (Transport, Peer) {
        let (client, server) = tokio::io::duplex(4096);
        (transport(server), Framed::new(client, InstructionCodec::new()))
    }

    async fn select(peer: &mut Peer, identifier: &str) {
        peer.send(Instruction::select(identifier)).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_then_join() {
        let spawner = Arc::new(CountingSpawner::default());
        let state = state_with(spawner.clone());

        // Create
        let (transport, mut first) = pipe();
        select(&mut first, "vnc").await;
        let outcome = route_connection(&state, transport).await.unwrap();
        let RouteOutcome::Created { id } = outcome.clone() else {
            panic!("expected a new connection, got {:?}", outcome);
        };
        assert!(id.as_str().starts_with('$'));
        assert_eq!(state.registry.len(), 1);
        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 1);

        let session = spawner.last_session();
        assert_eq!(session.user_count(), 1);

        // Join
        let (transport, mut second) = pipe();
        select(&mut second, id.as_str()).await;
        let outcome = route_connection(&state, transport).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Joined { id: id.clone() });
        assert_eq!(session.user_count(), 2);
        assert_eq!(state.registry.len(), 1);
        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 1);

        // Both users hear the id
        for peer in [&mut first, &mut second] {
            let ready = timeout(Duration::from_secs(2), peer.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(ready, Instruction::ready(&id));
        }

        state.registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_select_without_arguments_is_malformed() {
        let spawner = Arc::new(CountingSpawner::default());
        let state = state_with(spawner.clone());

        let (transport, mut peer) = pipe();
        peer.send(Instruction::new("select", Vec::<String>::new()))
            .await
            .unwrap();

        let err = route_connection(&state, transport).await.unwrap_err();
        assert!(matches!(err, RouteError::ProtocolMalformed(_)));
        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 0);
        assert!(state.registry.is_empty());

        // Connection was dropped
        assert!(peer.next().await.is_none());
    }

    #[tokio::test]
    async fn test_wrong_opcode_is_malformed() {
        let state = state_with(Arc::new(CountingSpawner::default()));
        let (transport, mut peer) = pipe();
        peer.send(Instruction::new("connect", ["vnc"])).await.unwrap();

        assert!(matches!(
            route_connection(&state, transport).await,
            Err(RouteError::ProtocolMalformed(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let state = state_with(Arc::new(CountingSpawner::default()));
        let (client, server) = tokio::io::duplex(4096);
        let mut client = client;
        client.write_all(b"6.select,x.vnc;").await.unwrap();

        assert!(matches!(
            route_connection(&state, transport(server)).await,
            Err(RouteError::ProtocolMalformed(_))
        ));
    }

    #[tokio::test]
    async fn test_silence_times_out() {
        let state = state_with(Arc::new(CountingSpawner::default()));
        let (transport, _peer) = pipe();

        assert!(matches!(
            route_connection(&state, transport).await,
            Err(RouteError::ProtocolTimeout)
        ));
    }

    #[tokio::test]
    async fn test_eof_before_select_times_out() {
        let state = state_with(Arc::new(CountingSpawner::default()));
        let (transport, peer) = pipe();
        drop(peer);

        assert!(matches!(
            route_connection(&state, transport).await,
            Err(RouteError::ProtocolTimeout)
        ));
    }

    #[tokio::test]
    async fn test_unknown_join_never_spawns() {
        let spawner = Arc::new(CountingSpawner::default());
        let state = state_with(spawner.clone());

        for identifier in [
            ConnectionId::generate().to_string(),
            "$not-a-connection".to_string(),
            "$".to_string(),
        ] {
            let (transport, mut peer) = pipe();
            select(&mut peer, &identifier).await;
            let err = route_connection(&state, transport).await.unwrap_err();
            assert!(matches!(err, RouteError::UnknownConnection(ref s) if *s == identifier));
        }

        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 0);
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_publishes_nothing() {
        let state = state_with(Arc::new(FailingSpawner));
        let (transport, mut peer) = pipe();
        select(&mut peer, "rdp").await;

        let err = route_connection(&state, transport).await.unwrap_err();
        assert!(matches!(err, RouteError::BackendSpawn(_)));
        assert!(state.registry.is_empty());
    }

    /// Hands out backends whose session refuses every user
    #[derive(Default)]
    struct StoppedSpawner {
        sessions: parking_lot::Mutex<Vec<Arc<ClientSession>>>,
    }

    #[async_trait]
    impl BackendSpawner for StoppedSpawner {
        async fn spawn(
            &self,
            _protocol: &str,
            connection_id: ConnectionId,
        ) -> Result<ProcessHandle, RouteError> {
            let handle = spawn_backend(connection_id, Arc::new(NoopHandler), &test_config());
            handle.session().stop();
            self.sessions.lock().push(Arc::clone(handle.session()));
            Ok(handle)
        }
    }

    #[tokio::test]
    async fn test_attach_failure_tears_down_backend() {
        let spawner = Arc::new(StoppedSpawner::default());
        let state = state_with(spawner.clone());
        let (transport, mut peer) = pipe();
        select(&mut peer, "vnc").await;

        let err = route_connection(&state, transport).await.unwrap_err();
        assert!(matches!(err, RouteError::UserAttach(_)));
        assert!(state.registry.is_empty());

        // The backend was terminated and freed its session
        let session = Arc::clone(&spawner.sessions.lock()[0]);
        timeout(Duration::from_secs(2), async {
            while session.state() != ClientState::Stopped {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // The refused user's connection is closed
        assert!(timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_registry_entry_removed_when_backend_exits() {
        let spawner = Arc::new(CountingSpawner::default());
        let state = state_with(spawner.clone());
        let (transport, mut peer) = pipe();
        select(&mut peer, "vnc").await;
        route_connection(&state, transport).await.unwrap();
        assert_eq!(state.registry.len(), 1);

        // Last user leaves
        drop(peer);
        timeout(Duration::from_secs(2), async {
            while !state.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(spawner.last_session().state(), ClientState::Stopped);
    }
}
