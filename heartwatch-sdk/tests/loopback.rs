//! End-to-end tests over real loopback sockets.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use heartwatch_sdk::{
    Call, Client, ClientHeartbeat, Error, Handler, Peer, ProtocolVersion, Reply, Server,
    StatusState,
};
use tokio::net::TcpStream;

/// Answers `check` the way a real client does.
struct Answer {
    name: String,
}

impl Handler for Answer {
    fn handle(&self, _peer: &Arc<Peer>, call: Call) -> Reply {
        match call {
            Call::Check { name } => Reply::Value(name == self.name),
            _ => Reply::Error("unsupported".to_string()),
        }
    }
}

async fn server(tick: Duration) -> Server {
    server_on(0, tick).await
}

async fn server_on(port: u16, tick: Duration) -> Server {
    Server::builder()
        .hostname("127.0.0.1")
        .port(port)
        .tick_interval(tick)
        .probe_timeout(Duration::from_millis(200))
        .bind()
        .await
        .unwrap()
}

/// Open a bare connection without saying hello.
async fn raw_peer(server: &Server, name: &str) -> Arc<Peer> {
    let stream = TcpStream::connect(server.local_addr()).await.unwrap();
    let (reader, writer) = stream.into_split();
    Peer::spawn(
        reader,
        writer,
        Arc::new(Answer {
            name: name.to_string(),
        }),
        name,
    )
}

async fn hello(peer: &Peer, name: &str) -> Result<bool, Error> {
    peer.request(Call::Hello {
        name: name.to_string(),
        version: ProtocolVersion::current(),
    })
    .await
}

async fn ping(peer: &Peer, name: &str) -> bool {
    peer.request(Call::Ping {
        name: name.to_string(),
    })
    .await
    .unwrap()
}

async fn wait_for<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn client_registers_and_unregisters() {
    let server = server(Duration::from_secs(3600)).await;
    let registry = server.registry().clone();

    let alpha = raw_peer(&server, "Alpha").await;
    assert!(hello(&alpha, "Alpha").await.unwrap());
    wait_for("Alpha to register", || {
        let registry = registry.clone();
        async move { registry.count() == 1 }
    })
    .await;

    let snapshot = registry.registry_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "Alpha");
    assert_eq!(snapshot[0].start_time, snapshot[0].last_time);
    assert_eq!(snapshot[0].state, StatusState::Connected);

    assert!(ping(&alpha, "Alpha").await);
    assert!(!ping(&alpha, "Beta").await);

    alpha.close();
    wait_for("Alpha to unregister", || {
        let registry = registry.clone();
        async move { registry.is_empty() }
    })
    .await;

    // Another client can still ask about Alpha.
    let beta = raw_peer(&server, "Beta").await;
    assert!(hello(&beta, "Beta").await.unwrap());
    assert!(!ping(&beta, "Alpha").await);
    assert!(registry.registry_snapshot().iter().all(|r| r.name != "Alpha"));

    server.shutdown().await;
}

#[tokio::test]
async fn empty_name_is_rejected() {
    let server = server(Duration::from_secs(3600)).await;

    let peer = raw_peer(&server, "").await;
    match hello(&peer, "   ").await {
        Err(Error::Remote(_)) => {}
        other => panic!("expected rejection, got {:?}", other),
    }

    let heartbeat = ClientHeartbeat::new("");
    heartbeat
        .connect("127.0.0.1", server.local_addr().port())
        .await;
    assert_eq!(heartbeat.status(), StatusState::NeverConnected);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.registry().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn client_denying_its_name_is_dropped() {
    let server = server(Duration::from_secs(3600)).await;
    let registry = server.registry().clone();

    // Answers check for "Mallory" but registers as "Alpha".
    let impostor = raw_peer(&server, "Mallory").await;
    assert!(hello(&impostor, "Alpha").await.unwrap());

    let closed = impostor.clone();
    wait_for("the impostor to be closed", || {
        let closed = closed.clone();
        async move { closed.is_closed() }
    })
    .await;
    wait_for("Alpha to unregister", || {
        let registry = registry.clone();
        async move { registry.is_empty() }
    })
    .await;

    server.shutdown().await;
}

#[tokio::test]
async fn ping_requires_hello() {
    let server = server(Duration::from_secs(3600)).await;

    let peer = raw_peer(&server, "Alpha").await;
    let result = peer
        .request(Call::Ping {
            name: "Alpha".to_string(),
        })
        .await;
    assert!(matches!(result, Err(Error::Remote(_))));

    assert!(hello(&peer, "Alpha").await.unwrap());
    assert!(matches!(hello(&peer, "Alpha").await, Err(Error::Remote(_))));

    server.shutdown().await;
}

#[tokio::test]
async fn heartbeat_connects_and_probes() {
    let server = server(Duration::from_secs(3600)).await;
    let registry = server.registry().clone();

    let heartbeat = ClientHeartbeat::new("Alpha");
    heartbeat
        .connect("127.0.0.1", server.local_addr().port())
        .await;
    assert_eq!(heartbeat.status(), StatusState::Connected);

    wait_for("Alpha to register", || {
        let registry = registry.clone();
        async move { registry.exposed_liveness_check("Alpha") }
    })
    .await;

    heartbeat.on_scheduled_tick().await;
    assert_eq!(heartbeat.status(), StatusState::Connected);

    heartbeat.close();
    assert_eq!(heartbeat.status(), StatusState::NotConnected);

    server.shutdown().await;
}

#[tokio::test]
async fn refresh_advances_last_time() {
    let server = server(Duration::from_millis(25)).await;
    let registry = server.registry().clone();

    let heartbeat = ClientHeartbeat::new("Alpha");
    heartbeat
        .connect("127.0.0.1", server.local_addr().port())
        .await;

    wait_for("a refresh to confirm Alpha", || {
        let registry = registry.clone();
        async move {
            registry
                .registry_snapshot()
                .first()
                .is_some_and(|r| r.last_time > r.start_time)
        }
    })
    .await;

    assert!(server.last_time() >= server.start_time());
    server.shutdown().await;
}

#[tokio::test]
async fn client_notices_server_going_away() {
    let server = server(Duration::from_secs(3600)).await;

    let client = Client::builder("Alpha")
        .hostname("127.0.0.1")
        .port(server.local_addr().port())
        .tick_interval(Duration::from_millis(20))
        .start()
        .await;
    assert_eq!(client.heartbeat().status(), StatusState::Connected);

    server.shutdown().await;

    let heartbeat = client.heartbeat().clone();
    wait_for("the client to see the close", || {
        let heartbeat = heartbeat.clone();
        async move { heartbeat.status() == StatusState::NotConnected }
    })
    .await;

    client.shutdown().await;
    assert_eq!(heartbeat.status(), StatusState::NotConnected);
}

#[tokio::test]
async fn client_without_server_stays_never_connected() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::builder("Alpha")
        .hostname("127.0.0.1")
        .port(port)
        .tick_interval(Duration::from_millis(10))
        .connect_timeout(Duration::from_millis(200))
        .reconnect(true)
        .start()
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.heartbeat().status(), StatusState::NeverConnected);

    client.shutdown().await;
}

#[tokio::test]
async fn servers_do_not_share_registries() {
    let first = server(Duration::from_secs(3600)).await;
    let second = server(Duration::from_secs(3600)).await;

    let heartbeat = ClientHeartbeat::new("Alpha");
    heartbeat
        .connect("127.0.0.1", first.local_addr().port())
        .await;

    let registry = first.registry().clone();
    wait_for("Alpha to register", || {
        let registry = registry.clone();
        async move { registry.count() == 1 }
    })
    .await;
    assert!(second.registry().is_empty());

    heartbeat.close();
    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn manual_reconnect_keeps_client_registered() {
    let server = server(Duration::from_secs(3600)).await;
    let registry = server.registry().clone();

    let client = Client::builder("Alpha")
        .hostname("127.0.0.1")
        .port(server.local_addr().port())
        .tick_interval(Duration::from_millis(20))
        .start()
        .await;
    wait_for("Alpha to register", || {
        let registry = registry.clone();
        async move { registry.exposed_liveness_check("Alpha") }
    })
    .await;

    client.reconnect().await;
    assert_eq!(client.heartbeat().status(), StatusState::Connected);

    // Give the old session's close time to reach the registry.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(registry.exposed_liveness_check("Alpha"));
    let snapshot = registry.registry_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, StatusState::Connected);
    assert_eq!(client.heartbeat().status(), StatusState::Connected);

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn reconnect_option_rejoins_a_restarted_server() {
    let first = server(Duration::from_secs(3600)).await;
    let port = first.local_addr().port();

    let client = Client::builder("Alpha")
        .hostname("127.0.0.1")
        .port(port)
        .tick_interval(Duration::from_millis(20))
        .connect_timeout(Duration::from_millis(200))
        .reconnect(true)
        .start()
        .await;
    assert_eq!(client.heartbeat().status(), StatusState::Connected);

    first.shutdown().await;
    let heartbeat = client.heartbeat().clone();
    wait_for("the client to see the close", || {
        let heartbeat = heartbeat.clone();
        async move { heartbeat.status() == StatusState::NotConnected }
    })
    .await;

    let second = server_on(port, Duration::from_secs(3600)).await;
    let registry = second.registry().clone();
    wait_for("Alpha to register with the new server", || {
        let registry = registry.clone();
        async move { registry.exposed_liveness_check("Alpha") }
    })
    .await;
    assert_eq!(client.heartbeat().status(), StatusState::Connected);

    client.shutdown().await;
    second.shutdown().await;
}
