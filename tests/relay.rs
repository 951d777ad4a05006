//! Client-to-client calls through the host relay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hub_rpc::{
    //
    memory_pair,
    BrokerConfig,
    ClientId,
    ClientProxy,
    Error,
    HostBroker,
};

async fn attach_client(host: &HostBroker) -> (ClientProxy, ClientId) {
    // ---
    let config = BrokerConfig::new();
    let (host_side, client_side) = memory_pair(config.channel_capacity);
    let id = host.attach(host_side).await;
    let proxy = ClientProxy::new(client_side, config);
    (proxy, id)
}

#[tokio::test]
async fn test_broadcast_relay_resolves_with_peer_result() {
    // ---
    let host = HostBroker::new(BrokerConfig::new());
    let (caller, _caller_id) = attach_client(&host).await;
    let (answerer, _answerer_id) = attach_client(&host).await;

    answerer.handle_peer("title", |q: String| async move {
        // ---
        Ok(format!("re: {q}"))
    });

    // The host owns no handler for the topic; only the peer does.
    let resp: String = caller.call_peer("title", "hello".to_owned()).await.unwrap();
    assert_eq!(resp, "re: hello");
}

#[tokio::test]
async fn test_targeted_relay_reaches_only_the_target() {
    // ---
    let host = HostBroker::new(BrokerConfig::new());
    let (caller, _caller_id) = attach_client(&host).await;
    let (target, target_id) = attach_client(&host).await;
    let (bystander, _bystander_id) = attach_client(&host).await;

    let bystander_hits = Arc::new(AtomicUsize::new(0));

    target.handle_peer("poke", |(): ()| async move { Ok("target".to_owned()) });

    let hits = bystander_hits.clone();
    bystander.handle_peer("poke", move |(): ()| {
        // ---
        hits.fetch_add(1, Ordering::SeqCst);
        async move { Ok("bystander".to_owned()) }
    });

    let resp: String = caller.call_peer_to(target_id, "poke", ()).await.unwrap();
    assert_eq!(resp, "target");
    assert_eq!(bystander_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_relays_do_not_cross_talk() {
    // ---
    let host = HostBroker::new(BrokerConfig::new());
    let (alice, _alice_id) = attach_client(&host).await;
    let (carol, _carol_id) = attach_client(&host).await;
    let (echo, _echo_id) = attach_client(&host).await;

    echo.handle_peer("echo", |s: String| async move { Ok(format!("{s}!")) });

    // Two callers race the same topic; each reply must reach its own
    // originator.
    let a = tokio::spawn({
        let alice = alice.clone();
        async move { alice.call_peer::<_, String>("echo", "alice".to_owned()).await }
    });
    let c = tokio::spawn({
        let carol = carol.clone();
        async move { carol.call_peer::<_, String>("echo", "carol".to_owned()).await }
    });

    assert_eq!(a.await.unwrap().unwrap(), "alice!");
    assert_eq!(c.await.unwrap().unwrap(), "carol!");
}

#[tokio::test]
async fn test_one_shot_peer_handler_fires_once() {
    // ---
    let host = HostBroker::new(BrokerConfig::new());
    let (answerer, answerer_id) = attach_client(&host).await;

    // Short caller timeout: the second call is expected to run into it.
    let (host_side, client_side) = memory_pair(16);
    host.attach(host_side).await;
    let caller = ClientProxy::new(
        client_side,
        BrokerConfig::new().with_call_timeout(Duration::from_millis(100)),
    );

    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = hits.clone();

    answerer.handle_peer_once("claim", move |(): ()| {
        // ---
        handler_hits.fetch_add(1, Ordering::SeqCst);
        async move { Ok("claimed".to_owned()) }
    });

    let first: String = caller.call_peer_to(answerer_id, "claim", ()).await.unwrap();
    assert_eq!(first, "claimed");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The removed registration stays mute, so the second call reaches no
    // handler and runs into the caller's timeout.
    let second = caller.call_peer_to::<_, String>(answerer_id, "claim", ()).await;
    assert!(matches!(second, Err(Error::Timeout)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_relay_to_unknown_target_is_an_error() {
    // ---
    let host = HostBroker::new(BrokerConfig::new());
    let (caller, _caller_id) = attach_client(&host).await;
    let (doomed, doomed_id) = attach_client(&host).await;

    // Detach by dropping the proxy; the host notices the closed channel.
    drop(doomed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(host.client_ids().await.len(), 1);

    let res = caller.call_peer_to::<_, ()>(doomed_id, "poke", ()).await;
    match res {
        Err(Error::Handler(msg)) => assert!(msg.contains("unknown client")),
        other => panic!("expected handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_detached_client_is_unknown_to_direct_calls() {
    // ---
    let host = HostBroker::new(BrokerConfig::new());
    let (doomed, doomed_id) = attach_client(&host).await;

    drop(doomed);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let res = host.call_client::<_, ()>(doomed_id, "poke", ()).await;
    assert!(matches!(res, Err(Error::UnknownClient(_))));
}
