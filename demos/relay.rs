//! Two clients talking to each other through the host relay.
//!
//! The "worker" client owns the `title` topic; the "ui" client calls it
//! without knowing who will answer. The host forwards the request leg
//! and routes the reply leg back to the caller.

use hub_rpc::{memory_pair, BrokerConfig, ClientProxy, HostBroker, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt::init();

    let config = BrokerConfig::new();
    let host = HostBroker::new(config.clone());

    let (host_side, worker_side) = memory_pair(config.channel_capacity);
    host.attach(host_side).await;
    let worker = ClientProxy::new(worker_side, config.clone());

    let (host_side, ui_side) = memory_pair(config.channel_capacity);
    host.attach(host_side).await;
    let ui = ClientProxy::new(ui_side, config);

    worker.handle_peer("title", |query: String| async move {
        Ok(format!("{query} (answered by the worker)"))
    });

    let title: String = ui.call_peer("title", "current document".to_owned()).await?;

    println!("{title}");
    Ok(())
}
