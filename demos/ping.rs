use hub_rpc::{memory_pair, BrokerConfig, ClientProxy, HostBroker, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    value: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt::init();

    let config = BrokerConfig::new();
    let host = HostBroker::new(config.clone());

    host.handle_client("ping", |req: Ping| async move {
        Ok(Pong {
            value: req.value + 1,
        })
    });

    let (host_side, client_side) = memory_pair(config.channel_capacity);
    host.attach(host_side).await;

    let client = ClientProxy::new(client_side, config);

    let resp: Pong = client.call_host("ping", Ping { value: 42 }).await?;

    println!("ping 42 -> pong {}", resp.value);
    Ok(())
}
