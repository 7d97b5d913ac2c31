//! Gateway client demo
//!
//! Connects with the token from `GATEWAY_TOKEN` and logs message events until
//! interrupted.
//!
//! Run with:
//! ```bash
//! GATEWAY_URL=wss://gateway.example/gateway GATEWAY_TOKEN=... cargo run -p chat-gateway-client
//! ```

use anyhow::Context;
use chat_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use chat_gateway_client::{DispatchEvent, EventStream, GatewayClient, Topic};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // tracing may not be initialised if configuration failed
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    let token = config
        .auth
        .token
        .clone()
        .context("GATEWAY_TOKEN is not set")?;

    info!(
        env = ?config.app.env,
        url = %config.gateway.url,
        compress = config.gateway.compress,
        "Configuration loaded"
    );

    let client = GatewayClient::with_tungstenite(config);
    let consumers: Vec<_> = [Topic::MessageCreate, Topic::MessageUpdate, Topic::MessageDelete]
        .into_iter()
        .map(|topic| tokio::spawn(log_events(client.events().subscribe(topic))))
        .collect();

    client.connect(token).await?;
    client.wait_until_ready().await?;
    if let Some(user) = client.current_user() {
        info!(user = %user.tag(), "Logged in");
    }

    let readiness = client.readiness();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("Shutting down");
        }
        e = readiness.wait_stopped() => warn!(error = %e, "Gateway client stopped"),
    }

    client.close().await?;
    for consumer in consumers {
        consumer.abort();
    }
    Ok(())
}

async fn log_events(mut events: EventStream) {
    while let Some(event) = events.recv().await {
        match event.as_ref() {
            DispatchEvent::MessageCreate(message) => info!(
                channel_id = %message.channel_id,
                author = %message.author.tag(),
                content = %message.content,
                "Message created"
            ),
            DispatchEvent::MessageUpdate(update) => info!(
                channel_id = %update.channel_id,
                message_id = %update.id,
                "Message edited"
            ),
            DispatchEvent::MessageDelete(delete) => info!(
                channel_id = %delete.channel_id,
                message_id = %delete.id,
                "Message deleted"
            ),
            _ => {}
        }
    }
}
