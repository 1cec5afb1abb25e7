//! TIDAL Device Login Demo
//!
//! Demonstrates the Device Authorization Flow against TIDAL:
//! 1. Request a device code
//! 2. Print the verification link and user code
//! 3. Poll the token endpoint until the login is approved (Ctrl-C aborts)
//! 4. Store the token set and call the API
//!
//! Run with:
//!
//! ```bash
//! TIDAL_API_CLIENT_ID=... TIDAL_API_CLIENT_SECRET=... cargo run --example tidal_device_login
//! ```

use minim_auth::{ApiClient, ClientConfig, FlowDescriptor, Provider};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minim_auth=debug".parse().unwrap()),
        )
        .init();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let config = ClientConfig::builder()
        .provider(Provider::tidal())
        .flow(FlowDescriptor::device_code(["r_usr", "w_usr"]))
        .capture_timeout(Some(Duration::from_secs(600)))
        .cancel(cancel)
        .build();
    let mut client = ApiClient::new(config)?;

    if client.token().is_none() {
        println!("No stored TIDAL session. Starting device login...");
        println!();
        client.authorize().await?;
    }

    let me = client.get_json("users/me").await?;
    println!(
        "✓ Logged in as TIDAL user {}",
        me["data"]["id"].as_str().unwrap_or("?")
    );
    if let Some(user) = client.guard().user_identifier() {
        println!("  Stored under user identifier {user}");
    }

    Ok(())
}
