//! Spotify PKCE Login Demo
//!
//! Demonstrates the Authorization Code Flow with PKCE against Spotify:
//! 1. Load a stored token for the client, if any
//! 2. Otherwise open the authorization page in the browser
//! 3. Receive the redirect on a local listener (http://127.0.0.1:8888/callback)
//! 4. Exchange the code for a token set and store it
//! 5. Call the Web API through the session guard
//!
//! Register `http://127.0.0.1:8888/callback` as a redirect URI of your Spotify
//! app, then run with:
//!
//! ```bash
//! SPOTIFY_WEB_API_CLIENT_ID=... cargo run --example spotify_login
//! cargo run --example spotify_login -- logout
//! ```

use minim_auth::scope::{Entitlement, ScopeRequirement};
use minim_auth::{ApiClient, AuthError, CacheTtl, ClientConfig, FlowDescriptor, Provider};
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minim_auth=info".parse().unwrap()),
        )
        .init();

    let config = ClientConfig::builder()
        .provider(Provider::spotify())
        .flow(FlowDescriptor::pkce(
            Url::parse("http://127.0.0.1:8888/callback")?,
            [
                "user-read-private",
                "user-read-playback-state",
                "user-top-read",
            ],
        ))
        .open_browser(true)
        .build();
    let mut client = ApiClient::new(config)?;

    if std::env::args().nth(1).as_deref() == Some("logout") {
        let removed = client.logout()?;
        println!("{}", if removed { "✓ Logged out" } else { "No stored session" });
        return Ok(());
    }

    // Runs the flow on first use, reuses the stored token afterwards
    let me = client.get_json_cached("me", CacheTtl::User).await?;
    println!(
        "✓ Logged in as {} ({})",
        me["display_name"].as_str().unwrap_or("unknown"),
        me["id"].as_str().unwrap_or("?")
    );
    if let Some(token) = client.token() {
        println!("  Granted scopes: {:?}", token.granted_scopes);
        if let Some(remaining) = token.remaining_validity() {
            println!("  Token valid for {}s", remaining.as_secs());
        }
    }

    client.ensure_scopes("users.get_top_items", &ScopeRequirement::one("user-top-read"))?;
    let top = client
        .get_json_cached("me/top/artists?limit=5", CacheTtl::Popularity)
        .await?;
    println!();
    println!("Top artists:");
    for artist in top["items"].as_array().into_iter().flatten() {
        println!("  - {}", artist["name"].as_str().unwrap_or("?"));
    }

    println!();
    match client
        .ensure_entitlement("player.pause_playback", &Entitlement::spotify_premium())
        .await
    {
        Ok(()) => println!("✓ Premium account: playback control available"),
        Err(AuthError::Entitlement { requirement, .. }) => {
            println!("✗ Playback control requires {requirement}");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
