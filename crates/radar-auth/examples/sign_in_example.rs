/*
[INPUT]:  Auth backend URL (RADAR_AUTH_BASE_URL), local EVM key
[OUTPUT]: Printed lifecycle transitions and the resulting entitlements
[POS]:    Examples - sign-in flow demonstration
[UPDATE]: When the state machine surface changes
*/

use std::sync::Arc;

use radar_auth::*;

/// Example: wallet sign-in
///
/// 1. Build the nonce/verify client
/// 2. Wire a signer and a session store into the state machine
/// 3. Connect, sign in, print the entitlements
/// 4. Sign out
#[tokio::main]
async fn main() {
    println!("=== Radar Auth Sign-in Example ===\n");

    let config = AuthConfig {
        base_url: std::env::var("RADAR_AUTH_BASE_URL")
            .unwrap_or_else(|_| AuthConfig::default().base_url),
        ..AuthConfig::default()
    };
    let client = match AuthClient::new(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };
    println!("✓ HTTP client created");

    // Well-known development key; never use it for real funds
    let signer = match EvmWalletSigner::new(
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load key: {}", e);
            return;
        }
    };
    println!("✓ Local signer for {}", signer.address());

    let machine = AuthStateMachine::new(
        client,
        Arc::new(signer),
        Arc::new(MemorySessionStore::new()),
    );
    let mut transitions = machine.subscribe_transitions();
    tokio::spawn(async move {
        while let Ok(transition) = transitions.recv().await {
            println!("  {} -> {}", transition.from.name(), transition.to.name());
        }
    });

    if let Err(e) = machine.connect(None).await {
        eprintln!("Connect failed: {}", e);
        return;
    }

    match machine.sign_in().await {
        Ok(session) => {
            println!("✓ Signed in as {} ({})", session.address, session.tier);
            let snapshot = machine.entitlements();
            println!("  features: {:?}", snapshot.features);
        }
        Err(e) if e.is_retryable() => eprintln!("Backend not reachable, try again: {}", e),
        Err(e) => eprintln!("Sign-in failed: {}", e),
    }

    let _ = machine.sign_out().await;
    println!("\n✓ Sign-in example complete");
}
