//! Fetch five random integers in [1, 100] and print them.
//!
//! Run with `RANDOMORG_API_KEY=... cargo run --example generate_integers`.

use randomorg::{ClientOptions, RandomOrgClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let credential = std::env::var("RANDOMORG_API_KEY")?;
    let client = RandomOrgClient::get(credential, ClientOptions::default());
    let numbers = client.generate_integers(5, 1, 100, true, 10).await?;
    println!("{numbers:?}");
    Ok(())
}
