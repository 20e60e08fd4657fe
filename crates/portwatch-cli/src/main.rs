//! portwatch - host and container monitoring agents.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    portwatch_cli::run().await
}
