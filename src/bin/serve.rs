use anyhow::Result;

#[tokio::main]
pub async fn main() -> Result<()> {
    cchain_indexer::start_server().await
}
