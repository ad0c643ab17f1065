mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("client=info,runner=debug,worker=info")
        .init();

    cli::run().await
}
