use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use upload_gateway::{
    client::commands,
    config::{AppConfig, Cli, ClientConfig, Command},
    server,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let cfg = AppConfig::from_env_and_args(args)?;
            tracing::info!("Starting upload-gateway with config: {:?}", redacted(&cfg));
            server::run(cfg).await
        }
        Command::Upload {
            client,
            paths,
            name,
        } => commands::upload(ClientConfig::from_env_and_args(client), paths, name).await,
        Command::Ls {
            client,
            prefix,
            limit,
            cursor,
            recursive,
        } => {
            commands::list(
                ClientConfig::from_env_and_args(client),
                prefix,
                limit,
                cursor,
                recursive,
            )
            .await
        }
        Command::Get {
            client,
            key,
            output,
        } => commands::download(ClientConfig::from_env_and_args(client), key, output).await,
        Command::Rm { client, key } => {
            commands::delete(ClientConfig::from_env_and_args(client), key).await
        }
        Command::Buckets { client } => {
            commands::buckets(ClientConfig::from_env_and_args(client)).await
        }
    }
}

/// The config as logged at startup, without the token.
fn redacted(cfg: &AppConfig) -> AppConfig {
    let mut cfg = cfg.clone();
    if cfg.api_token.is_some() {
        cfg.api_token = Some("<redacted>".into());
    }
    cfg
}
