use std::{env, sync::Arc};

use anyhow::{Context, bail};
use node_rpc::{BlockRetriever, NodeClient, shutdown::shutdown_flag};
use tracing::info;
use utxo_indexer::{Indexer, PgStore, settings::IndexerSettings};

const CONFIG_FILE: &str = "Settings.toml";

struct Args {
    config: String,
    reset_checkpoint: Option<i64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut reset_checkpoint = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--reset-checkpoint" => {
                let value = args
                    .next()
                    .context("--reset-checkpoint needs a height")?;
                reset_checkpoint = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid checkpoint height {value:?}"))?,
                );
            }
            flag if flag.starts_with("--") => bail!("Unknown option {flag}"),
            path if config.is_none() => config = Some(path.to_string()),
            extra => bail!("Unexpected argument {extra}"),
        }
    }

    Ok(Args {
        config: config.unwrap_or_else(|| CONFIG_FILE.to_string()),
        reset_checkpoint,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "utxo_indexer=info,node_rpc=info,sqlx=warn".into()),
        )
        .try_init();

    let args = parse_args()?;
    let settings = IndexerSettings::try_from_toml(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config))?;
    info!(
        rpc_url = %settings.node.rpc_url,
        wait_interval_ms = settings.indexer.wait_interval_ms,
        "Loaded configuration"
    );

    let credential = settings
        .node
        .credential()
        .context("Failed to resolve node credentials")?;
    let client = NodeClient::new(
        settings.node.rpc_url.clone(),
        credential,
        settings.node.timeout(),
    )?;

    let store = PgStore::from_db_url(&settings.indexer.db_url, settings.indexer.max_connections)
        .await
        .context("Failed to connect to database")?;
    store
        .create_tables()
        .await
        .context("Failed to create database tables")?;

    let mut indexer = Indexer::builder()
        .with_store(Arc::new(store))
        .with_source(Arc::new(BlockRetriever::new(client)))
        .with_wait_interval(settings.indexer.wait_interval())
        .with_shutdown(shutdown_flag())
        .build()?;

    if let Some(height) = args.reset_checkpoint {
        indexer.reset_checkpoint(height).await?;
    }

    indexer.run().await?;
    Ok(())
}
