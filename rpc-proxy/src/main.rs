use std::{env, sync::Arc};

use anyhow::Context;
use node_rpc::shutdown::{shutdown_flag, stopped};
use rpc_proxy::{HttpProxy, ProxySettings, TcpProxy, Upstream};
use tracing::info;

const CONFIG_FILE: &str = "Settings.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rpc_proxy=info,node_rpc=info,tower_http=info".into()),
        )
        .try_init();

    let config = env::args().nth(1).unwrap_or_else(|| CONFIG_FILE.to_string());
    let settings = ProxySettings::try_from_toml(&config)
        .with_context(|| format!("Failed to load settings from {config}"))?;

    let credential = settings
        .node
        .credential()
        .context("Failed to resolve node credentials")?;
    let upstream = Arc::new(Upstream::new(
        &settings.node.rpc_url,
        credential,
        settings.proxy.upstream_timeout(),
    )?);
    info!(upstream = %settings.node.rpc_url, "Proxying to node");

    let stop = shutdown_flag();

    let http = HttpProxy::new(settings.proxy.http_addr, upstream.clone());
    let tcp = TcpProxy::new(
        settings.proxy.tcp_addr,
        upstream,
        settings.proxy.client_timeout(),
    );

    let (http_result, tcp_result) = tokio::join!(
        http.run(stopped(stop.clone())),
        tcp.run(stopped(stop)),
    );
    http_result.context("HTTP proxy failed")?;
    tcp_result.context("TCP proxy failed")?;
    Ok(())
}
