//! RPC transport construction.
//!
//! Builds one [`RpcClient`] per chain from the configured HTTP endpoints,
//! layering per-endpoint throttling and cross-endpoint fallback so a single
//! flaky provider does not take the reader down.

use alloy_rpc_client::RpcClient;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use std::num::NonZeroUsize;
use strand_types::config::RpcConfig;
use tower::ServiceBuilder;

use crate::error::ChainError;

/// Builds an RPC client over all configured HTTP endpoints for a chain.
pub fn rpc_client(chain_id: u64, rpc: &[RpcConfig]) -> Result<RpcClient, ChainError> {
    let transports = rpc
        .iter()
        .filter_map(|provider_config| {
            let scheme = provider_config.http.scheme();
            let is_http = scheme == "http" || scheme == "https";
            if !is_http {
                return None;
            }
            let rpc_url = (*provider_config.http).clone();
            tracing::info!(chain = chain_id, rpc_url = %rpc_url, rate_limit = ?provider_config.rate_limit, "using HTTP transport");
            let rate_limit = provider_config.rate_limit.unwrap_or(u32::MAX);
            let service = ServiceBuilder::new()
                .layer(ThrottleLayer::new(rate_limit))
                .service(Http::new(rpc_url));
            Some(service)
        })
        .collect::<Vec<_>>();
    let active = NonZeroUsize::new(transports.len())
        .ok_or_else(|| ChainError::Rpc(format!("no HTTP endpoints configured for chain {chain_id}")))?;
    let fallback = ServiceBuilder::new()
        .layer(FallbackLayer::default().with_active_transport_count(active))
        .service(transports);
    Ok(RpcClient::new(fallback, false))
}
