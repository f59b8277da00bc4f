//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. All metrics live in a dedicated [`prometheus::Registry`] under the
//! `zsf` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use zsf_protocol::storage::ChainSupplyState;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Blocks connected, whether mined locally or submitted.
    pub blocks_connected_total: IntCounter,
    /// Transactions accepted into the mempool.
    pub transactions_accepted_total: IntCounter,
    /// Transactions rejected by validation or mempool policy.
    pub transactions_rejected_total: IntCounter,
    pub transactions_in_mempool: IntGauge,
    pub block_height: IntGauge,
    /// Chain value net of ZSF deposits, in zatoshis.
    pub chain_value_zatoshis: IntGauge,
    /// Cumulative ZSF deposits on the active chain, in zatoshis.
    pub zsf_deposited_zatoshis: IntGauge,
    pub rpc_latency_seconds: Histogram,
}

fn register<M>(registry: &Registry, metric: M) -> M
where
    M: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(metric.clone()))
        .expect("metric registration");
    metric
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("zsf".into()), None)
            .expect("failed to create prometheus registry");

        let counter = |name: &str, help: &str| {
            register(&registry, IntCounter::new(name, help).expect("metric creation"))
        };
        let gauge = |name: &str, help: &str| {
            register(&registry, IntGauge::new(name, help).expect("metric creation"))
        };

        let blocks_connected_total = counter("blocks_connected_total", "Total number of blocks connected");
        let transactions_accepted_total = counter(
            "transactions_accepted_total",
            "Total number of transactions accepted into the mempool",
        );
        let transactions_rejected_total = counter(
            "transactions_rejected_total",
            "Total number of transactions rejected by validation or mempool policy",
        );
        let transactions_in_mempool = gauge(
            "transactions_in_mempool",
            "Current number of pending transactions in the mempool",
        );
        let block_height = gauge("block_height", "Height of the chain tip");
        let chain_value_zatoshis = gauge(
            "chain_value_zatoshis",
            "Chain value net of ZSF deposits, in zatoshis",
        );
        let zsf_deposited_zatoshis = gauge(
            "deposited_zatoshis",
            "Cumulative ZSF deposits on the active chain, in zatoshis",
        );

        let rpc_latency_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new("rpc_latency_seconds", "JSON-RPC call latency in seconds")
                    .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            )
            .expect("metric creation"),
        );

        Self {
            registry,
            blocks_connected_total,
            transactions_accepted_total,
            transactions_rejected_total,
            transactions_in_mempool,
            block_height,
            chain_value_zatoshis,
            zsf_deposited_zatoshis,
            rpc_latency_seconds,
        }
    }

    /// Refresh the chain and mempool gauges.
    pub fn observe(&self, supply: ChainSupplyState, mempool_size: usize) {
        self.block_height.set(supply.height as i64);
        self.chain_value_zatoshis.set(supply.chain_value.zat() as i64);
        self.zsf_deposited_zatoshis.set(supply.total_deposits.zat() as i64);
        self.transactions_in_mempool.set(mempool_size as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
