//! Metrics and tracing setup for the tablet manager client.
//!
//! Every call path reports into one process-wide [`ClientMetrics`]
//! registry; [`serve_metrics`] exposes it for scraping.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

static METRICS: OnceLock<ClientMetrics> = OnceLock::new();

/// The process-wide registry, created on first use.
pub fn metrics() -> &'static ClientMetrics {
    METRICS.get_or_init(ClientMetrics::new)
}

/// Call shape label for latency and outcome series.
pub const SHAPE_UNARY: &str = "unary";
pub const SHAPE_STREAM: &str = "stream";

/// All Prometheus metrics for a tablet manager client process.
pub struct ClientMetrics {
    pub registry: Registry,

    // ── Calls ──
    pub calls_started: IntCounterVec,
    pub call_outcomes: IntCounterVec,
    pub dial_failures: IntCounterVec,

    // ── Streams ──
    pub streams_opened: IntCounterVec,
    pub frames_forwarded: IntCounterVec,

    // ── Latency ──
    pub call_latency_secs: HistogramVec,
}

impl std::fmt::Debug for ClientMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMetrics").finish_non_exhaustive()
    }
}

/// Histogram buckets (seconds). Tablet manager calls range from sub-millisecond
/// pings to multi-minute reparent waits.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0,
];

impl ClientMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let calls_started = IntCounterVec::new(
            Opts::new(
                "tmrpc_calls_started_total",
                "Tablet manager calls started, by method",
            ),
            &["method"],
        )
        .expect("calls_started counter vec");
        let call_outcomes = IntCounterVec::new(
            Opts::new(
                "tmrpc_call_outcomes_total",
                "Tablet manager calls finished, by method and outcome",
            ),
            &["method", "outcome"],
        )
        .expect("call_outcomes counter vec");
        let dial_failures = IntCounterVec::new(
            Opts::new(
                "tmrpc_dial_failures_total",
                "Connection attempts that failed, by method",
            ),
            &["method"],
        )
        .expect("dial_failures counter vec");

        let streams_opened = IntCounterVec::new(
            Opts::new(
                "tmrpc_streams_opened_total",
                "Server-streaming calls opened, by method",
            ),
            &["method"],
        )
        .expect("streams_opened counter vec");
        let frames_forwarded = IntCounterVec::new(
            Opts::new(
                "tmrpc_stream_frames_forwarded_total",
                "Stream frames handed to consumers, by method",
            ),
            &["method"],
        )
        .expect("frames_forwarded counter vec");

        let call_latency_secs = HistogramVec::new(
            HistogramOpts::new(
                "tmrpc_call_latency_seconds",
                "Tablet manager call latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method", "shape"],
        )
        .expect("call_latency_secs histogram");

        // Register all metrics
        registry
            .register(Box::new(calls_started.clone()))
            .expect("register calls_started");
        registry
            .register(Box::new(call_outcomes.clone()))
            .expect("register call_outcomes");
        registry
            .register(Box::new(dial_failures.clone()))
            .expect("register dial_failures");
        registry
            .register(Box::new(streams_opened.clone()))
            .expect("register streams_opened");
        registry
            .register(Box::new(frames_forwarded.clone()))
            .expect("register frames_forwarded");
        registry
            .register(Box::new(call_latency_secs.clone()))
            .expect("register call_latency_secs");

        Self {
            registry,
            calls_started,
            call_outcomes,
            dial_failures,
            streams_opened,
            frames_forwarded,
            call_latency_secs,
        }
    }
}

/// Render the registry in the text exposition format.
pub fn encode_metrics() -> String {
    let families = metrics().registry.gather();
    let mut out = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut out)
        .expect("prometheus text encoding");
    String::from_utf8_lossy(&out).into_owned()
}

/// Helper: count a started call and start its latency timer. The returned
/// guard records elapsed time on drop.
pub fn start_call_timer(method: &str, shape: &str) -> prometheus::HistogramTimer {
    let m = metrics();
    m.calls_started.with_label_values(&[method]).inc();
    m.call_latency_secs
        .with_label_values(&[method, shape])
        .start_timer()
}

/// Helper: count a finished call under `outcome` (`ok`, `timeout`, ...).
pub fn record_outcome(method: &str, outcome: &str) {
    metrics()
        .call_outcomes
        .with_label_values(&[method, outcome])
        .inc();
}

// ────────────────────────── Scrape endpoint ──────────────────────────

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

fn plain(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp
}

async fn scrape(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    if req.uri().path() != "/metrics" {
        return Ok(plain(StatusCode::NOT_FOUND, Bytes::from_static(b"not found\n")));
    }
    let mut resp = plain(StatusCode::OK, Bytes::from(encode_metrics()));
    resp.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(TEXT_FORMAT),
    );
    Ok(resp)
}

/// Expose the registry at `http://<addr>/metrics` until the listener fails.
/// Runs forever; spawn it.
pub async fn serve_metrics(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving metrics");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(scrape));
            if let Err(e) = conn.await {
                tracing::debug!(%peer, error = %e, "metrics scrape failed");
            }
        });
    }
}

// ────────────────────────── Tests ──────────────────────────
