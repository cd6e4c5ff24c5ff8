//! tmctl: run a single tablet manager RPC against a configured tablet.
//!
//! Usage: `tmctl <config.yaml> <alias> <command> [args]`
//!
//! Loads the client config, resolves the alias to an endpoint, issues the
//! call under the configured default deadline and prints the result.
//! Ctrl+C cancels the call in flight.

use std::str::FromStr;
use tmrpc_common::{is_timeout_error, TabletAlias};
use tmrpc_net::{CallContext, StreamCompletion, TabletManagerClient};
use tokio::sync::mpsc;

const USAGE: &str = "usage: tmctl <config.yaml> <alias> <command> [args]

commands:
  ping
  replication-status
  primary-position
  get-schema [table...]
  set-read-only
  set-read-write
  reload-schema
  health-stream
  backup [concurrency]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Ping,
    ReplicationStatus,
    PrimaryPosition,
    GetSchema { tables: Vec<String> },
    SetReadOnly,
    SetReadWrite,
    ReloadSchema,
    HealthStream,
    Backup { concurrency: i64 },
}

impl Command {
    fn parse(name: &str, args: &[String]) -> Result<Self, String> {
        let command = match name {
            "ping" => Command::Ping,
            "replication-status" => Command::ReplicationStatus,
            "primary-position" => Command::PrimaryPosition,
            "get-schema" => Command::GetSchema {
                tables: args.to_vec(),
            },
            "set-read-only" => Command::SetReadOnly,
            "set-read-write" => Command::SetReadWrite,
            "reload-schema" => Command::ReloadSchema,
            "health-stream" => Command::HealthStream,
            "backup" => {
                let concurrency = match args.first() {
                    Some(n) => i64::from_str(n)
                        .map_err(|_| format!("backup concurrency must be a number, got {:?}", n))?,
                    None => 4,
                };
                Command::Backup { concurrency }
            }
            other => return Err(format!("unknown command {:?}", other)),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tmrpc_metrics::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }
    let config = tmrpc_config::load_from_file(std::path::Path::new(&args[0]))?;
    let alias = TabletAlias::from_str(&args[1])?;
    let command = Command::parse(&args[2], &args[3..])?;

    let endpoint = config
        .endpoint(&alias)
        .ok_or_else(|| format!("tablet {} is not in {}", alias, args[0]))?;

    // Spawn metrics HTTP server if configured
    if let Some(metrics_port) = config.metrics_port {
        let metrics_addr = std::net::SocketAddr::from(([0, 0, 0, 0], metrics_port));
        tokio::spawn(async move {
            if let Err(e) = tmrpc_metrics::serve_metrics(metrics_addr).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    let ctx = match config.default_timeout() {
        Some(timeout) => CallContext::with_timeout(timeout),
        None => CallContext::background(),
    };
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, cancelling");
            interrupt.cancel();
        }
    });

    let client = TabletManagerClient::grpc().with_stream_buffer(config.stream_buffer);
    tracing::debug!(%endpoint, ?command, "running");

    let result = run(&client, &ctx, &endpoint, command).await;
    if let Err(e) = &result {
        if is_timeout_error(e) {
            tracing::warn!("call timed out; raise default_timeout_ms to wait longer");
        }
    }
    result?;
    Ok(())
}

async fn run(
    client: &TabletManagerClient,
    ctx: &CallContext,
    endpoint: &tmrpc_common::RemoteEndpoint,
    command: Command,
) -> Result<(), tmrpc_common::CallError> {
    match command {
        Command::Ping => {
            client.ping(ctx, endpoint).await?;
            println!("{} is alive", endpoint.alias);
        }
        Command::ReplicationStatus => {
            let status = client.replication_status(ctx, endpoint).await?;
            println!("position:        {}", status.position);
            println!(
                "primary:         {}:{}",
                status.primary_host, status.primary_port
            );
            println!("replicating:     {}", status.is_replicating());
            println!("seconds behind:  {}", status.seconds_behind_primary);
        }
        Command::PrimaryPosition => {
            let position = client.primary_position(ctx, endpoint).await?;
            println!("{}", position);
        }
        Command::GetSchema { tables } => {
            let schema = client.get_schema(ctx, endpoint, &tables, &[], false).await?;
            println!("version {}", schema.version);
            for table in &schema.table_definitions {
                println!("{}: {} rows", table.name, table.row_count);
                println!("  {}", table.schema);
            }
        }
        Command::SetReadOnly => {
            client.set_read_only(ctx, endpoint).await?;
            println!("{} is read-only", endpoint.alias);
        }
        Command::SetReadWrite => {
            client.set_read_write(ctx, endpoint).await?;
            println!("{} is read-write", endpoint.alias);
        }
        Command::ReloadSchema => {
            client.reload_schema(ctx, endpoint).await?;
            println!("schema reloaded on {}", endpoint.alias);
        }
        Command::HealthStream => {
            let (rx, done) = client.health_stream(ctx, endpoint).await?;
            drain(rx, done, |reply| {
                if reply.is_healthy() {
                    format!("healthy, replication delay {:?}", reply.replication_delay)
                } else {
                    format!("unhealthy: {}", reply.health_error)
                }
            })
            .await?;
        }
        Command::Backup { concurrency } => {
            let (rx, done) = client.backup(ctx, endpoint, concurrency).await?;
            drain(rx, done, |event| event.to_string()).await?;
            println!("backup of {} complete", endpoint.alias);
        }
    }
    Ok(())
}

/// Print every streamed item, then report how the stream ended.
async fn drain<T>(
    mut rx: mpsc::Receiver<T>,
    mut done: StreamCompletion,
    render: impl Fn(T) -> String,
) -> Result<(), tmrpc_common::CallError> {
    while let Some(item) = rx.recv().await {
        println!("{}", render(item));
    }
    done.finish().await
}
