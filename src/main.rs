use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use approval_gateway::config::{self, Config, LogFormat};
use approval_gateway::liveness::SignalCheck;
use approval_gateway::models::approval::{ApprovalRequest, Decision};
use approval_gateway::service::ApprovalService;
use approval_gateway::store::queue::QueueError;
use approval_gateway::{api, cli, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let mut cfg = config::load();
    args.apply_overrides(&mut cfg);
    init_tracing(cfg.log_format, args.logs_to_stderr());

    let service = Arc::new(ApprovalService::open(
        cfg.queue_dir.clone(),
        Arc::new(SignalCheck),
    ));

    let result = match args.command {
        Some(cli::Commands::Serve { .. }) | None => run_server(cfg, service).await,
        Some(cli::Commands::Pending) => print_pending(&service).await,
        Some(cli::Commands::Respond {
            request_id,
            decision,
        }) => respond(&service, &request_id, decision).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// `to_stderr` keeps logs out of command output that may be piped.
fn init_tracing(format: LogFormat, to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "approval_gateway=info,tower_http=info".into()),
    );
    let writer = if to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init(),
    }
}

async fn run_server(cfg: Config, service: Arc<ApprovalService>) -> anyhow::Result<()> {
    service
        .queue()
        .ensure_dir()
        .await
        .context("failed to create queue directory")?;
    tracing::info!(path = %cfg.queue_dir.display(), "watching queue directory");

    match cfg.sweep_interval {
        Some(every) => {
            jobs::cleanup::spawn(service.clone(), every);
            tracing::info!("Background cleanup job started (every {}s)", every.as_secs());
        }
        None => tracing::info!("Background cleanup job disabled"),
    }

    let app = api::app_router(Arc::new(AppState::new(service)));

    let addr = SocketAddr::new(cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Approval gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn print_pending(service: &ApprovalService) -> anyhow::Result<()> {
    let requests = service.list_pending().await?;
    if requests.is_empty() {
        println!("No pending requests.");
        return Ok(());
    }

    println!("{:<28} {:<12} {:<10} DETAIL", "ID", "TOOL", "TIME");
    for r in requests {
        println!(
            "{:<28} {:<12} {:<10} {}",
            r.id,
            r.tool_name,
            format_time(&r),
            first_line(&r.detail)
        );
    }
    Ok(())
}

async fn respond(service: &ApprovalService, id: &str, decision: Decision) -> anyhow::Result<()> {
    match service.resolve(id, decision).await {
        Ok(()) => {
            println!("Recorded '{}' for {}.", decision, id);
            Ok(())
        }
        Err(QueueError::NotFound(_)) => anyhow::bail!("no pending request with id '{}'", id),
        Err(QueueError::AlreadyResolved(_)) => {
            anyhow::bail!("request '{}' already has a decision", id)
        }
        Err(e) => Err(e).context("failed to record decision"),
    }
}

fn format_time(r: &ApprovalRequest) -> String {
    let secs = r.timestamp.trunc() as i64;
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
