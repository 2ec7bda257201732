use grid_core::config::GridConfig;
use grid_core::container::PartitionStore;
use grid_core::membership::types::{Node, NodeId};
use grid_core::membership::view::MembershipView;
use grid_core::operation::handlers::node_router;
use grid_core::operation::{HttpTransport, OperationService, PartitionExecutor};
use grid_core::partition::PartitionRouter;
use std::net::SocketAddr;
use std::path::PathBuf;

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} --bind <addr:port> [--node-id <id>] [--member <id>=<addr:port>]... [--config <path>]",
        program
    );
    eprintln!("Example: {} --bind 127.0.0.1:6000 --node-id a", program);
    eprintln!(
        "Example: {} --bind 127.0.0.1:6001 --node-id b --member a=127.0.0.1:6000",
        program
    );
    std::process::exit(1);
}

fn parse_member(raw: &str) -> anyhow::Result<Node> {
    let (id, addr) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("--member expects <id>=<addr:port>, got '{}'", raw))?;
    Ok(Node::alive(NodeId(id.to_string()), addr.parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        usage(&args[0]);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut node_id: Option<NodeId> = None;
    let mut members: Vec<Node> = vec![];
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--bind", Some(v)) => bind_addr = Some(v.parse()?),
            ("--node-id", Some(v)) => node_id = Some(NodeId(v.clone())),
            ("--member", Some(v)) => members.push(parse_member(v)?),
            ("--config", Some(v)) => config_path = Some(PathBuf::from(v)),
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }

    let Some(bind_addr) = bind_addr else {
        usage(&args[0]);
    };

    let config = match &config_path {
        Some(path) => GridConfig::load(path)?,
        None => GridConfig::default(),
    };
    config.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    // 1. Membership (pushed by the external membership service):
    let local = Node::alive(node_id.unwrap_or_default(), bind_addr);
    tracing::info!("Starting node {} on {}", local.id, bind_addr);
    if members.is_empty() {
        tracing::info!("No static members given; starting as a single-node grid");
    } else {
        tracing::info!("Static members: {:?}", members.iter().map(|m| &m.id).collect::<Vec<_>>());
    }
    let membership = MembershipView::with_members(local, members);

    // 2. Routing and partition threads:
    let router = PartitionRouter::new(
        membership.clone(),
        config.partition_count,
        config.backup_count,
    );
    let store = PartitionStore::new(None, config.queue_capacity);
    let executor = PartitionExecutor::start(store, config.worker_count)?;

    // 3. Dispatch:
    let transport = HttpTransport::new(membership.clone(), &config.transport);
    let service = OperationService::new(router, executor, transport);

    // 4. HTTP Router:
    let app = node_router(service.clone());

    // 5. Spawn stats reporter:
    let stats_service = service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));

        loop {
            interval.tick().await;
            let stats = stats_service.stats();
            tracing::info!(
                "Grid stats: epoch={} alive={} primary={} backup={} containers={} pending_backups={}",
                stats.epoch,
                stats.alive_members,
                stats.primary_partitions,
                stats.backup_partitions,
                stats.containers,
                stats_service.replicator().pending()
            );
        }
    });

    // 6. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
