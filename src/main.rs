use replset::{ClientError, ClusterConfig, ClusterController, Filter, MemberInfo, NodeId, ReplSetOptions, Session};
use serde_json::json;
use slog::Drain;
use std::error::Error;
use std::net::Ipv4Addr;
use tokio::time::{sleep, Duration, Instant};

const COLLECTION: &str = "mycollection";

/// Walks through a three member replica set the way a shell session would: fill the primary,
/// read from a secondary, take the primary down and fail over by hand.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger();
    let members = demo_members(31000);

    let controller = ClusterController::start(ClusterConfig {
        logger: logger.clone(),
        members: members.clone(),
        initial_primary: members[0].node_id.clone(),
        options: ReplSetOptions::default(),
    })
    .await?;

    let primary = &members[0];
    let s1 = &members[1];
    let s2 = &members[2];

    let mut conn = Session::connect(primary.socket_addr()).await?;
    for i in 0..10 {
        conn.write(COLLECTION, json!({ "count": i })).await?;
    }
    slog::info!(logger, "Inserted 10 documents on {}", primary.node_id);

    let mut secondary = Session::connect(s2.socket_addr()).await?;
    match secondary.read(&Filter::all(COLLECTION)).await {
        Err(e @ ClientError::NotPrimaryNoStaleReadsAllowed) => {
            slog::info!(logger, "Read on {} refused: {} ({:?}, code {:?})", s2.node_id, e, e.code_name(), e.code())
        }
        other => slog::warn!(logger, "Expected a refused read, got {:?}", other),
    }

    secondary.set_allow_stale_reads(true);
    let documents = wait_for_documents(&secondary, 10, Duration::from_secs(5)).await?;
    for doc in &documents {
        slog::info!(logger, "{} has {}", s2.node_id, String::from_utf8_lossy(&doc.body_json()));
    }

    match secondary.write(COLLECTION, json!({ "count": 11 })).await {
        Err(e @ ClientError::NotPrimary { .. }) => {
            slog::info!(logger, "Write on {} refused: {} (code {:?})", s2.node_id, e, e.code())
        }
        other => slog::warn!(logger, "Expected a refused write, got {:?}", other),
    }

    // Opened before the failover, like the shell's second connection.
    let mut conn2 = Session::connect(s1.socket_addr()).await?;

    controller.shutdown(&NodeId::new(primary.node_id.clone())).await?;
    slog::info!(logger, "{} shut down", primary.node_id);

    let epoch = controller.manual_failover(&NodeId::new(s1.node_id.clone())).await?;
    slog::info!(logger, "{} is the new primary at epoch {:?}", s1.node_id, epoch);

    let seq = conn2.write(COLLECTION, json!({ "count": 11 })).await?;
    slog::info!(logger, "Write on {} accepted at {:?}", s1.node_id, seq);

    for record in controller.refresh().await.nodes() {
        slog::info!(
            logger,
            "{} role={:?} last_applied={:?} reachable={}",
            record.id,
            record.role,
            record.last_applied,
            record.reachable
        );
    }

    controller.stop().await;
    Ok(())
}

async fn wait_for_documents(
    session: &Session,
    expected: usize,
    timeout: Duration,
) -> Result<Vec<replset::Document>, Box<dyn Error>> {
    let deadline = Instant::now() + timeout;
    loop {
        let documents = session.read(&Filter::all(COLLECTION)).await?;
        if documents.len() >= expected {
            return Ok(documents);
        }
        if Instant::now() > deadline {
            return Err(format!("only {} of {} documents replicated", documents.len(), expected).into());
        }
        sleep(Duration::from_millis(50)).await;
    }
}

fn demo_members(port_base: u16) -> Vec<MemberInfo> {
    (0..3)
        .map(|i| MemberInfo {
            node_id: format!("node-{}", i),
            ip_addr: Ipv4Addr::LOCALHOST,
            port: port_base + i,
        })
        .collect()
}

fn create_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
