use replset::{
    ClientError, ClusterConfig, ClusterController, CommandKind, ControlCommand, ControllerError, Epoch, Filter,
    MemberInfo, NodeClient, NodeId, ReplSetOptions, Role, SeqNo, Session,
};
use serde_json::json;
use slog::Drain;
use std::error::Error;
use std::net::Ipv4Addr;
use tokio::time::{Duration, Instant};

const COLLECTION: &str = "mycollection";

#[tokio::test]
async fn secondaries_replicate_and_gate_reads_and_writes() -> Result<(), Box<dyn Error>> {
    let members = members(32000);
    let controller = start(&members, ReplSetOptions::default()).await?;

    let mut primary = Session::connect(members[0].socket_addr()).await?;
    for i in 0..10 {
        let seq = primary.write(COLLECTION, json!({ "count": i })).await?;
        assert_eq!(seq, SeqNo::new(i + 1));
    }

    // Secondary without stale reads
    let mut s2 = Session::connect(members[2].socket_addr()).await?;
    match s2.read(&Filter::all(COLLECTION)).await {
        Err(e) => {
            assert!(matches!(e, ClientError::NotPrimaryNoStaleReadsAllowed));
            assert_eq!(e.code(), Some(13435));
            assert_eq!(e.code_name(), Some("NotMasterNoSlaveOk"));
        }
        Ok(docs) => panic!("Secondary served a read without stale reads: {:?}", docs),
    }

    // With stale reads, eventually exactly the 10 documents
    s2.set_allow_stale_reads(true);
    let docs = wait_for_documents(&s2, 10, Duration::from_secs(5)).await?;
    assert_eq!(docs.len(), 10);
    let counts: Vec<i64> = docs.iter().filter_map(|d| d.body.get("count")?.as_i64()).collect();
    assert_eq!(counts, (0..10).collect::<Vec<i64>>());

    let mut s1 = Session::connect(members[1].socket_addr()).await?;
    s1.set_allow_stale_reads(true);
    wait_for_documents(&s1, 10, Duration::from_secs(5)).await?;

    // Field filter
    let mut conditions = serde_json::Map::new();
    conditions.insert("count".to_string(), json!(3));
    let docs = s2.read(&Filter::new(COLLECTION, conditions)).await?;
    assert_eq!(docs.len(), 1);

    // Secondary refuses writes, stale reads or not
    match s2.write(COLLECTION, json!({ "count": 11 })).await {
        Err(e) => {
            assert_eq!(e.code(), Some(10107));
            assert!(matches!(e, ClientError::NotPrimary { primary: Some(ref p) } if p.as_str() == "node-0"));
        }
        Ok(seq) => panic!("Secondary accepted a write at {:?}", seq),
    }

    let status = s2.is_master().await?;
    assert_eq!(status.role, Role::Secondary);
    assert_eq!(status.primary, Some(NodeId::from("node-0")));
    assert_eq!(status.epoch, Epoch::initial());

    controller.stop().await;
    Ok(())
}

#[tokio::test]
async fn manual_failover_after_primary_shutdown() -> Result<(), Box<dyn Error>> {
    let members = members(32100);
    let controller = start(&members, ReplSetOptions::default()).await?;

    let mut primary = Session::connect(members[0].socket_addr()).await?;
    for i in 0..10 {
        primary.write(COLLECTION, json!({ "count": i })).await?;
    }
    let mut s1 = Session::connect(members[1].socket_addr()).await?;
    s1.set_allow_stale_reads(true);
    wait_for_documents(&s1, 10, Duration::from_secs(5)).await?;

    controller.shutdown(&id(0)).await?;
    assert!(!controller.view().await.node(&id(0)).unwrap().reachable);
    // Shutting it down again is harmless; a name outside the set is not
    controller.shutdown(&id(0)).await?;
    assert!(matches!(
        controller.shutdown(&NodeId::from("node-9")).await,
        Err(ControllerError::UnknownNode(_))
    ));
    // Nobody gets promoted on their own
    assert_eq!(controller.view().await.primary(), Some(&id(0)));

    let epoch = controller.manual_failover(&id(1)).await?;
    assert_eq!(epoch, Epoch::new(2));

    let view = controller.view().await;
    assert_eq!(view.primary(), Some(&id(1)));
    assert_eq!(view.epoch(), Epoch::new(2));
    assert_eq!(view.role_of(&id(0)), Some(Role::Removed));
    assert_eq!(view.role_of(&id(2)), Some(Role::Secondary));

    // Session opened before the failover still carries epoch 1
    assert_eq!(s1.observed_epoch(), Epoch::initial());
    let seq = s1.write(COLLECTION, json!({ "count": 10 })).await?;
    assert_eq!(seq, SeqNo::new(11));
    assert_eq!(s1.observed_epoch(), Epoch::new(2));

    let mut fresh = Session::connect(members[1].socket_addr()).await?;
    assert_eq!(fresh.observed_epoch(), Epoch::new(2));
    assert_eq!(fresh.write(COLLECTION, json!({ "count": 11 })).await?, SeqNo::new(12));

    let mut s2 = Session::connect(members[2].socket_addr()).await?;
    s2.set_allow_stale_reads(true);
    wait_for_documents(&s2, 12, Duration::from_secs(5)).await?;
    let status = s2.is_master().await?;
    assert_eq!(status.primary, Some(id(1)));

    // Removed nodes can't be promoted
    assert!(matches!(
        controller.manual_failover(&id(0)).await,
        Err(ControllerError::NodeRemoved(_))
    ));

    controller.stop().await;
    Ok(())
}

#[tokio::test]
async fn reachable_primary_is_demoted_and_follows_new_primary() -> Result<(), Box<dyn Error>> {
    let members = members(32200);
    let controller = start(&members, ReplSetOptions::default()).await?;

    let mut p = Session::connect(members[0].socket_addr()).await?;
    for i in 0..5 {
        p.write(COLLECTION, json!({ "count": i })).await?;
    }
    let mut s1 = Session::connect(members[1].socket_addr()).await?;
    s1.set_allow_stale_reads(true);
    wait_for_documents(&s1, 5, Duration::from_secs(5)).await?;

    let epoch = controller.manual_failover(&id(1)).await?;
    assert_eq!(epoch, Epoch::new(2));
    assert_eq!(controller.view().await.role_of(&id(0)), Some(Role::Secondary));

    // Old primary now refuses writes. Its session still carries the old epoch tag.
    match p.write(COLLECTION, json!({ "count": 99 })).await {
        Err(ClientError::NotPrimary { primary }) => assert_eq!(primary, Some(id(1))),
        other => panic!("Demoted primary answered {:?}", other),
    }

    let mut s1 = Session::connect(members[1].socket_addr()).await?;
    s1.write(COLLECTION, json!({ "count": 5 })).await?;

    let mut old = Session::connect(members[0].socket_addr()).await?;
    old.set_allow_stale_reads(true);
    wait_for_documents(&old, 6, Duration::from_secs(5)).await?;
    let status = old.is_master().await?;
    assert_eq!(status.role, Role::Secondary);
    assert_eq!(status.primary, Some(id(1)));

    controller.stop().await;
    Ok(())
}

#[tokio::test]
async fn demoted_primary_rolls_back_operations_new_primary_never_saw() -> Result<(), Box<dyn Error>> {
    let members = members(32600);
    let controller = start(&members, ReplSetOptions::default()).await?;

    let mut p = Session::connect(members[0].socket_addr()).await?;
    for i in 0..5 {
        p.write(COLLECTION, json!({ "count": i })).await?;
    }
    let mut s1 = Session::connect(members[1].socket_addr()).await?;
    s1.set_allow_stale_reads(true);
    wait_for_documents(&s1, 5, Duration::from_secs(5)).await?;

    // Cut node-1 off from the primary without telling the controller
    let node1 = NodeClient::connect(members[1].socket_addr(), Duration::from_millis(500)).await?;
    node1
        .control(&ControlCommand {
            epoch: Epoch::initial(),
            kind: CommandKind::Demote,
            target: id(0),
        })
        .await?;

    // Only node-0 (and node-2) ever see these
    p.write(COLLECTION, json!({ "count": 50 })).await?;
    p.write(COLLECTION, json!({ "count": 51 })).await?;
    assert_eq!(s1.read(&Filter::all(COLLECTION)).await?.len(), 5);

    controller.manual_failover(&id(1)).await?;
    let mut s1 = Session::connect(members[1].socket_addr()).await?;
    s1.write(COLLECTION, json!({ "count": 5 })).await?;

    let expected: Vec<i64> = (0..6).collect();
    for m in &[&members[0], &members[2]] {
        let mut session = Session::connect(m.socket_addr()).await?;
        session.set_allow_stale_reads(true);
        let docs = wait_for_documents(&session, 6, Duration::from_secs(5)).await?;
        let counts: Vec<i64> = docs.iter().filter_map(|d| d.body.get("count")?.as_i64()).collect();
        assert_eq!(counts, expected, "{} kept a divergent suffix", m.node_id);
    }

    controller.stop().await;
    Ok(())
}

#[tokio::test]
async fn stale_epoch_commands_are_rejected() -> Result<(), Box<dyn Error>> {
    let members = members(32300);
    let controller = start(&members, ReplSetOptions::default()).await?;
    controller.manual_failover(&id(2)).await?;

    let client = NodeClient::connect(members[1].socket_addr(), Duration::from_millis(500)).await?;
    let stale = ControlCommand {
        epoch: Epoch::initial(),
        kind: CommandKind::Promote,
        target: id(1),
    };
    match client.control(&stale).await {
        Err(ClientError::StaleEpoch { current }) => assert_eq!(current, Epoch::new(2)),
        other => panic!("Stale command answered {:?}", other),
    }

    let status = client.status().await?;
    assert_eq!(status.role, Role::Secondary);
    assert_eq!(status.primary, Some(id(2)));

    controller.stop().await;
    Ok(())
}

#[tokio::test]
async fn automatic_failover_promotes_a_caught_up_secondary() -> Result<(), Box<dyn Error>> {
    let members = members(32400);
    let options = ReplSetOptions {
        link_initial_backoff: Some(Duration::from_millis(10)),
        link_max_backoff: Some(Duration::from_millis(50)),
        link_unreachable_after: Some(2),
        automatic_failover: Some(true),
        ..ReplSetOptions::default()
    };
    let controller = start(&members, options).await?;

    let mut p = Session::connect(members[0].socket_addr()).await?;
    for i in 0..3 {
        p.write(COLLECTION, json!({ "count": i })).await?;
    }
    for m in &members[1..] {
        let mut s = Session::connect(m.socket_addr()).await?;
        s.set_allow_stale_reads(true);
        wait_for_documents(&s, 3, Duration::from_secs(5)).await?;
    }

    controller.shutdown(&id(0)).await?;

    let deadline = Instant::now() + Duration::from_secs(10);
    let new_primary = loop {
        let view = controller.view().await;
        match view.primary() {
            Some(p) if p != &id(0) => break p.clone(),
            _ if Instant::now() > deadline => panic!("No automatic failover. View: {:?}", view),
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    };

    let view = controller.view().await;
    assert_eq!(view.epoch(), Epoch::new(2));
    assert_eq!(view.role_of(&id(0)), Some(Role::Removed));

    let addr = view.node(&new_primary).unwrap().addr;
    let mut session = Session::connect(addr).await?;
    assert_eq!(session.write(COLLECTION, json!({ "count": 3 })).await?, SeqNo::new(4));

    controller.stop().await;
    Ok(())
}

#[tokio::test]
async fn invalid_cluster_configs_are_rejected() {
    let members = members(32500);
    let result = ClusterController::start(ClusterConfig {
        logger: create_root_logger_for_stdout(),
        members: members.clone(),
        initial_primary: "nobody".to_string(),
        options: ReplSetOptions::default(),
    })
    .await;
    assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));

    let result = ClusterController::start(ClusterConfig {
        logger: create_root_logger_for_stdout(),
        members,
        initial_primary: "node-0".to_string(),
        options: ReplSetOptions {
            rpc_timeout: Some(Duration::from_millis(0)),
            ..ReplSetOptions::default()
        },
    })
    .await;
    assert!(matches!(result, Err(ControllerError::InvalidOptions(_))));
}

async fn start(members: &[MemberInfo], options: ReplSetOptions) -> Result<ClusterController, ControllerError> {
    ClusterController::start(ClusterConfig {
        logger: create_root_logger_for_stdout(),
        members: members.to_vec(),
        initial_primary: members[0].node_id.clone(),
        options,
    })
    .await
}

async fn wait_for_documents(
    session: &Session,
    expected: usize,
    timeout: Duration,
) -> Result<Vec<replset::Document>, Box<dyn Error>> {
    let deadline = Instant::now() + timeout;
    loop {
        let docs = session.read(&Filter::all(COLLECTION)).await?;
        if docs.len() == expected {
            return Ok(docs);
        }
        if Instant::now() > deadline {
            return Err(format!("Expected {} documents, have {}", expected, docs.len()).into());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn members(port_base: u16) -> Vec<MemberInfo> {
    (0..3)
        .map(|i| MemberInfo {
            node_id: format!("node-{}", i),
            ip_addr: Ipv4Addr::LOCALHOST,
            port: port_base + i,
        })
        .collect()
}

fn id(i: usize) -> NodeId {
    NodeId::new(format!("node-{}", i))
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
