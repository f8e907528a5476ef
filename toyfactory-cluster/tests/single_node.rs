//! Single-node cluster tests.
//!
//! Drives a LocalCluster through its ingress and egress streams.

mod common;

use common::TestNode;
use toyfactory_cluster::{ClusterConfig, LocalCluster};
use toyfactory_core::{
    Command, CommandFrame, CommandSink, CorrelationId, EntityId, Event, OfferError, OwnerId,
    Role, Status, encode_command,
};

fn config() -> ClusterConfig {
    ClusterConfig::builder()
        .node_id(1)
        .snapshot_threshold(0)
        .build()
        .expect("Invalid config")
}

/// Test the create / update / get lifecycle end to end.
#[tokio::test]
async fn test_entity_lifecycle() {
    let mut node = TestNode::start(config()).await;

    let created = node
        .execute(Command::Create {
            owner_id: OwnerId::new(42),
        })
        .await;
    let Event::Created {
        entity_id,
        status,
        created_at_ms,
        ..
    } = created.event
    else {
        panic!("expected Created, got {:?}", created.event);
    };
    assert_eq!(entity_id, EntityId::new(1));
    assert_eq!(status, Status::Pending);

    let updated = node
        .execute(Command::UpdateStatus {
            entity_id,
            status: Status::Assembled,
        })
        .await;
    assert!(matches!(
        updated.event,
        Event::Updated {
            status: Status::Assembled,
            ..
        }
    ));

    let info = node.execute(Command::Get { entity_id }).await;
    let Event::Info { entity } = info.event else {
        panic!("expected Info, got {:?}", info.event);
    };
    assert_eq!(entity.owner_id, OwnerId::new(42));
    assert_eq!(entity.status, Status::Assembled);
    assert!(entity.updated_at_ms > created_at_ms);

    let missing = node
        .execute(Command::Get {
            entity_id: EntityId::new(999),
        })
        .await;
    assert_eq!(
        missing.event,
        Event::NotFound {
            entity_id: EntityId::new(999)
        }
    );

    node.cluster.terminate().await.expect("Failed to terminate");
}

/// Test that malformed frames consume a position without stopping the node.
#[tokio::test]
async fn test_malformed_frame_is_isolated() {
    let mut node = TestNode::start(config()).await;

    node.ingress.offer(vec![0xde, 0xad]).expect("Offer rejected");
    let created = node
        .execute(Command::Create {
            owner_id: OwnerId::new(1),
        })
        .await;
    assert_eq!(created.event.entity_id(), EntityId::new(1));

    let machine = node.cluster.state_machine().await;
    assert_eq!(machine.last_applied(), 2);
    assert_eq!(machine.store().len(), 1);
}

/// Test that only a leader accepts ingress.
#[tokio::test]
async fn test_follower_rejects_offers() {
    let mut node = TestNode::start(config()).await;
    assert_eq!(node.cluster.role(), Role::Leader);

    node.cluster.set_role(Role::Follower).await;
    let frame = encode_command(&CommandFrame::new(
        CorrelationId::new(1),
        Command::Get {
            entity_id: EntityId::new(1),
        },
    ));
    assert_eq!(
        node.ingress.offer(frame),
        Err(OfferError::NotLeader(Role::Follower))
    );
    assert_eq!(
        node.cluster.state_machine().await.role(),
        Some(Role::Follower)
    );

    node.cluster.set_role(Role::Leader).await;
    node.execute(Command::Create {
        owner_id: OwnerId::new(1),
    })
    .await;
}

/// Test that terminate closes ingress and the egress stream.
#[tokio::test]
async fn test_terminate_closes_streams() {
    let mut node = TestNode::start(config()).await;
    node.execute(Command::Create {
        owner_id: OwnerId::new(1),
    })
    .await;

    node.cluster.terminate().await.expect("Failed to terminate");
    assert!(node.cluster.is_terminated());
    assert!(!node.ingress.is_connected());
    assert_eq!(node.ingress.offer(vec![]), Err(OfferError::Closed));
    assert!(node.egress.recv().await.is_none());

    // Second terminate is a no-op
    node.cluster.terminate().await.expect("Failed to terminate");
    assert!(node.cluster.trigger_snapshot().await.is_err());
}

/// Test that a full ingress queue reports back pressure.
#[tokio::test(flavor = "current_thread")]
async fn test_full_ingress_is_back_pressured() {
    let config = ClusterConfig::builder()
        .ingress_capacity(1)
        .snapshot_threshold(0)
        .build()
        .expect("Invalid config");
    let (cluster, _egress) = LocalCluster::start(config)
        .await
        .expect("Failed to start node");
    let ingress = cluster.ingress();

    // The sequencer cannot run until this task yields.
    let frame = |id| {
        encode_command(&CommandFrame::new(
            CorrelationId::new(id),
            Command::Create {
                owner_id: OwnerId::new(1),
            },
        ))
    };
    assert!(ingress.offer(frame(1)).is_ok());
    assert_eq!(ingress.offer(frame(2)), Err(OfferError::BackPressured));
}

/// Test that a spawned replica matches the leader.
#[tokio::test]
async fn test_spawned_replica_matches_leader() {
    let config = ClusterConfig::builder()
        .snapshot_threshold(3)
        .build()
        .expect("Invalid config");
    let mut node = TestNode::start(config).await;

    for owner in 1..=5 {
        node.execute(Command::Create {
            owner_id: OwnerId::new(owner),
        })
        .await;
    }
    node.execute(Command::UpdateStatus {
        entity_id: EntityId::new(2),
        status: Status::Sourced,
    })
    .await;
    node.execute(Command::Get {
        entity_id: EntityId::new(2),
    })
    .await;

    // Snapshots at 3 and 6; position 7 stays in the log.
    let snapshot = node.cluster.latest_snapshot().expect("No snapshot taken");
    assert_eq!(snapshot.last_applied, 6);
    assert_eq!(node.cluster.log_len(), 1);

    let replica = node.cluster.spawn_replica().expect("Failed to spawn replica");
    let leader = node.cluster.state_machine().await;
    assert_eq!(replica.state(), leader.state());
    assert_eq!(replica.role(), Some(Role::Follower));
}
