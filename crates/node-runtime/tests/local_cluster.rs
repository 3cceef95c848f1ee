//! End-to-end runs of an in-process committee.

use node_runtime::{LocalCluster, NodeConfig};
use shared_types::{MessageId, RunnerRole};
use std::collections::BTreeSet;
use std::time::Duration;

fn config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.consensus.quick_timeout = Duration::from_millis(200);
    config
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_committee_agrees_on_one_value() {
    let config = config();
    let mut cluster = LocalCluster::new(&config).unwrap();
    cluster.start();

    let height = cluster.start_duty(RunnerRole::Attester, 5, b"attestation-root").unwrap();
    assert_eq!(height, Some(0));

    let decisions = cluster
        .wait_for_decisions(4, Duration::from_secs(5))
        .await
        .unwrap();
    let operators: BTreeSet<_> = decisions.iter().map(|d| d.operator_id).collect();
    assert_eq!(operators, BTreeSet::from([1, 2, 3, 4]));
    for decision in &decisions {
        assert_eq!(decision.event.height, 0);
        assert_eq!(decision.event.round, 1);
        assert_eq!(decision.event.value, b"attestation-root".to_vec());
    }

    let id = MessageId::new(config.cluster.validator_pk, RunnerRole::Attester);
    for node in cluster.nodes() {
        let highest = node.store.get_highest_decided(&id).unwrap().unwrap();
        assert_eq!(highest.height, 0);
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_duties_without_consensus_do_not_decide() {
    let mut cluster = LocalCluster::new(&config()).unwrap();
    cluster.start();

    let height = cluster
        .start_duty(RunnerRole::ValidatorRegistration, 5, b"registration")
        .unwrap();
    assert_eq!(height, None);
    assert!(cluster
        .wait_for_decisions(1, Duration::from_millis(200))
        .await
        .is_err());

    cluster.shutdown().await;
}

// =============================================================================
// Faults
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnected_leader_is_replaced() {
    let mut cluster = LocalCluster::new(&config()).unwrap();
    cluster.network().disconnect(1);
    cluster.start();

    cluster.start_duty(RunnerRole::Proposer, 9, b"block-root").unwrap();

    let decisions = cluster
        .wait_for_decisions(3, Duration::from_secs(30))
        .await
        .unwrap();
    let operators: BTreeSet<_> = decisions.iter().map(|d| d.operator_id).collect();
    assert_eq!(operators, BTreeSet::from([2, 3, 4]));
    for decision in &decisions {
        assert_eq!(decision.event.round, 2);
        assert_eq!(decision.event.value, b"block-root".to_vec());
    }

    cluster.shutdown().await;
}

// =============================================================================
// Durable storage
// =============================================================================

#[cfg(feature = "rocksdb")]
#[tokio::test]
async fn test_heights_resume_after_restart() {
    use node_runtime::container::StorageBackend;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.storage.backend = StorageBackend::RocksDb;
    config.storage.data_dir = dir.path().to_path_buf();

    let mut cluster = LocalCluster::new(&config).unwrap();
    cluster.start();
    cluster.start_duty(RunnerRole::Attester, 1, b"first").unwrap();
    cluster
        .wait_for_decisions(4, Duration::from_secs(5))
        .await
        .unwrap();
    cluster.shutdown().await;

    let mut cluster = LocalCluster::new(&config).unwrap();
    cluster.start();
    let height = cluster.start_duty(RunnerRole::Attester, 2, b"second").unwrap();
    assert_eq!(height, Some(1));
    let decisions = cluster
        .wait_for_decisions(4, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(decisions.iter().all(|d| d.event.height == 1));
    cluster.shutdown().await;
}
