// Tests for the failure-detection-and-recovery state machine across
// node and registry boundaries.

use std::time::Duration;

use edge_cluster_sim::{
    config::SimConfig,
    device::DeviceInfo,
    event::{ClusterEvent, EventSink},
    node::{ClusterNode, NodeConfig, NodeStatus},
    recovery::{RecoveryConfig, RecoveryConfigUpdate, RecoveryStrategy},
    registry::ClusterRegistry,
    trace::TraceSeverity,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn recovery_config(
    threshold: u32,
    delay: Duration,
    strategy: RecoveryStrategy,
) -> RecoveryConfig {
    RecoveryConfig {
        failure_threshold: threshold,
        retry_delay: delay,
        strategy,
        ..Default::default()
    }
}

fn node_with(strategy: RecoveryStrategy, threshold: u32, delay: Duration) -> ClusterNode {
    let config = NodeConfig::new("worker")
        .status(NodeStatus::Online)
        .devices(vec![DeviceInfo::new("accel", 16)])
        .recovery(recovery_config(threshold, delay, strategy));
    ClusterNode::new(config, Duration::from_secs(30), EventSink::disabled())
}

#[tokio::test]
async fn restart_cycle_goes_offline_then_back_online() {
    init_logger();
    let node = node_with(RecoveryStrategy::Restart, 2, Duration::from_millis(100));

    // First failure is tolerated: counter advances, status untouched.
    assert!(!node.handle_failure());
    assert_eq!(node.failure_count(), 1);
    assert_eq!(node.stored_status(), NodeStatus::Online);

    // Second failure reaches the threshold and initiates a restart.
    assert!(node.handle_failure());
    assert_eq!(node.stored_status(), NodeStatus::Offline);

    // handle_failure returned without waiting out the delay; the node
    // comes back on its own.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(node.stored_status(), NodeStatus::Online);
    assert_eq!(node.failure_count(), 0);
}

#[tokio::test]
async fn tolerated_and_recovery_failures_leave_a_trace_trail() {
    init_logger();
    let node = node_with(RecoveryStrategy::Degraded, 2, Duration::from_millis(10));

    node.handle_failure();
    node.handle_failure();

    let traces = node.traces();
    assert!(traces
        .iter()
        .any(|t| t.severity == TraceSeverity::Info && t.message.contains("tolerated")));
    assert!(traces
        .iter()
        .any(|t| t.severity == TraceSeverity::Warning && t.message.contains("recovery")));
}

#[tokio::test]
async fn failover_keeps_the_counter_and_stays_offline() {
    init_logger();
    let node = node_with(RecoveryStrategy::Failover, 1, Duration::from_millis(50));

    assert!(node.handle_failure());
    assert_eq!(node.stored_status(), NodeStatus::Offline);
    assert_eq!(node.failure_count(), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(node.stored_status(), NodeStatus::Offline);
    assert_eq!(node.failure_count(), 1);
}

#[tokio::test]
async fn concurrent_failures_during_restart_are_not_lost() {
    init_logger();
    let node = node_with(RecoveryStrategy::Restart, 1, Duration::from_millis(80));

    assert!(node.handle_failure());
    // Another failure lands while the first restart is still pending.
    assert!(node.handle_failure());
    assert_eq!(node.failure_count(), 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    // Whichever continuation fires last leaves the node online with a
    // reset counter.
    assert_eq!(node.stored_status(), NodeStatus::Online);
    assert_eq!(node.failure_count(), 0);
}

#[tokio::test]
async fn removing_a_node_cancels_its_pending_restart() {
    init_logger();
    let config = SimConfig::new().build().unwrap();
    let registry = ClusterRegistry::new(&config, EventSink::disabled());

    let node = registry
        .add_node(
            NodeConfig::new("doomed")
                .status(NodeStatus::Online)
                .recovery(recovery_config(
                    1,
                    Duration::from_millis(60),
                    RecoveryStrategy::Restart,
                )),
        )
        .unwrap();

    assert!(node.handle_failure());
    registry.remove_node("doomed").unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    // The removed node never came back online.
    assert_eq!(node.stored_status(), NodeStatus::Offline);
}

#[tokio::test]
async fn recovery_events_are_published_through_the_sink() {
    init_logger();
    let (sink, mut rx) = EventSink::channel();
    let config = NodeConfig::new("observed")
        .status(NodeStatus::Online)
        .recovery(recovery_config(
            1,
            Duration::from_millis(30),
            RecoveryStrategy::Restart,
        ));
    let node = ClusterNode::new(config, Duration::from_secs(30), sink);

    node.handle_failure();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut saw_offline = false;
    let mut saw_online = false;
    while let Ok(event) = rx.try_recv() {
        if let ClusterEvent::Status(report) = event {
            match report.status {
                NodeStatus::Offline => saw_offline = true,
                NodeStatus::Online if saw_offline => saw_online = true,
                _ => {}
            }
        }
    }
    assert!(saw_offline, "no offline status published during recovery");
    assert!(saw_online, "no online status published after restart");
}

#[tokio::test]
async fn broadcast_reconfigures_recovery_on_every_node() {
    init_logger();
    let config = SimConfig::new().build().unwrap();
    let registry = ClusterRegistry::new(&config, EventSink::disabled());
    registry.add_node(NodeConfig::new("a")).unwrap();
    registry.add_node(NodeConfig::new("b")).unwrap();

    registry
        .broadcast_recovery_config(&RecoveryConfigUpdate {
            strategy: Some(RecoveryStrategy::Degraded),
            failure_threshold: Some(1),
            ..Default::default()
        })
        .unwrap();

    for name in ["a", "b"] {
        let node = registry.node(name).unwrap();
        assert!(node.handle_failure());
        assert_eq!(node.stored_status(), NodeStatus::Degraded);
    }
}
