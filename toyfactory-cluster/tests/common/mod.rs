//! Common test utilities for toyfactory-cluster tests.

use std::time::Duration;
use toyfactory_cluster::{ClusterConfig, LocalCluster, LocalIngress};
use toyfactory_core::{
    Command, CommandFrame, CommandSink, CorrelationId, EgressReceiver, EventFrame, decode_event,
    encode_command,
};

/// A started node together with its egress stream.
#[allow(dead_code)]
pub struct TestNode {
    pub cluster: LocalCluster,
    pub ingress: LocalIngress,
    pub egress: EgressReceiver,
    next_correlation: u64,
}

#[allow(dead_code)]
impl TestNode {
    /// Start a node with the given configuration.
    pub async fn start(config: ClusterConfig) -> Self {
        let (cluster, egress) = LocalCluster::start(config)
            .await
            .expect("Failed to start node");
        let ingress = cluster.ingress();
        Self {
            cluster,
            ingress,
            egress,
            next_correlation: 1,
        }
    }

    /// Offer a command and wait for its event frame.
    pub async fn execute(&mut self, command: Command) -> EventFrame {
        let id = CorrelationId::new(self.next_correlation);
        self.next_correlation += 1;

        self.ingress
            .offer(encode_command(&CommandFrame::new(id, command)))
            .expect("Offer rejected");

        let frame = self.next_event().await;
        assert_eq!(frame.correlation_id, id, "events arrive in log order");
        frame
    }

    /// Receive the next event frame.
    pub async fn next_event(&mut self) -> EventFrame {
        let bytes = tokio::time::timeout(Duration::from_secs(5), self.egress.recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Egress closed");
        decode_event(&bytes).expect("Undecodable event")
    }
}
