//! Common test utilities for toyfactory-gateway tests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use toyfactory_core::{
    CommandFrame, CommandSink, EgressReceiver, EventFrame, OfferError, decode_command,
    encode_event,
};

/// A transport double: records offered frames and lets the test publish
/// arbitrary event frames.
#[allow(dead_code)]
pub struct FakeSink {
    connected: AtomicBool,
    reject_with: Mutex<Option<OfferError>>,
    offered: mpsc::UnboundedSender<CommandFrame>,
}

#[allow(dead_code)]
impl FakeSink {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn reject_with(&self, error: Option<OfferError>) {
        *self.reject_with.lock() = error;
    }
}

impl CommandSink for FakeSink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn offer(&self, frame: Vec<u8>) -> Result<(), OfferError> {
        if let Some(error) = self.reject_with.lock().clone() {
            return Err(error);
        }
        let frame = decode_command(&frame).expect("Gateway sent an undecodable frame");
        let _ = self.offered.send(frame);
        Ok(())
    }
}

/// Test end of the fake transport.
#[allow(dead_code)]
pub struct FakeCluster {
    pub sink: Arc<FakeSink>,
    pub offered: mpsc::UnboundedReceiver<CommandFrame>,
    pub egress: mpsc::Sender<Vec<u8>>,
}

#[allow(dead_code)]
impl FakeCluster {
    /// Create a connected fake transport and the egress receiver for the
    /// bridge.
    pub fn new() -> (Self, EgressReceiver) {
        let (offered_tx, offered_rx) = mpsc::unbounded_channel();
        let (egress_tx, egress_rx) = mpsc::channel(64);
        let sink = Arc::new(FakeSink {
            connected: AtomicBool::new(true),
            reject_with: Mutex::new(None),
            offered: offered_tx,
        });

        (
            Self {
                sink,
                offered: offered_rx,
                egress: egress_tx,
            },
            egress_rx,
        )
    }

    /// Wait for the next offered command.
    pub async fn next_offered(&mut self) -> CommandFrame {
        tokio::time::timeout(Duration::from_secs(5), self.offered.recv())
            .await
            .expect("Timed out waiting for an offered command")
            .expect("Sink dropped")
    }

    /// Publish an event frame.
    pub async fn publish(&self, frame: EventFrame) {
        self.egress
            .send(encode_event(&frame))
            .await
            .expect("Dispatch loop gone");
    }
}
