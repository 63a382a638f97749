pub mod config;
pub mod health;
pub mod writer;

use connectors_common::{NormalizedPayload, Producer};
use log::debug;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use config::IngestConfig;
pub use writer::JsonLinesWriter;

/// One `produce` call as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub tag: Option<String>,
    pub payloads: Arc<Vec<NormalizedPayload>>,
}

/// Fan-out sink: every produced batch is broadcast to all current subscribers.
pub struct Aggregator {
    tx: broadcast::Sender<Batch>,
}

impl Aggregator {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Aggregator { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Batch> {
        self.tx.subscribe()
    }
}

impl Producer for Aggregator {
    fn produce(&self, batch: Vec<NormalizedPayload>, tag: Option<&str>) {
        let size = batch.len();
        let batch = Batch { tag: tag.map(str::to_string), payloads: Arc::new(batch) };
        if self.tx.send(batch).is_err() {
            debug!("no subscribers, dropped batch of {} from {:?}", size, tag);
        }
    }
}
