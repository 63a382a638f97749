use std::sync::Mutex;

use crate::types::NormalizedPayload;

/// Downstream sink for normalized batches.
///
/// `produce` is fire-and-forget: it must not block, and delivery failures stay
/// on the sink's side (its own logging). Sources call it once per cycle.
pub trait Producer: Send + Sync {
    fn produce(&self, batch: Vec<NormalizedPayload>, tag: Option<&str>);
}

/// Keeps every batch in memory. Handy for wiring checks and tests.
#[derive(Debug, Default)]
pub struct CollectingProducer {
    batches: Mutex<Vec<(Option<String>, Vec<NormalizedPayload>)>>,
}

impl CollectingProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<(Option<String>, Vec<NormalizedPayload>)> {
        match self.batches.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.batches().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Producer for CollectingProducer {
    fn produce(&self, batch: Vec<NormalizedPayload>, tag: Option<&str>) {
        let mut guard = match self.batches.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((tag.map(str::to_string), batch));
    }
}
