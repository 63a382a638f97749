pub mod batch;
pub mod errors;
pub mod producer;
pub mod retry;
pub mod source;
pub mod types;
pub mod worker;

pub use batch::{join_batch, PairQuote};
pub use errors::{ConnectorError, ConnectorResult};
pub use producer::{CollectingProducer, Producer};
pub use retry::{retry, RetryPolicy};
pub use source::{DataSource, SourceState};
pub use types::{batch_timestamp, BookEntry, EventType, NormalizedPayload, OrderBookSnapshot, Quote};
pub use worker::{shutdown_signalled, Worker};
