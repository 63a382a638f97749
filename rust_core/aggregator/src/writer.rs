use log::{error, info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::Batch;

/// Serializes every payload of a batch as one JSON document per line.
pub fn encode_batch(batch: &Batch) -> String {
    let mut out = String::new();
    for payload in batch.payloads.iter() {
        match serde_json::to_string(payload) {
            Ok(line) => {
                out.push_str(&line);
                out.push('\n');
            }
            Err(e) => error!("failed to encode {} payload for {}: {}", payload.exchange, payload.pair, e),
        }
    }
    out
}

/// Drains an [`crate::Aggregator`] subscription into a writer as JSON lines.
pub struct JsonLinesWriter<W> {
    rx: broadcast::Receiver<Batch>,
    out: W,
}

impl<W: AsyncWrite + Unpin> JsonLinesWriter<W> {
    pub fn new(rx: broadcast::Receiver<Batch>, out: W) -> Self {
        JsonLinesWriter { rx, out }
    }

    /// Runs until the channel closes. Returns the number of lines written.
    pub async fn run(mut self) -> std::io::Result<u64> {
        let mut lines = 0u64;
        loop {
            match self.rx.recv().await {
                Ok(batch) => {
                    let encoded = encode_batch(&batch);
                    if encoded.is_empty() {
                        continue;
                    }
                    self.out.write_all(encoded.as_bytes()).await?;
                    self.out.flush().await?;
                    lines += encoded.matches('\n').count() as u64;
                }
                Err(RecvError::Lagged(n)) => warn!("json writer lagged, {} batches skipped", n),
                Err(RecvError::Closed) => break,
            }
        }
        info!("json writer finished after {} lines", lines);
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::payload;
    use crate::Aggregator;
    use connectors_common::Producer;

    #[tokio::test]
    async fn writes_one_document_per_line() {
        let agg = Aggregator::new(8);
        let mut out: Vec<u8> = Vec::new();
        let writer = JsonLinesWriter::new(agg.subscribe(), &mut out);
        agg.produce(vec![payload("BTC-USDT"), payload("ETH-USDT")], Some("KUCOIN"));
        agg.produce(Vec::new(), Some("KUCOIN"));
        agg.produce(vec![payload("LTC-USDT")], Some("KUCOIN"));
        drop(agg);

        assert_eq!(writer.run().await.unwrap(), 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["pair"], "BTC-USDT");
        assert_eq!(first["eventType"], "EXCHANGE_TICKER");
        assert_eq!(first["volume_USD"], 5000.0);
    }

    #[tokio::test]
    async fn count_matches_lines_in_output() {
        let agg = Aggregator::new(8);
        let mut out: Vec<u8> = Vec::new();
        let writer = JsonLinesWriter::new(agg.subscribe(), &mut out);
        let mut odd = payload("XRB-USDT");
        odd.volume_usd = f64::NAN;
        agg.produce(vec![odd, payload("BTC-USDT")], Some("KUCOIN"));
        agg.produce(vec![payload("ETH-USDT")], Some("BITFINEX"));
        drop(agg);

        let count = writer.run().await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(count, text.lines().count() as u64);
        assert_eq!(count, 3);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert!(first["volume_USD"].is_null());
    }
}
