use connector_bitfinex::BitfinexConfig;
use connector_kucoin::KucoinConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Application settings; every field may be omitted from the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Batches buffered per sink subscriber before it starts lagging.
    pub buffer: usize,
    /// Port of the `GET /` health check, bound on all interfaces.
    pub health_port: u16,
    pub enable_kucoin: bool,
    pub enable_bitfinex: bool,
    pub kucoin: KucoinConfig,
    pub bitfinex: BitfinexConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            buffer: 64,
            health_port: 3000,
            enable_kucoin: true,
            enable_bitfinex: true,
            kucoin: KucoinConfig::default(),
            bitfinex: BitfinexConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors_common::RetryPolicy;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = IngestConfig::from_json("{}").unwrap();
        assert_eq!(cfg, IngestConfig::default());
        assert_eq!(cfg.health_port, 3000);
        assert_eq!(cfg.kucoin.interval_ms, 120_000);
        assert_eq!(cfg.kucoin.ticker_retry, RetryPolicy::new(10, 1000));
        assert_eq!(cfg.bitfinex.book_retry, RetryPolicy::new(2, 5000));
        assert_eq!(cfg.bitfinex.quote, "USD");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = IngestConfig::from_json(
            r#"{"enable_bitfinex": false, "health_port": 8081, "kucoin": {"pairs": ["BTC-USDT"], "interval_ms": 5000}, "bitfinex": {"reconnect_delay_ms": null}}"#,
        )
        .unwrap();
        assert!(!cfg.enable_bitfinex);
        assert_eq!(cfg.health_port, 8081);
        assert_eq!(cfg.kucoin.pairs, vec!["BTC-USDT"]);
        assert_eq!(cfg.kucoin.interval_ms, 5000);
        assert_eq!(cfg.kucoin.book_depth, 200);
        assert_eq!(cfg.bitfinex.reconnect_delay_ms, None);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(IngestConfig::from_json(r#"{"buffer": "lots"}"#).is_err());
    }
}
