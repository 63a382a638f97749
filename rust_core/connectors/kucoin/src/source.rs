use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connectors_common::{
    batch_timestamp, join_batch, shutdown_signalled, ConnectorResult, DataSource, OrderBookSnapshot, PairQuote,
    Producer, RetryPolicy, SourceState, Worker,
};
use futures::future::join_all;
use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::rest::{fetch_orderbook, fetch_ticker_listing};

pub const EXCHANGE: &str = "Kucoin";
pub const TAG: &str = "KUCOIN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KucoinConfig {
    pub ticker_url: String,
    pub books_url: String,
    /// Quote market passed to the listing endpoint.
    pub market: String,
    pub pairs: Vec<String>,
    pub interval_ms: u64,
    pub book_depth: u32,
    pub request_timeout_ms: u64,
    pub ticker_retry: RetryPolicy,
    pub book_retry: RetryPolicy,
    /// Pause after every book response, successful or not.
    pub book_settle_ms: u64,
}

impl Default for KucoinConfig {
    fn default() -> Self {
        KucoinConfig {
            ticker_url: "https://api.kucoin.com/v1/market/open/symbols".to_string(),
            books_url: "https://api.kucoin.com/v1/open/orders".to_string(),
            market: "USDT".to_string(),
            pairs: [
                "BTC-USDT", "ETH-USDT", "BCH-USDT", "NEO-USDT", "KCS-USDT", "CS-USDT", "ACT-USDT", "HSR-USDT",
                "LYM-USDT", "TKY-USDT", "XRB-USDT", "DRGN-USDT", "LTC-USDT", "EOS-USDT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            interval_ms: 2 * 60 * 1000,
            book_depth: 200,
            request_timeout_ms: 10_000,
            ticker_retry: RetryPolicy::new(10, 1000),
            book_retry: RetryPolicy::new(5, 1000),
            book_settle_ms: 1000,
        }
    }
}

/// Polls the Kucoin REST API on a fixed interval and emits one batch per cycle.
pub struct KucoinSource {
    poller: Arc<Poller>,
    worker: Worker,
}

struct Poller {
    config: KucoinConfig,
    client: Client,
    producer: Arc<dyn Producer>,
}

impl KucoinSource {
    pub fn new(config: KucoinConfig, client: Client, producer: Arc<dyn Producer>) -> Self {
        KucoinSource { poller: Arc::new(Poller { config, client, producer }), worker: Worker::new(EXCHANGE) }
    }

    /// Runs a single fetch, join and emit pass. Returns the number of payloads produced.
    pub async fn run_cycle(&self) -> ConnectorResult<usize> {
        self.poller.run_cycle().await
    }
}

#[async_trait]
impl DataSource for KucoinSource {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    fn start(&self) -> ConnectorResult<()> {
        let poller = Arc::clone(&self.poller);
        self.worker.spawn(move |shutdown| poller.run(shutdown))?;
        info!("{}: started, polling {} pairs", EXCHANGE, self.poller.config.pairs.len());
        Ok(())
    }

    async fn stop(&self) {
        self.worker.stop().await;
    }

    fn state(&self) -> SourceState {
        self.worker.state()
    }
}

impl Poller {
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_millis(self.config.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }
            // a cycle still in flight at shutdown is dropped, never emitted
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                res = self.run_cycle() => {
                    if let Err(e) = res {
                        error!("{}: cycle skipped: {}", EXCHANGE, e);
                    }
                }
            }
        }
        info!("{}: stopped", EXCHANGE);
    }

    async fn run_cycle(&self) -> ConnectorResult<usize> {
        let cfg = &self.config;
        let timeout = Duration::from_millis(cfg.request_timeout_ms);
        debug!("{}: fetching ticker listing", EXCHANGE);
        let tickers = cfg
            .ticker_retry
            .run(|attempt| {
                debug!("{}: ticker listing attempt {}", EXCHANGE, attempt);
                fetch_ticker_listing(&self.client, &cfg.ticker_url, &cfg.market, timeout)
            })
            .await?;

        let books = self.fetch_books(timeout).await;
        let quotes: Vec<PairQuote> = tickers
            .iter()
            .filter(|t| books.contains_key(&t.symbol))
            .filter_map(|t| match t.quote() {
                Some(quote) => Some(PairQuote { pair: t.symbol.clone(), name: base_asset(&t.symbol), quote }),
                None => {
                    debug!("{}: {} has an incomplete ticker, skipping", EXCHANGE, t.symbol);
                    None
                }
            })
            .collect();

        let batch = join_batch(EXCHANGE, &batch_timestamp(), quotes, books);
        let count = batch.len();
        info!("{}: producing {} payloads", EXCHANGE, count);
        self.producer.produce(batch, Some(TAG));
        Ok(count)
    }

    async fn fetch_books(&self, timeout: Duration) -> HashMap<String, ConnectorResult<OrderBookSnapshot>> {
        let cfg = &self.config;
        let settle = Duration::from_millis(cfg.book_settle_ms);
        let fetches = cfg.pairs.iter().map(|pair| async move {
            let res = cfg
                .book_retry
                .run(|attempt| {
                    debug!("{}: book attempt {} for {}", EXCHANGE, attempt, pair);
                    settled(fetch_orderbook(&self.client, &cfg.books_url, pair, cfg.book_depth, timeout), settle)
                })
                .await;
            (pair.clone(), res)
        });
        join_all(fetches).await.into_iter().collect()
    }
}

/// Awaits `fut`, then holds its result for `settle` to stay under the rate limit.
async fn settled<T>(fut: impl Future<Output = T>, settle: Duration) -> T {
    let out = fut.await;
    sleep(settle).await;
    out
}

fn base_asset(pair: &str) -> String {
    pair.split('-').next().unwrap_or(pair).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use connectors_common::{BookEntry, CollectingProducer};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Stub {
        eth_hits: Arc<AtomicUsize>,
        reject_listing: Arc<AtomicBool>,
    }

    async fn listing(State(stub): State<Stub>) -> Json<serde_json::Value> {
        if stub.reject_listing.load(Ordering::SeqCst) {
            return Json(json!({"success": false, "code": "ERROR", "msg": "maintenance"}));
        }
        Json(json!({
            "success": true,
            "code": "OK",
            "data": [
                {"symbol": "BTC-USDT", "buy": 100, "sell": 101, "high": 110, "low": 90, "volValue": 5000},
                {"symbol": "ETH-USDT", "buy": 10, "sell": 11, "high": 12, "low": 9, "volValue": 700},
                {"symbol": "XRP-USDT", "buy": 1, "sell": 2, "high": 3, "low": 0.5, "volValue": 10},
                {"symbol": "LTC-USDT", "buy": 50, "sell": 52, "high": 55, "low": 45, "volValue": 300}
            ]
        }))
    }

    async fn books(State(stub): State<Stub>, Query(q): Query<HashMap<String, String>>) -> Response {
        let symbol = q.get("symbol").cloned().unwrap_or_default();
        match symbol.as_str() {
            "ETH-USDT" => {
                stub.eth_hits.fetch_add(1, Ordering::SeqCst);
                (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response()
            }
            "BTC-USDT" => Json(json!({"success": true, "data": {"BUY": [[99, 1, 99]], "SELL": [[101, 2, 202]]}}))
                .into_response(),
            _ => Json(json!({"success": true, "data": {"BUY": [[49, 1, 49]], "SELL": [[53, 1, 53]]}})).into_response(),
        }
    }

    async fn serve(stub: Stub) -> String {
        let app = Router::new()
            .route("/symbols", get(listing))
            .route("/orders", get(books))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base: &str, interval_ms: u64) -> KucoinConfig {
        KucoinConfig {
            ticker_url: format!("{}/symbols", base),
            books_url: format!("{}/orders", base),
            pairs: vec!["BTC-USDT".into(), "ETH-USDT".into(), "LTC-USDT".into()],
            interval_ms,
            request_timeout_ms: 2000,
            ticker_retry: RetryPolicy::new(2, 10),
            book_retry: RetryPolicy::new(3, 10),
            book_settle_ms: 0,
            ..KucoinConfig::default()
        }
    }

    #[test]
    fn base_asset_strips_quote() {
        assert_eq!(base_asset("DRGN-USDT"), "DRGN");
        assert_eq!(base_asset("BTC"), "BTC");
    }

    #[tokio::test(start_paused = true)]
    async fn book_attempts_pause_for_settle_and_retry_delay() {
        let policy = RetryPolicy::new(4, 1000);
        let settle = Duration::from_millis(1000);
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let res: Result<(), String> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                settled(async { Err("rate limited".to_string()) }, settle)
            })
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // four settles plus three retry pauses
        assert_eq!(started.elapsed(), Duration::from_millis(4 * 1000 + 3 * 1000));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_book_still_settles() {
        let started = tokio::time::Instant::now();
        let v = settled(async { 7 }, Duration::from_millis(1000)).await;
        assert_eq!(v, 7);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn failed_book_drops_only_that_pair() {
        let stub = Stub::default();
        let base = serve(stub.clone()).await;
        let producer = Arc::new(CollectingProducer::new());
        let source = KucoinSource::new(config(&base, 60_000), Client::new(), producer.clone());

        let produced = source.run_cycle().await.unwrap();
        assert_eq!(produced, 2);
        assert_eq!(stub.eth_hits.load(Ordering::SeqCst), 3);

        let batches = producer.batches();
        assert_eq!(batches.len(), 1);
        let (tag, batch) = &batches[0];
        assert_eq!(tag.as_deref(), Some(TAG));
        let pairs: Vec<_> = batch.iter().map(|p| p.pair.as_str()).collect();
        assert_eq!(pairs, vec!["BTC-USDT", "LTC-USDT"]);

        let btc = &batch[0];
        assert_eq!(btc.exchange, "Kucoin");
        assert_eq!(btc.name, "BTC");
        assert_eq!(btc.spread, 1.0);
        assert_eq!(btc.volume_usd, 5000.0);
        assert_eq!(btc.book_buy, vec![BookEntry { price: 99.0, amount: 1.0, usd_total: 99.0 }]);
        assert_eq!(batch[1].book_buy[0].price, 49.0);
        assert_eq!(batch[1].spread, 2.0);
        assert!(batch.iter().all(|p| p.timestamp == btc.timestamp));
    }

    #[tokio::test]
    async fn rejected_listing_skips_emission() {
        let stub = Stub::default();
        stub.reject_listing.store(true, Ordering::SeqCst);
        let base = serve(stub).await;
        let producer = Arc::new(CollectingProducer::new());
        let source = KucoinSource::new(config(&base, 60_000), Client::new(), producer.clone());

        assert!(source.run_cycle().await.is_err());
        assert!(producer.is_empty());
    }

    #[tokio::test]
    async fn start_polls_immediately_and_stop_is_final() {
        let base = serve(Stub::default()).await;
        let producer = Arc::new(CollectingProducer::new());
        let source = KucoinSource::new(config(&base, 3_600_000), Client::new(), producer.clone());
        assert_eq!(source.state(), SourceState::Idle);

        source.start().unwrap();
        assert!(source.start().is_err());
        for _ in 0..200 {
            if !producer.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(producer.len(), 1);

        source.stop().await;
        source.stop().await;
        assert_eq!(source.state(), SourceState::Stopped);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(producer.len(), 1);
    }
}
