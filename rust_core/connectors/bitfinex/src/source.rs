use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connectors_common::{
    batch_timestamp, join_batch, shutdown_signalled, ConnectorResult, DataSource, PairQuote, Producer, RetryPolicy,
    SourceState, Worker,
};
use futures::future::join_all;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::rest::{fetch_orderbook, fetch_symbols, filter_pairs};
use crate::state::{ChannelState, ConnectionState};
use crate::ws::{self, SessionEnd};

pub const EXCHANGE: &str = "Bitfinex";
pub const TAG: &str = "BITFINEX";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitfinexConfig {
    pub symbols_url: String,
    pub books_url: String,
    pub ws_url: String,
    /// Only pairs quoted in this currency are subscribed.
    pub quote: String,
    pub interval_ms: u64,
    pub book_depth: u32,
    pub request_timeout_ms: u64,
    pub symbols_retry: RetryPolicy,
    pub book_retry: RetryPolicy,
    pub close_timeout_ms: u64,
    /// Wait before re-running the start sequence after an unsolicited close.
    /// `None` leaves the source disconnected until it is stopped.
    pub reconnect_delay_ms: Option<u64>,
}

impl Default for BitfinexConfig {
    fn default() -> Self {
        BitfinexConfig {
            symbols_url: "https://api.bitfinex.com/v1/symbols".to_string(),
            books_url: "https://api.bitfinex.com/v1/book".to_string(),
            ws_url: "wss://api.bitfinex.com/ws".to_string(),
            quote: "USD".to_string(),
            interval_ms: 2 * 60 * 1000,
            book_depth: 50,
            request_timeout_ms: 10_000,
            symbols_retry: RetryPolicy::new(10, 1000),
            book_retry: RetryPolicy::new(2, 5000),
            close_timeout_ms: 5000,
            reconnect_delay_ms: Some(30_000),
        }
    }
}

/// Streams tickers over the Bitfinex websocket and periodically emits them
/// joined with REST order book snapshots.
pub struct BitfinexSource {
    streamer: Arc<Streamer>,
    worker: Worker,
}

struct Streamer {
    config: BitfinexConfig,
    client: Client,
    producer: Arc<dyn Producer>,
    state: RwLock<ChannelState>,
    conn: watch::Sender<ConnectionState>,
}

impl BitfinexSource {
    pub fn new(config: BitfinexConfig, client: Client, producer: Arc<dyn Producer>) -> Self {
        let (conn, _) = watch::channel(ConnectionState::Disconnected);
        let streamer = Streamer { config, client, producer, state: RwLock::new(ChannelState::new()), conn };
        BitfinexSource { streamer: Arc::new(streamer), worker: Worker::new(EXCHANGE) }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.streamer.conn.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.streamer.conn.subscribe()
    }

    /// Copy of the channel map and ticker cache as they are right now.
    pub async fn channel_state(&self) -> ChannelState {
        self.streamer.state.read().await.clone()
    }

    /// Runs one emission pass over the current ticker cache. Returns the batch size.
    pub async fn run_emission(&self) -> usize {
        self.streamer.emit().await
    }
}

#[async_trait]
impl DataSource for BitfinexSource {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    fn start(&self) -> ConnectorResult<()> {
        let streamer = Arc::clone(&self.streamer);
        self.worker.spawn(move |shutdown| streamer.run(shutdown))?;
        info!("{}: started", EXCHANGE);
        Ok(())
    }

    async fn stop(&self) {
        self.worker.stop().await;
    }

    fn state(&self) -> SourceState {
        self.worker.state()
    }
}

impl Streamer {
    fn set_conn(&self, state: ConnectionState) {
        debug!("{}: connection {:?}", EXCHANGE, state);
        self.conn.send_replace(state);
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            match self.session(&mut shutdown).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Restart => {
                    info!("{}: restarting stream", EXCHANGE);
                    self.set_conn(ConnectionState::Reconnecting);
                }
                SessionEnd::Closed => match self.config.reconnect_delay_ms {
                    Some(ms) => {
                        info!("{}: reconnecting in {} ms", EXCHANGE, ms);
                        tokio::select! {
                            _ = shutdown_signalled(&mut shutdown) => break,
                            _ = sleep(Duration::from_millis(ms)) => {}
                        }
                        self.set_conn(ConnectionState::Reconnecting);
                    }
                    None => {
                        warn!("{}: stream lost, staying disconnected", EXCHANGE);
                        shutdown_signalled(&mut shutdown).await;
                        break;
                    }
                },
            }
        }
        self.set_conn(ConnectionState::Disconnected);
        info!("{}: stopped", EXCHANGE);
    }

    /// One full start sequence: pair universe, connect, subscribe, read until
    /// the stream ends. Channel state is empty again when this returns.
    async fn session(self: &Arc<Self>, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        self.set_conn(ConnectionState::Connecting);
        let pairs = tokio::select! {
            _ = shutdown_signalled(shutdown) => return SessionEnd::Shutdown,
            res = self.fetch_pairs() => res,
        };
        let pairs = match pairs {
            Ok(p) if !p.is_empty() => p,
            Ok(_) => {
                error!("{}: no pairs quoted in {}", EXCHANGE, self.config.quote);
                return SessionEnd::Closed;
            }
            Err(e) => {
                error!("{}: could not load symbols: {}", EXCHANGE, e);
                return SessionEnd::Closed;
            }
        };

        let conn = tokio::select! {
            _ = shutdown_signalled(shutdown) => return SessionEnd::Shutdown,
            res = ws::connect(&self.config.ws_url) => res,
        };
        let (mut write, mut read) = match conn {
            Ok(c) => c,
            Err(e) => {
                error!("{}: connect failed: {}", EXCHANGE, e);
                return SessionEnd::Closed;
            }
        };

        self.state.write().await.clear();
        self.set_conn(ConnectionState::Subscribing);
        if let Err(e) = ws::subscribe_all(&mut write, &pairs).await {
            error!("{}: subscribe failed: {}", EXCHANGE, e);
            return SessionEnd::Closed;
        }
        info!("{}: subscribed to {} pairs", EXCHANGE, pairs.len());

        let emitter = tokio::spawn(Arc::clone(self).emit_loop());
        self.set_conn(ConnectionState::Live);
        let end = ws::read_loop(&mut read, &mut write, &self.state, shutdown).await;

        emitter.abort();
        let _ = emitter.await;
        if end != SessionEnd::Closed {
            ws::close(&mut write, &mut read, Duration::from_millis(self.config.close_timeout_ms)).await;
        }
        self.state.write().await.clear();
        self.set_conn(ConnectionState::Disconnected);
        end
    }

    async fn fetch_pairs(&self) -> ConnectorResult<Vec<String>> {
        let cfg = &self.config;
        let timeout = Duration::from_millis(cfg.request_timeout_ms);
        let symbols = cfg
            .symbols_retry
            .run(|attempt| {
                debug!("{}: symbols attempt {}", EXCHANGE, attempt);
                fetch_symbols(&self.client, &cfg.symbols_url, timeout)
            })
            .await?;
        Ok(filter_pairs(&symbols, &cfg.quote))
    }

    async fn emit_loop(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.interval_ms.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.emit().await;
        }
    }

    async fn emit(&self) -> usize {
        let cfg = &self.config;
        let timeout = Duration::from_millis(cfg.request_timeout_ms);
        let snapshot = self.state.read().await.snapshot();

        let fetches = snapshot.iter().map(|(pair, _)| async move {
            let res = cfg
                .book_retry
                .run(|attempt| {
                    debug!("{}: book attempt {} for {}", EXCHANGE, attempt, pair);
                    fetch_orderbook(&self.client, &cfg.books_url, pair, cfg.book_depth, timeout)
                })
                .await;
            (pair.clone(), res)
        });
        let books: HashMap<_, _> = join_all(fetches).await.into_iter().collect();

        let quotes = snapshot
            .into_iter()
            .map(|(pair, ticker)| PairQuote { name: base_asset(&pair, &cfg.quote), quote: ticker.quote(), pair })
            .collect();
        let batch = join_batch(EXCHANGE, &batch_timestamp(), quotes, books);
        let count = batch.len();
        info!("{}: producing {} payloads", EXCHANGE, count);
        self.producer.produce(batch, Some(TAG));
        count
    }
}

fn base_asset(pair: &str, quote: &str) -> String {
    let quote = quote.to_uppercase();
    pair.strip_suffix(quote.as_str()).unwrap_or(pair).to_string()
}
