use connectors_common::types::{BookEntry, OrderBookSnapshot, Quote};
use connectors_common::{ConnectorError, ConnectorResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::source::EXCHANGE;

#[derive(Debug, Deserialize)]
pub struct TickerListing {
    pub success: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Vec<KucoinTicker>,
}

/// One market from the symbols listing. Illiquid markets report nulls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KucoinTicker {
    pub symbol: String,
    #[serde(default)]
    pub last_deal_price: Option<f64>,
    #[serde(default)]
    pub buy: Option<f64>,
    #[serde(default)]
    pub sell: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub vol: Option<f64>,
    #[serde(default)]
    pub vol_value: Option<f64>,
    #[serde(default)]
    pub change_rate: Option<f64>,
}

impl KucoinTicker {
    /// `volValue` is quoted in the market currency (USDT), so it stands in for USD volume.
    pub fn quote(&self) -> Option<Quote> {
        Some(Quote {
            buy: self.buy?,
            sell: self.sell?,
            high: self.high?,
            low: self.low?,
            volume_usd: self.vol_value?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    success: bool,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<BookData>,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(rename = "BUY", default)]
    buy: Vec<Vec<f64>>,
    #[serde(rename = "SELL", default)]
    sell: Vec<Vec<f64>>,
}

fn network(e: reqwest::Error) -> ConnectorError {
    ConnectorError::Network(e.to_string())
}

async fn get_text(client: &Client, url: &str, query: &[(&str, String)], timeout: Duration) -> ConnectorResult<String> {
    let resp = client.get(url).query(query).timeout(timeout).send().await.map_err(network)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ConnectorError::Http { status: status.as_u16(), url: url.to_string() });
    }
    resp.text().await.map_err(network)
}

pub fn parse_ticker_listing(body: &str) -> ConnectorResult<Vec<KucoinTicker>> {
    let listing: TickerListing = serde_json::from_str(body)?;
    if !listing.success {
        return Err(ConnectorError::Rejected(format!(
            "ticker listing: code={} msg={}",
            listing.code.unwrap_or_default(),
            listing.msg.unwrap_or_default()
        )));
    }
    Ok(listing.data)
}

pub fn parse_orderbook(pair: &str, body: &str) -> ConnectorResult<OrderBookSnapshot> {
    let resp: BookResponse = serde_json::from_str(body)?;
    if !resp.success {
        return Err(ConnectorError::Rejected(format!("book {}: {}", pair, resp.msg.unwrap_or_default())));
    }
    let data = resp.data.ok_or_else(|| ConnectorError::Parse(format!("book {}: missing data", pair)))?;
    Ok(OrderBookSnapshot {
        exchange: EXCHANGE.to_string(),
        pair: pair.to_string(),
        bids: to_entries(pair, &data.buy)?,
        asks: to_entries(pair, &data.sell)?,
    })
}

fn to_entries(pair: &str, levels: &[Vec<f64>]) -> ConnectorResult<Vec<BookEntry>> {
    levels
        .iter()
        .map(|level| match level.as_slice() {
            [price, amount, ..] => Ok(BookEntry::new(*price, *amount)),
            _ => Err(ConnectorError::Parse(format!("book {}: short level {:?}", pair, level))),
        })
        .collect()
}

pub async fn fetch_ticker_listing(client: &Client, url: &str, market: &str, timeout: Duration) -> ConnectorResult<Vec<KucoinTicker>> {
    let body = get_text(client, url, &[("market", market.to_string())], timeout).await?;
    parse_ticker_listing(&body)
}

pub async fn fetch_orderbook(client: &Client, url: &str, pair: &str, depth: u32, timeout: Duration) -> ConnectorResult<OrderBookSnapshot> {
    let body = get_text(client, url, &[("symbol", pair.to_string()), ("limit", depth.to_string())], timeout).await?;
    parse_orderbook(pair, &body)
}
