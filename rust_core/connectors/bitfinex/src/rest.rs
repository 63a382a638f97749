use connectors_common::types::{f64_from_str_or_num, BookEntry, OrderBookSnapshot};
use connectors_common::{ConnectorError, ConnectorResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::source::EXCHANGE;

#[derive(Debug, Deserialize)]
struct BookLevel {
    #[serde(deserialize_with = "f64_from_str_or_num")]
    price: f64,
    #[serde(deserialize_with = "f64_from_str_or_num")]
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
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

/// Uppercased pairs from the symbol list whose quote currency is `quote`.
pub fn filter_pairs(symbols: &[String], quote: &str) -> Vec<String> {
    let quote = quote.to_uppercase();
    symbols
        .iter()
        .map(|s| s.to_uppercase())
        .filter(|s| s.len() > quote.len() && s.ends_with(&quote))
        .collect()
}

pub fn parse_symbols(body: &str) -> ConnectorResult<Vec<String>> {
    let symbols: Vec<String> = serde_json::from_str(body)?;
    if symbols.is_empty() {
        return Err(ConnectorError::Rejected("empty symbol list".to_string()));
    }
    Ok(symbols)
}

pub fn parse_orderbook(pair: &str, body: &str) -> ConnectorResult<OrderBookSnapshot> {
    let resp: BookResponse = serde_json::from_str(body)?;
    let entries = |levels: Vec<BookLevel>| -> Vec<BookEntry> {
        levels.into_iter().map(|l| BookEntry::new(l.price, l.amount)).collect()
    };
    Ok(OrderBookSnapshot {
        exchange: EXCHANGE.to_string(),
        pair: pair.to_string(),
        bids: entries(resp.bids),
        asks: entries(resp.asks),
    })
}

pub async fn fetch_symbols(client: &Client, url: &str, timeout: Duration) -> ConnectorResult<Vec<String>> {
    let body = get_text(client, url, &[], timeout).await?;
    parse_symbols(&body)
}

pub async fn fetch_orderbook(client: &Client, books_url: &str, pair: &str, depth: u32, timeout: Duration) -> ConnectorResult<OrderBookSnapshot> {
    let url = format!("{}/{}", books_url.trim_end_matches('/'), pair);
    let query = [("limit_bids", depth.to_string()), ("limit_asks", depth.to_string())];
    let body = get_text(client, &url, &query, timeout).await?;
    parse_orderbook(pair, &body)
}
