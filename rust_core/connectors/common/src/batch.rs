use std::collections::HashMap;

use log::{debug, warn};

use crate::errors::ConnectorResult;
use crate::types::{NormalizedPayload, OrderBookSnapshot, Quote};

/// Ticker side of a join, already reduced to exchange-neutral fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PairQuote {
    pub pair: String,
    pub name: String,
    pub quote: Quote,
}

/// Pairs every quote with its own book by pair key. Quotes without a book, or
/// whose book fetch failed, are left out. Output keeps the order of `quotes`.
pub fn join_batch(
    exchange: &str,
    timestamp: &str,
    quotes: Vec<PairQuote>,
    mut books: HashMap<String, ConnectorResult<OrderBookSnapshot>>,
) -> Vec<NormalizedPayload> {
    let mut out = Vec::with_capacity(quotes.len());
    for pq in quotes {
        match books.remove(&pq.pair) {
            Some(Ok(book)) => {
                out.push(NormalizedPayload::new(exchange, &pq.name, &pq.pair, timestamp, &pq.quote, book));
            }
            Some(Err(e)) => warn!("{}: dropping {} from batch, book fetch failed: {}", exchange, pq.pair, e),
            None => debug!("{}: dropping {} from batch, no book requested", exchange, pq.pair),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConnectorError;
    use crate::types::BookEntry;

    fn quote(buy: f64, sell: f64) -> Quote {
        Quote { buy, sell, high: 110.0, low: 90.0, volume_usd: 5000.0 }
    }

    fn book(pair: &str, bid: f64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            exchange: "Kucoin".into(),
            pair: pair.into(),
            bids: vec![BookEntry::new(bid, 1.0)],
            asks: vec![BookEntry::new(bid + 2.0, 2.0)],
        }
    }

    fn pq(pair: &str, name: &str, buy: f64) -> PairQuote {
        PairQuote { pair: pair.into(), name: name.into(), quote: quote(buy, buy + 1.0) }
    }

    #[test]
    fn joins_fixture_into_canonical_shape() {
        let mut books = HashMap::new();
        books.insert(
            "BTC-USDT".to_string(),
            Ok(OrderBookSnapshot {
                exchange: "Kucoin".into(),
                pair: "BTC-USDT".into(),
                bids: vec![BookEntry::new(99.0, 1.0)],
                asks: vec![BookEntry::new(101.0, 2.0)],
            }),
        );
        let out = join_batch("Kucoin", "2024-01-01T00:00:00.000Z", vec![pq("BTC-USDT", "BTC", 100.0)], books);
        assert_eq!(out.len(), 1);
        let p = &out[0];
        assert_eq!(p.spread, 1.0);
        assert_eq!(p.book_buy, vec![BookEntry { price: 99.0, amount: 1.0, usd_total: 99.0 }]);
        assert_eq!(p.book_sell[0].usd_total, 202.0);
        assert_eq!(p.high, 110.0);
        assert_eq!(p.low, 90.0);
        assert_eq!(p.volume_usd, 5000.0);
        let v = serde_json::to_value(p).unwrap();
        assert_eq!(v["eventType"], "EXCHANGE_TICKER");
    }

    #[test]
    fn failed_and_missing_books_are_excluded() {
        let mut books = HashMap::new();
        books.insert("BTC-USDT".to_string(), Ok(book("BTC-USDT", 99.0)));
        books.insert("ETH-USDT".to_string(), Err(ConnectorError::Network("timeout".into())));
        books.insert("LTC-USDT".to_string(), Ok(book("LTC-USDT", 50.0)));
        let quotes = vec![
            pq("BTC-USDT", "BTC", 100.0),
            pq("ETH-USDT", "ETH", 10.0),
            pq("NEO-USDT", "NEO", 5.0),
            pq("LTC-USDT", "LTC", 51.0),
        ];
        let out = join_batch("Kucoin", "ts", quotes, books);
        let pairs: Vec<_> = out.iter().map(|p| p.pair.as_str()).collect();
        assert_eq!(pairs, vec!["BTC-USDT", "LTC-USDT"]);
        assert_eq!(out[0].book_buy[0].price, 99.0);
        assert_eq!(out[1].book_buy[0].price, 50.0);
        assert_eq!(out[1].buy, 51.0);
    }

    #[test]
    fn batch_shares_one_timestamp() {
        let mut books = HashMap::new();
        books.insert("A".to_string(), Ok(book("A", 1.0)));
        books.insert("B".to_string(), Ok(book("B", 2.0)));
        let out = join_batch("X", "2024-02-02T10:00:00.123Z", vec![pq("A", "A", 1.0), pq("B", "B", 2.0)], books);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.timestamp == "2024-02-02T10:00:00.123Z"));
    }
}
