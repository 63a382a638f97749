use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One price level of an order book, with its quote-currency notional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    pub price: f64,
    pub amount: f64,
    pub usd_total: f64,
}

impl BookEntry {
    pub fn new(price: f64, amount: f64) -> Self {
        BookEntry { price, amount, usd_total: price * amount }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub exchange: String,
    pub pair: String,
    pub bids: Vec<BookEntry>,
    pub asks: Vec<BookEntry>,
}

/// Exchange-neutral ticker fields extracted from a source's own ticker type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub buy: f64,
    pub sell: f64,
    pub high: f64,
    pub low: f64,
    pub volume_usd: f64,
}

impl Quote {
    /// Always non-negative: `|sell - buy|`.
    pub fn spread(&self) -> f64 {
        (self.sell - self.buy).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "EXCHANGE_TICKER")]
    ExchangeTicker,
}

/// The canonical record handed to a [`crate::Producer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPayload {
    pub exchange: String,
    pub name: String,
    pub symbol: String,
    pub pair: String,
    pub timestamp: String,
    #[serde(rename = "volume_USD")]
    pub volume_usd: f64,
    pub buy: f64,
    pub sell: f64,
    pub spread: f64,
    pub high: f64,
    pub low: f64,
    pub book_buy: Vec<BookEntry>,
    pub book_sell: Vec<BookEntry>,
    #[serde(rename = "eventType")]
    pub event_type: EventType,
}

impl NormalizedPayload {
    pub fn new(exchange: &str, name: &str, pair: &str, timestamp: &str, quote: &Quote, book: OrderBookSnapshot) -> Self {
        NormalizedPayload {
            exchange: exchange.to_string(),
            name: name.to_string(),
            symbol: name.to_string(),
            pair: pair.to_string(),
            timestamp: timestamp.to_string(),
            volume_usd: quote.volume_usd,
            buy: quote.buy,
            sell: quote.sell,
            spread: quote.spread(),
            high: quote.high,
            low: quote.low,
            book_buy: book.bids,
            book_sell: book.asks,
            event_type: EventType::ExchangeTicker,
        }
    }
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn batch_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Exchanges are inconsistent about quoting decimals; accept both `1.5` and `"1.5"`.
pub fn f64_from_str_or_num<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}
