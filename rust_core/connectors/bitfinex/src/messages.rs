// Bitfinex v1 frames: event objects (`{"event": ...}`) or positional arrays
// keyed by the channel id in their first slot.

use connectors_common::types::Quote;
use connectors_common::{ConnectorError, ConnectorResult};
use serde::Deserialize;
use serde_json::Value;

pub const RESTART_CODE: u64 = 20059;
/// Documented "websocket server restarting" code, handled the same way.
pub const SERVER_RESTART_CODE: u64 = 20051;
pub const SUSPEND_CODE: u64 = 20060;
pub const RESUME_CODE: u64 = 20061;

const HEARTBEAT: &str = "hb";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerUpdate {
    pub channel_id: u64,
    pub bid: f64,
    pub bid_size: f64,
    pub ask: f64,
    pub ask_size: f64,
    pub daily_change: f64,
    pub daily_change_perc: f64,
    pub last_price: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
}

type RawTicker = (u64, f64, f64, f64, f64, f64, f64, f64, f64, f64, f64);

impl From<RawTicker> for TickerUpdate {
    fn from(r: RawTicker) -> Self {
        TickerUpdate {
            channel_id: r.0,
            bid: r.1,
            bid_size: r.2,
            ask: r.3,
            ask_size: r.4,
            daily_change: r.5,
            daily_change_perc: r.6,
            last_price: r.7,
            volume: r.8,
            high: r.9,
            low: r.10,
        }
    }
}

impl TickerUpdate {
    pub fn quote(&self) -> Quote {
        Quote { buy: self.bid, sell: self.ask, high: self.high, low: self.low, volume_usd: self.volume }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoCode {
    /// Server is restarting; reconnect and resubscribe.
    Restart,
    /// Trading engine refresh started.
    Suspend,
    /// Trading engine refresh finished.
    Resume,
    Unknown(u64),
    /// Greeting sent on connect, carries only a version.
    Greeting,
}

impl InfoCode {
    pub fn from_code(code: Option<u64>) -> Self {
        match code {
            None => InfoCode::Greeting,
            Some(RESTART_CODE) | Some(SERVER_RESTART_CODE) => InfoCode::Restart,
            Some(SUSPEND_CODE) => InfoCode::Suspend,
            Some(RESUME_CODE) => InfoCode::Resume,
            Some(other) => InfoCode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Subscribed { chan_id: u64, pair: String },
    Info(InfoCode),
    Error { code: Option<u64>, msg: String },
    OtherEvent(String),
    Heartbeat { chan_id: u64 },
    Ticker(TickerUpdate),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Event {
    Subscribed {
        #[serde(rename = "chanId")]
        chan_id: u64,
        pair: String,
    },
    Info {
        #[serde(default)]
        code: Option<u64>,
    },
    Error {
        #[serde(default)]
        code: Option<u64>,
        #[serde(default)]
        msg: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl StreamMessage {
    pub fn parse(txt: &str) -> ConnectorResult<StreamMessage> {
        let v: Value = serde_json::from_str(txt)?;
        if v.is_object() {
            let name = v.get("event").and_then(Value::as_str).unwrap_or_default().to_string();
            let msg = match serde_json::from_value::<Event>(v)? {
                Event::Subscribed { chan_id, pair } => StreamMessage::Subscribed { chan_id, pair },
                Event::Info { code } => StreamMessage::Info(InfoCode::from_code(code)),
                Event::Error { code, msg } => StreamMessage::Error { code, msg: msg.unwrap_or_default() },
                Event::Other => StreamMessage::OtherEvent(name),
            };
            return Ok(msg);
        }
        match v.as_array() {
            Some(arr) if arr.len() == 2 && arr[1].as_str() == Some(HEARTBEAT) => {
                let chan_id = arr[0]
                    .as_u64()
                    .ok_or_else(|| ConnectorError::Parse(format!("heartbeat without channel id: {}", txt)))?;
                return Ok(StreamMessage::Heartbeat { chan_id });
            }
            Some(_) => {}
            None => return Err(ConnectorError::Parse(format!("unexpected frame: {}", txt))),
        }
        let raw: RawTicker = serde_json::from_value(v)?;
        Ok(StreamMessage::Ticker(raw.into()))
    }
}
