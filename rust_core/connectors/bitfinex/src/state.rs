use std::collections::HashMap;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::messages::{InfoCode, StreamMessage, TickerUpdate};
use crate::source::EXCHANGE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Live,
    Reconnecting,
}

/// What the session loop should do after a frame has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Restart,
}

/// Channel id → pair mapping and the latest ticker per acknowledged pair.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    channels: HashMap<u64, String>,
    tickers: HashMap<String, TickerUpdate>,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, msg: StreamMessage) -> Control {
        match msg {
            StreamMessage::Subscribed { chan_id, pair } => {
                debug!("{}: channel {} carries {}", EXCHANGE, chan_id, pair);
                self.channels.insert(chan_id, pair);
            }
            StreamMessage::Info(code) => return self.on_info(code),
            StreamMessage::Error { code, msg } => {
                warn!("{}: stream error event code={:?}: {}", EXCHANGE, code, msg);
            }
            StreamMessage::OtherEvent(name) => debug!("{}: ignoring event {:?}", EXCHANGE, name),
            StreamMessage::Heartbeat { .. } => {}
            StreamMessage::Ticker(update) => match self.channels.get(&update.channel_id) {
                Some(pair) => {
                    debug!("{}: ticker update for {}", EXCHANGE, pair);
                    self.tickers.insert(pair.clone(), update);
                }
                None => debug!("{}: ticker on unacknowledged channel {}", EXCHANGE, update.channel_id),
            },
        }
        Control::Continue
    }

    fn on_info(&self, code: InfoCode) -> Control {
        match code {
            InfoCode::Restart => {
                info!("{}: server asked for a reconnect", EXCHANGE);
                return Control::Restart;
            }
            // no state change; resubscription happens on the next restart
            InfoCode::Suspend => info!("{}: trading engine refresh started", EXCHANGE),
            InfoCode::Resume => info!("{}: trading engine refresh finished", EXCHANGE),
            InfoCode::Greeting => debug!("{}: connected", EXCHANGE),
            InfoCode::Unknown(code) => error!("{}: unrecognized info code {}", EXCHANGE, code),
        }
        Control::Continue
    }

    pub fn pair_for(&self, chan_id: u64) -> Option<&str> {
        self.channels.get(&chan_id).map(String::as_str)
    }

    pub fn ticker(&self, pair: &str) -> Option<&TickerUpdate> {
        self.tickers.get(pair)
    }

    /// Owned copy of the ticker cache, detached from later stream updates.
    pub fn snapshot(&self) -> Vec<(String, TickerUpdate)> {
        let mut out: Vec<_> = self.tickers.iter().map(|(p, t)| (p.clone(), *t)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.tickers.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
        self.tickers.clear();
    }
}
