pub mod messages;
pub mod rest;
pub mod source;
pub mod state;
pub mod ws;

pub use messages::{InfoCode, StreamMessage, TickerUpdate};
pub use source::{BitfinexConfig, BitfinexSource, EXCHANGE, TAG};
pub use state::{ChannelState, ConnectionState, Control};
