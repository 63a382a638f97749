pub mod rest;
pub mod source;

pub use source::{KucoinConfig, KucoinSource, EXCHANGE, TAG};
