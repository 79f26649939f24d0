pub mod cache;
pub mod client;
pub mod inflight;
pub mod payload;
pub mod resolver;
pub mod types;
pub mod validator;

pub use cache::QuoteCache;
pub use client::{MarketDataClient, QuoteSource};
pub use resolver::{FallbackReason, QuoteOutcome, QuoteResolver};
pub use types::{Candle, Quote};
