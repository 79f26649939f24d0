pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use model::{GroupConfig, GroupPatch, TickerConfig, TickerPatch};
pub use repository::TickerConfigStore;
pub use repository_sqlx::SqlxTickerConfigStore;
