use anyhow::Result;
use async_trait::async_trait;

use crate::store::model::{GroupConfig, GroupPatch, TickerConfig, TickerPatch};

/// Persisted ticker configuration.
///
/// The scheduler treats everything it reads here as possibly stale and
/// reloads before every tick.
#[async_trait]
pub trait TickerConfigStore: Send + Sync {
    /// Group with all its tickers; an empty group is created on first use.
    async fn get_or_create(&self, group_id: &str) -> Result<GroupConfig>;

    /// Applies `patch` on top of the stored ticker (or defaults) and returns
    /// the result.
    async fn upsert_ticker(
        &self,
        group_id: &str,
        surface_id: &str,
        patch: &TickerPatch,
    ) -> Result<TickerConfig>;

    async fn update_group(&self, group_id: &str, patch: &GroupPatch) -> Result<GroupConfig>;

    async fn disable_ticker(&self, group_id: &str, surface_id: &str) -> Result<()>;

    async fn disable_all(&self, group_id: &str) -> Result<()>;

    async fn find_groups_with_active_tickers(&self) -> Result<Vec<String>>;
}
