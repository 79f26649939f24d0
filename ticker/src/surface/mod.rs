pub mod discord;

use async_trait::async_trait;

use crate::error::RenameError;

pub use discord::DiscordChannelRenamer;

/// The external operation that changes a surface's visible name.
#[async_trait]
pub trait SurfaceRenamer: Send + Sync + 'static {
    /// Current visible name; `Ok(None)` when the surface no longer exists.
    async fn current_name(
        &self,
        group_id: &str,
        surface_id: &str,
    ) -> Result<Option<String>, RenameError>;

    async fn rename(&self, group_id: &str, surface_id: &str, name: &str)
    -> Result<(), RenameError>;
}
