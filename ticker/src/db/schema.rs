use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Groups
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS group_configs (
  group_id TEXT PRIMARY KEY,
  default_interval TEXT NOT NULL,
  watchlist TEXT NOT NULL,
  updated_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // One row per ticker surface
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS ticker_configs (
  group_id TEXT NOT NULL,
  surface_id TEXT NOT NULL,
  enabled INTEGER NOT NULL DEFAULT 0 CHECK (enabled IN (0,1)),
  symbols TEXT NOT NULL,
  template TEXT NOT NULL,
  price_precision BIGINT NOT NULL,
  poll_interval_ms BIGINT NOT NULL,
  original_name TEXT,
  updated_ms BIGINT NOT NULL,
  PRIMARY KEY (group_id, surface_id)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_ticker_configs_enabled ON ticker_configs(enabled);"#)
        .execute(pool)
        .await?;

    Ok(())
}
