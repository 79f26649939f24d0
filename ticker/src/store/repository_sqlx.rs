use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sqlx::{AnyConnection, AnyPool, Row};

use crate::store::model::{GroupConfig, GroupPatch, TickerConfig, TickerPatch};
use crate::store::repository::TickerConfigStore;
use crate::time::now_ms;

/// SQLx-backed implementation of TickerConfigStore.
/// Responsible only for persistence and row mapping.
pub struct SqlxTickerConfigStore {
    pool: AnyPool,
    /// Poll interval for tickers created without one.
    default_poll_ms: u64,
}

impl SqlxTickerConfigStore {
    pub fn new(pool: AnyPool, default_poll_ms: u64) -> Self {
        Self {
            pool,
            default_poll_ms: default_poll_ms.max(1),
        }
    }
}

const TICKER_COLUMNS: &str = r#"
  group_id, surface_id, enabled, symbols, template,
  price_precision, poll_interval_ms, original_name
"#;

#[async_trait]
impl TickerConfigStore for SqlxTickerConfigStore {
    async fn get_or_create(&self, group_id: &str) -> anyhow::Result<GroupConfig> {
        let mut conn = self.pool.acquire().await?;
        let mut group = load_group(&mut conn, group_id).await?;

        let rows = sqlx::query(&format!(
            "SELECT {TICKER_COLUMNS} FROM ticker_configs WHERE group_id = ? ORDER BY surface_id;"
        ))
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await?;

        for r in rows {
            match row_to_ticker(&r) {
                Ok(t) => group.tickers.push(t),
                Err(e) => {
                    // poison-row resilience: skip the surface, keep the group
                    tracing::warn!(group_id, error = %e, "skipping malformed ticker row");
                }
            }
        }

        Ok(group)
    }

    async fn upsert_ticker(
        &self,
        group_id: &str,
        surface_id: &str,
        patch: &TickerPatch,
    ) -> anyhow::Result<TickerConfig> {
        patch.validate()?;

        let mut tx = self.pool.begin().await?;
        load_group(&mut tx, group_id).await?;

        let row = sqlx::query(&format!(
            "SELECT {TICKER_COLUMNS} FROM ticker_configs WHERE group_id = ? AND surface_id = ?;"
        ))
        .bind(group_id)
        .bind(surface_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut ticker = match row.map(|r| row_to_ticker(&r)).transpose() {
            Ok(Some(t)) => t,
            Ok(None) => TickerConfig::new(group_id, surface_id, self.default_poll_ms),
            Err(e) => {
                tracing::warn!(group_id, surface_id, error = %e, "replacing malformed ticker row");
                TickerConfig::new(group_id, surface_id, self.default_poll_ms)
            }
        };
        ticker.apply(patch);

        write_ticker(&mut tx, &ticker).await?;
        tx.commit().await?;

        Ok(ticker)
    }

    async fn update_group(&self, group_id: &str, patch: &GroupPatch) -> anyhow::Result<GroupConfig> {
        let mut tx = self.pool.begin().await?;
        let mut group = load_group(&mut tx, group_id).await?;
        group.apply(patch);

        sqlx::query(
            r#"
UPDATE group_configs
SET default_interval = ?, watchlist = ?, updated_ms = ?
WHERE group_id = ?;
"#,
        )
        .bind(group.default_interval.clone())
        .bind(serde_json::to_string(&group.watchlist)?)
        .bind(now_ms())
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_or_create(group_id).await
    }

    async fn disable_ticker(&self, group_id: &str, surface_id: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE ticker_configs
SET enabled = 0, updated_ms = ?
WHERE group_id = ? AND surface_id = ?;
"#,
        )
        .bind(now_ms())
        .bind(group_id)
        .bind(surface_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn disable_all(&self, group_id: &str) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
UPDATE ticker_configs
SET enabled = 0, updated_ms = ?
WHERE group_id = ? AND enabled = 1;
"#,
        )
        .bind(now_ms())
        .bind(group_id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(group_id, disabled = res.rows_affected(), "tickers disabled");
        Ok(())
    }

    async fn find_groups_with_active_tickers(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
SELECT DISTINCT group_id
FROM ticker_configs
WHERE enabled = 1
ORDER BY group_id;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("group_id").map_err(Into::into))
            .collect()
    }
}

/* =========================
Row mapping + conversions
========================= */

/// Reads the group row, inserting defaults first if it does not exist.
/// Tickers are not loaded.
async fn load_group(conn: &mut AnyConnection, group_id: &str) -> anyhow::Result<GroupConfig> {
    let defaults = GroupConfig::new(group_id);

    sqlx::query(
        r#"
INSERT INTO group_configs (group_id, default_interval, watchlist, updated_ms)
VALUES (?, ?, ?, ?)
ON CONFLICT (group_id) DO NOTHING;
"#,
    )
    .bind(group_id)
    .bind(defaults.default_interval.clone())
    .bind("[]")
    .bind(now_ms())
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"SELECT default_interval, watchlist FROM group_configs WHERE group_id = ?;"#,
    )
    .bind(group_id)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("group {group_id} missing after insert"))?;

    let default_interval: String = row.try_get("default_interval")?;
    let watchlist_raw: String = row.try_get("watchlist")?;
    let watchlist = serde_json::from_str(&watchlist_raw).unwrap_or_else(|e| {
        tracing::warn!(group_id, error = %e, "ignoring malformed watchlist");
        Vec::new()
    });

    Ok(GroupConfig {
        default_interval: if default_interval.trim().is_empty() {
            defaults.default_interval
        } else {
            default_interval
        },
        watchlist,
        ..defaults
    })
}

async fn write_ticker(conn: &mut AnyConnection, t: &TickerConfig) -> anyhow::Result<()> {
    sqlx::query(
        r#"
INSERT INTO ticker_configs (
  group_id, surface_id, enabled, symbols, template,
  price_precision, poll_interval_ms, original_name, updated_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (group_id, surface_id) DO UPDATE SET
  enabled = excluded.enabled,
  symbols = excluded.symbols,
  template = excluded.template,
  price_precision = excluded.price_precision,
  poll_interval_ms = excluded.poll_interval_ms,
  original_name = excluded.original_name,
  updated_ms = excluded.updated_ms;
"#,
    )
    .bind(t.group_id.clone())
    .bind(t.surface_id.clone())
    .bind(i64::from(t.enabled))
    .bind(serde_json::to_string(&t.symbols)?)
    .bind(t.template.clone())
    .bind(i64::from(t.precision))
    .bind(u64_to_i64(t.poll_interval_ms)?)
    .bind(t.original_name.clone())
    .bind(now_ms())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn row_to_ticker(r: &sqlx::any::AnyRow) -> anyhow::Result<TickerConfig> {
    let symbols_raw: String = r.try_get("symbols")?;
    let symbols: Vec<String> =
        serde_json::from_str(&symbols_raw).context("invalid symbols json")?;

    let enabled: i64 = r.try_get("enabled")?;

    Ok(TickerConfig {
        group_id: r.try_get("group_id")?,
        surface_id: r.try_get("surface_id")?,
        enabled: enabled == 1,
        symbols,
        template: r.try_get("template")?,
        precision: i64_to_precision(r.try_get("price_precision")?)?,
        poll_interval_ms: i64_to_positive_u64(r.try_get("poll_interval_ms")?)?,
        original_name: r.try_get::<Option<String>, _>("original_name")?,
    })
}

/* =========================
Numeric safety helpers
========================= */

fn i64_to_precision(v: i64) -> anyhow::Result<u8> {
    if !(1..=6).contains(&v) {
        return Err(anyhow!("precision out of range: {v}"));
    }
    Ok(v as u8)
}

fn i64_to_positive_u64(v: i64) -> anyhow::Result<u64> {
    if v <= 0 {
        return Err(anyhow!("non-positive interval: {v}"));
    }
    Ok(v as u64)
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("u64 too large for i64: {v}"))
}
