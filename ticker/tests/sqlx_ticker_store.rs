use sqlx::AnyPool;
use uuid::Uuid;

use ticker::db::Db;
use ticker::store::model::{GroupPatch, TickerPatch};
use ticker::store::repository::TickerConfigStore;
use ticker::store::repository_sqlx::SqlxTickerConfigStore;

/// Isolated in-memory DB per test.
/// Unique name prevents test interference during parallel execution.
async fn setup_db() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let db = Db::connect(&conn).await.expect("connect sqlite memory db");
    db.migrate().await.expect("migrate");

    (*db.pool).clone()
}

async fn setup_store() -> (SqlxTickerConfigStore, AnyPool) {
    let pool = setup_db().await;
    (SqlxTickerConfigStore::new(pool.clone(), 30_000), pool)
}

#[tokio::test]
async fn get_or_create_returns_defaults_for_new_group() {
    let (store, _) = setup_store().await;

    let group = store.get_or_create("guild-1").await.unwrap();

    assert_eq!(group.group_id, "guild-1");
    assert_eq!(group.default_interval, "15");
    assert!(group.watchlist.is_empty());
    assert!(group.tickers.is_empty());

    // Idempotent.
    let again = store.get_or_create("guild-1").await.unwrap();
    assert_eq!(again, group);
}

#[tokio::test]
async fn upsert_creates_then_patches_ticker() {
    let (store, _) = setup_store().await;

    let created = store
        .upsert_ticker(
            "guild-1",
            "voice-1",
            &TickerPatch {
                enabled: Some(true),
                symbols: Some(vec!["odana:xauusd".into(), "EURUSD".into()]),
                original_name: Some("lobby".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(created.enabled);
    assert_eq!(created.symbols, vec!["ODANA:XAUUSD", "EURUSD"]);
    assert_eq!(created.template, "{PAIR}:{PRICE}");
    assert_eq!(created.precision, 3);
    assert_eq!(created.poll_interval_ms, 30_000);

    store
        .upsert_ticker(
            "guild-1",
            "voice-1",
            &TickerPatch {
                precision: Some(2),
                template: Some("{PAIR} {PRICE}".into()),
                original_name: Some("XAUUSD:2310.000".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let group = store.get_or_create("guild-1").await.unwrap();
    let t = group.ticker("voice-1").unwrap();
    assert!(t.enabled);
    assert_eq!(t.precision, 2);
    assert_eq!(t.template, "{PAIR} {PRICE}");
    assert_eq!(t.symbols, vec!["ODANA:XAUUSD", "EURUSD"]);
    assert_eq!(t.original_name.as_deref(), Some("lobby"));
}

#[tokio::test]
async fn invalid_patch_is_rejected_and_not_written() {
    let (store, _) = setup_store().await;

    let err = store
        .upsert_ticker(
            "guild-1",
            "voice-1",
            &TickerPatch {
                enabled: Some(true),
                precision: Some(9),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("precision"));
    let group = store.get_or_create("guild-1").await.unwrap();
    assert!(group.tickers.is_empty());
}

#[tokio::test]
async fn disable_and_active_group_listing() {
    let (store, _) = setup_store().await;

    for (g, s) in [("guild-a", "v1"), ("guild-a", "v2"), ("guild-b", "v1")] {
        store.upsert_ticker(g, s, &TickerPatch::enable()).await.unwrap();
    }
    store.get_or_create("guild-c").await.unwrap();

    assert_eq!(
        store.find_groups_with_active_tickers().await.unwrap(),
        vec!["guild-a", "guild-b"]
    );

    store.disable_ticker("guild-a", "v1").await.unwrap();
    let a = store.get_or_create("guild-a").await.unwrap();
    assert_eq!(a.enabled_tickers().count(), 1);

    store.disable_all("guild-a").await.unwrap();
    assert_eq!(
        store.find_groups_with_active_tickers().await.unwrap(),
        vec!["guild-b"]
    );

    // Disabled tickers keep their settings.
    let a = store.get_or_create("guild-a").await.unwrap();
    assert_eq!(a.tickers.len(), 2);
}

#[tokio::test]
async fn update_group_sets_watchlist_and_interval() {
    let (store, _) = setup_store().await;
    store
        .upsert_ticker("guild-1", "voice-1", &TickerPatch::enable())
        .await
        .unwrap();

    let group = store
        .update_group(
            "guild-1",
            &GroupPatch {
                default_interval: Some("60".into()),
                watchlist: Some(vec!["eurusd".into(), " gbpusd ".into()]),
            },
        )
        .await
        .unwrap();

    assert_eq!(group.default_interval, "60");
    assert_eq!(group.watchlist, vec!["EURUSD", "GBPUSD"]);
    assert_eq!(group.tickers.len(), 1);

    let t = group.ticker("voice-1").unwrap();
    assert_eq!(group.symbols_for(t), vec!["EURUSD", "GBPUSD"]);
}

#[tokio::test]
async fn malformed_rows_are_skipped() {
    let (store, pool) = setup_store().await;
    store
        .upsert_ticker("guild-1", "voice-1", &TickerPatch::enable())
        .await
        .unwrap();

    sqlx::query(
        r#"
INSERT INTO ticker_configs (
  group_id, surface_id, enabled, symbols, template,
  price_precision, poll_interval_ms, original_name, updated_ms
)
VALUES ('guild-1', 'voice-2', 1, 'not json', '{PAIR}:{PRICE}', 3, 30000, NULL, 0);
"#,
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query(
        r#"
INSERT INTO ticker_configs (
  group_id, surface_id, enabled, symbols, template,
  price_precision, poll_interval_ms, original_name, updated_ms
)
VALUES ('guild-1', 'voice-3', 1, '[]', '{PAIR}:{PRICE}', 42, 30000, NULL, 0);
"#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let group = store.get_or_create("guild-1").await.unwrap();
    let ids: Vec<&str> = group.tickers.iter().map(|t| t.surface_id.as_str()).collect();
    assert_eq!(ids, vec!["voice-1"]);

    // A later upsert replaces the broken row with defaults plus the patch.
    let fixed = store
        .upsert_ticker("guild-1", "voice-2", &TickerPatch::enable())
        .await
        .unwrap();
    assert!(fixed.symbols.is_empty());
    assert_eq!(store.get_or_create("guild-1").await.unwrap().tickers.len(), 2);
}
