//! End-to-end ledger properties against a real PostgreSQL.
//!
//! These tests need a database: set DATABASE_URL and run with
//! `cargo test -- --ignored`. They create their own tables and clean up the
//! user ids they touch, so they are safe to point at a scratch database.

use loyalty_engine::database::Database;
use loyalty_engine::errors::LoyaltyEngineError;
use loyalty_engine::ledger::LedgerStore;
use loyalty_engine::loyalty::LoyaltyService;
use loyalty_engine::settings::SettingsStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS loyalty_accounts (
        user_id BIGINT PRIMARY KEY,
        accumulated_points BIGINT NOT NULL DEFAULT 0,
        spent_points BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loyalty_history (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        points BIGINT NOT NULL,
        reason TEXT NOT NULL,
        earned_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        expires_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL,
        quantity BIGINT NOT NULL,
        unit_price NUMERIC(10, 2) NOT NULL
    )
    "#,
];

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ledger tests");
    let pool = PgPool::connect(&url).await.expect("connect to test database");
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await.expect("create schema");
    }
    pool
}

struct TestEnv {
    db: Database,
    loyalty: LoyaltyService,
    pool: PgPool,
}

async fn test_env() -> TestEnv {
    let pool = connect().await;
    let shared = Arc::new(pool.clone());
    let ledger = Arc::new(LedgerStore::new(shared.clone()));
    let settings = Arc::new(SettingsStore::new(shared));
    let loyalty = LoyaltyService::new(ledger, settings, 100, 90);

    TestEnv {
        db: Database::from_pool(pool.clone()),
        loyalty,
        pool,
    }
}

async fn reset_user(pool: &PgPool, user_id: i64) {
    sqlx::query("DELETE FROM loyalty_accounts WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM loyalty_history WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
}

async fn seed_account(pool: &PgPool, user_id: i64, accumulated: i64, spent: i64) {
    sqlx::query(
        "INSERT INTO loyalty_accounts (user_id, accumulated_points, spent_points) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(accumulated)
    .bind(spent)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_accrue_credits_floor_of_total_over_ratio() {
    let env = test_env().await;
    let user_id = 9001;
    reset_user(&env.pool, user_id).await;

    let mut tx = env.db.begin().await.unwrap();
    let points = env
        .loyalty
        .accrue(&mut tx, user_id, 7, Some(dec!(250)))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(points, 2);

    let balance = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(balance.accumulated_points, 2);
    assert_eq!(balance.spent_points, 0);
    assert_eq!(balance.current_balance, 2);

    let history = env.loyalty.get_history(user_id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].points, 2);
    assert!(history[0].reason.contains('7'));

    // Earning entries carry an expiry roughly 90 days out
    let (expires_at,): (Option<chrono::DateTime<chrono::Utc>>,) =
        sqlx::query_as("SELECT expires_at FROM loyalty_history WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&env.pool)
            .await
            .unwrap();
    let expires_at = expires_at.expect("earning entry must expire");
    let days = (expires_at - chrono::Utc::now()).num_days();
    assert!((89..=90).contains(&days), "expiry {} days out", days);
}

#[tokio::test]
#[ignore]
async fn test_accrue_is_idempotent_on_account_creation() {
    let env = test_env().await;
    let user_id = 9002;
    reset_user(&env.pool, user_id).await;

    for order_id in [1, 2] {
        let mut tx = env.db.begin().await.unwrap();
        env.loyalty
            .accrue(&mut tx, user_id, order_id, Some(dec!(100)))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM loyalty_accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&env.pool)
            .await
            .unwrap();
    assert_eq!(count, 1);

    let balance = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(balance.accumulated_points, 2);
}

#[tokio::test]
#[ignore]
async fn test_accrue_small_total_is_a_noop() {
    let env = test_env().await;
    let user_id = 9003;
    reset_user(&env.pool, user_id).await;

    let mut tx = env.db.begin().await.unwrap();
    let points = env
        .loyalty
        .accrue(&mut tx, user_id, 11, Some(dec!(99.99)))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(points, 0);
    assert!(env.loyalty.get_history(user_id).await.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_accrue_computes_total_from_order_items() {
    let env = test_env().await;
    let user_id = 9004;
    let order_id = 90041;
    reset_user(&env.pool, user_id).await;
    sqlx::query("DELETE FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .execute(&env.pool)
        .await
        .unwrap();

    // 2 x 75.00 + 1 x 80.00 = 230.00 -> 2 points at ratio 100
    for (quantity, unit_price) in [(2i64, dec!(75.00)), (1, dec!(80.00))] {
        sqlx::query("INSERT INTO order_items (order_id, quantity, unit_price) VALUES ($1, $2, $3)")
            .bind(order_id)
            .bind(quantity)
            .bind(unit_price)
            .execute(&env.pool)
            .await
            .unwrap();
    }

    let mut tx = env.db.begin().await.unwrap();
    let points = env.loyalty.accrue(&mut tx, user_id, order_id, None).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(points, 2);
}

#[tokio::test]
#[ignore]
async fn test_redeem_end_to_end() {
    let env = test_env().await;
    let user_id = 9005;
    reset_user(&env.pool, user_id).await;
    seed_account(&env.pool, user_id, 500, 200).await;

    let before = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(before.current_balance, 300);

    let mut tx = env.db.begin().await.unwrap();
    let discount = env.loyalty.redeem(&mut tx, user_id, 100, 42).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(discount, dec!(1.00));

    let after = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(after.accumulated_points, 500);
    assert_eq!(after.spent_points, 300);
    assert_eq!(after.current_balance, 200);

    let history = env.loyalty.get_history(user_id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].points, -100);
    assert!(history[0].reason.contains("42"));

    // Redemption entries never expire
    let (expires_at,): (Option<chrono::DateTime<chrono::Utc>>,) =
        sqlx::query_as("SELECT expires_at FROM loyalty_history WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&env.pool)
            .await
            .unwrap();
    assert!(expires_at.is_none());
}

#[tokio::test]
#[ignore]
async fn test_redeem_insufficient_points_mutates_nothing() {
    let env = test_env().await;
    let user_id = 9006;
    reset_user(&env.pool, user_id).await;
    seed_account(&env.pool, user_id, 100, 0).await;

    let mut tx = env.db.begin().await.unwrap();
    let result = env.loyalty.redeem(&mut tx, user_id, 150, 43).await;
    drop(tx);

    match result {
        Err(LoyaltyEngineError::InsufficientPoints { requested, available }) => {
            assert_eq!(requested, 150);
            assert_eq!(available, 100);
        }
        other => panic!("expected InsufficientPoints, got {:?}", other.map(|_| ())),
    }

    let balance = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(balance.current_balance, 100);
    assert!(env.loyalty.get_history(user_id).await.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_redeem_nonpositive_request_is_a_noop() {
    let env = test_env().await;
    let user_id = 9007;
    reset_user(&env.pool, user_id).await;
    seed_account(&env.pool, user_id, 100, 0).await;

    for points in [0, -5] {
        let mut tx = env.db.begin().await.unwrap();
        let discount = env.loyalty.redeem(&mut tx, user_id, points, 44).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(discount, Decimal::ZERO);
    }

    let balance = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(balance.current_balance, 100);
    assert!(env.loyalty.get_history(user_id).await.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_redeem_rejects_nonpositive_ratio() {
    // A service wired with a non-positive fallback ratio and no settings row
    // must refuse both redemption and accrual without touching the ledger.
    let pool = connect().await;
    let shared = Arc::new(pool.clone());
    let ledger = Arc::new(LedgerStore::new(shared.clone()));
    let settings = Arc::new(SettingsStore::new(shared));
    let loyalty = LoyaltyService::new(ledger, settings, 0, 90);
    let db = Database::from_pool(pool.clone());

    let user_id = 9008;
    reset_user(&pool, user_id).await;
    seed_account(&pool, user_id, 100, 0).await;

    let mut tx = db.begin().await.unwrap();
    let result = loyalty.redeem(&mut tx, user_id, 50, 45).await;
    drop(tx);

    assert!(matches!(result, Err(LoyaltyEngineError::InvalidConfiguration(_))));

    let mut tx = db.begin().await.unwrap();
    let result = loyalty.accrue(&mut tx, user_id, 45, Some(dec!(500))).await;
    drop(tx);

    assert!(matches!(result, Err(LoyaltyEngineError::InvalidConfiguration(_))));

    let balance = loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(balance.current_balance, 100);
    assert!(loyalty.get_history(user_id).await.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_settings_lookup_with_typed_default() {
    let pool = connect().await;
    let settings = SettingsStore::new(Arc::new(pool.clone()));
    let key = "LOYALTY_TEST_RATIO_9012";

    sqlx::query("DELETE FROM settings WHERE key = $1")
        .bind(key)
        .execute(&pool)
        .await
        .unwrap();

    // Missing key falls back to the caller's default
    assert_eq!(settings.get_i64(key, 100).await.unwrap(), 100);

    sqlx::query("INSERT INTO settings (key, value) VALUES ($1, '250')")
        .bind(key)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(settings.get_i64(key, 100).await.unwrap(), 250);

    // Garbage values also fall back to the default
    sqlx::query("UPDATE settings SET value = 'not-a-number' WHERE key = $1")
        .bind(key)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(settings.get_i64(key, 100).await.unwrap(), 100);
}

#[tokio::test]
#[ignore]
async fn test_history_is_most_recent_first() {
    let env = test_env().await;
    let user_id = 9009;
    reset_user(&env.pool, user_id).await;

    for (points, reason, minutes_ago) in [(5i64, "Order #1", 30i64), (-2, "Redemption on order #2", 20), (7, "Order #3", 10)] {
        sqlx::query(
            "INSERT INTO loyalty_history (user_id, points, reason, earned_at) VALUES ($1, $2, $3, now() - make_interval(mins => $4))",
        )
        .bind(user_id)
        .bind(points)
        .bind(reason)
        .bind(minutes_ago as i32)
        .execute(&env.pool)
        .await
        .unwrap();
    }

    let history = env.loyalty.get_history(user_id).await;
    let points: Vec<i64> = history.iter().map(|entry| entry.points).collect();
    assert_eq!(points, vec![7, -2, 5]);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_redemptions_allow_exactly_one_winner() {
    let env = test_env().await;
    let user_id = 9010;
    reset_user(&env.pool, user_id).await;
    seed_account(&env.pool, user_id, 100, 0).await;

    let env = Arc::new(env);

    let redeem_once = |order_id: i64| {
        let env = env.clone();
        async move {
            let mut tx = env.db.begin().await.unwrap();
            let result = env.loyalty.redeem(&mut tx, user_id, 60, order_id).await;
            match result {
                Ok(discount) => {
                    tx.commit().await.unwrap();
                    Ok(discount)
                }
                Err(e) => Err(e),
            }
        }
    };

    let (first, second) = tokio::join!(redeem_once(61), redeem_once(62));

    let outcomes = [first, second];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let insufficient = outcomes
        .iter()
        .filter(|r| matches!(r, Err(LoyaltyEngineError::InsufficientPoints { .. })))
        .count();

    assert_eq!(successes, 1, "exactly one redemption must win");
    assert_eq!(insufficient, 1, "the loser must see InsufficientPoints");

    let balance = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(balance.spent_points, 60);
    assert_eq!(balance.current_balance, 40);
}

#[tokio::test]
#[ignore]
async fn test_balance_is_zero_for_unknown_user() {
    let env = test_env().await;
    let user_id = 9011;
    reset_user(&env.pool, user_id).await;

    let balance = env.loyalty.get_balance(user_id).await.unwrap();
    assert_eq!(balance.accumulated_points, 0);
    assert_eq!(balance.spent_points, 0);
    assert_eq!(balance.current_balance, 0);
}
