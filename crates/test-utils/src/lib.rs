//! Tabula test utilities.
//!
//! Helpers for integration testing: in-memory SQLite databases, seeded
//! fixture tables, and assertion utilities.

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Open a private in-memory SQLite database.
///
/// The pool holds exactly one connection that never expires; every
/// connection to `sqlite::memory:` is its own database.
///
/// # Panics
///
/// Panics if the database cannot be opened.
#[allow(clippy::expect_used)]
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory SQLite database")
}

/// A row of the `orders` fixture.
#[derive(Debug, Clone)]
pub struct TestOrder {
    pub id: i64,
    pub customer: String,
    pub status: Option<String>,
    pub total: f64,
    pub quantity: i64,
}

impl TestOrder {
    pub fn new(id: i64, customer: &str, total: f64) -> Self {
        Self {
            id,
            customer: customer.to_string(),
            status: Some("paid".to_string()),
            total,
            quantity: 1,
        }
    }

    /// Set the status; `None` stores NULL.
    pub fn with_status(mut self, status: Option<&str>) -> Self {
        self.status = status.map(str::to_string);
        self
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }
}

/// The default `orders` fixture: six orders from three customers.
///
/// | customer | orders | sum(total) |
/// |----------|--------|------------|
/// | ann      | 3      | 43.0       |
/// | bob      | 2      | 45.0       |
/// | cat      | 1      | 100.0      |
///
/// Order 4 has a NULL status, order 2 is `open`.
pub fn default_orders() -> Vec<TestOrder> {
    vec![
        TestOrder::new(1, "ann", 10.0),
        TestOrder::new(2, "ann", 25.5)
            .with_status(Some("open"))
            .with_quantity(2),
        TestOrder::new(3, "bob", 40.0).with_quantity(4),
        TestOrder::new(4, "bob", 5.0).with_status(None),
        TestOrder::new(5, "cat", 100.0).with_quantity(10),
        TestOrder::new(6, "ann", 7.5).with_quantity(3),
    ]
}

/// Create the `orders` table and insert the given rows.
///
/// # Panics
///
/// Panics if the table cannot be created or a row cannot be inserted.
#[allow(clippy::expect_used)]
pub async fn seed_orders(pool: &SqlitePool, orders: &[TestOrder]) {
    sqlx::query(
        "CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer TEXT NOT NULL,
            status TEXT,
            total REAL NOT NULL,
            quantity INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await
    .expect("failed to create orders table");

    for order in orders {
        sqlx::query(
            "INSERT INTO orders (id, customer, status, total, quantity) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(order.id)
        .bind(&order.customer)
        .bind(&order.status)
        .bind(order.total)
        .bind(order.quantity)
        .execute(pool)
        .await
        .expect("failed to insert order");
    }
}

/// In-memory database holding the default `orders` fixture.
pub async fn orders_pool() -> SqlitePool {
    let pool = memory_pool().await;
    seed_orders(&pool, &default_orders()).await;
    pool
}

/// Create a `numbers` table with `count` rows: `id` 1..=count, `label`
/// `"row <id>"`, and an `action` column holding markup.
///
/// # Panics
///
/// Panics if the table cannot be created or filled.
#[allow(clippy::expect_used)]
pub async fn seed_numbers(pool: &SqlitePool, count: i64) {
    sqlx::query("CREATE TABLE numbers (id INTEGER PRIMARY KEY, label TEXT NOT NULL, action TEXT)")
        .execute(pool)
        .await
        .expect("failed to create numbers table");

    sqlx::query(
        "INSERT INTO numbers (id, label, action)
         WITH RECURSIVE seq(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM seq WHERE x < ?1)
         SELECT x, 'row ' || x, '<a href=\"/numbers/' || x || '\">edit</a>' FROM seq",
    )
    .bind(count)
    .execute(pool)
    .await
    .expect("failed to fill numbers table");
}

/// Assertion helpers for rendered output.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain '{needle}'\nActual: {haystack}"
        );
    }
}
