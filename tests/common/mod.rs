//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use liteorm::storage::FixedDirLocator;
use liteorm::{
    ConnectionPool, ConnectionTarget, Database, Describe, Entity, PoolConfig, Provider,
    RusqliteProvider,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Routes library logging to the test harness once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A pool rooted in a fresh temporary directory. Keep the `TempDir` alive.
pub fn temp_pool() -> (TempDir, ConnectionPool) {
    temp_pool_with(Arc::new(RusqliteProvider))
}

pub fn temp_pool_with(provider: Arc<dyn Provider>) -> (TempDir, ConnectionPool) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = PoolConfig {
        trace: true,
        ..PoolConfig::default()
    };
    let pool = ConnectionPool::with_locator(
        provider,
        config,
        Arc::new(FixedDirLocator(dir.path().to_path_buf())),
    );
    (dir, pool)
}

/// A database with the shop tables created.
pub fn shop_db(pool: &ConnectionPool, name: &str) -> Database {
    let db = pool.database(&ConnectionTarget::new(name)).unwrap();
    db.create_table::<Category>().unwrap();
    db.create_table::<Product>().unwrap();
    db
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Category {
    pub category_id: i64,
    pub title: String,
}

impl Entity for Category {
    fn describe(d: &mut Describe<Self>) {
        d.column("CategoryID", |c| &c.category_id, |c| &mut c.category_id)
            .auto_increment();
        d.column("Title", |c| &c.title, |c| &mut c.title)
            .max_length(60)
            .unique();
        d.has_many::<Product>("Products");
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Product {
    pub product_id: i64,
    pub name: String,
    pub category_id: i64,
    pub price: f64,
    pub discontinued: bool,
    pub listed_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn new(name: &str, category_id: i64, price: f64) -> Self {
        Product {
            name: name.to_string(),
            category_id,
            price,
            ..Product::default()
        }
    }
}

impl Entity for Product {
    fn describe(d: &mut Describe<Self>) {
        d.column("ProductID", |p| &p.product_id, |p| &mut p.product_id)
            .auto_increment();
        d.column("Name", |p| &p.name, |p| &mut p.name).max_length(120);
        d.column("CategoryID", |p| &p.category_id, |p| &mut p.category_id)
            .indexed();
        d.column("Price", |p| &p.price, |p| &mut p.price);
        d.column("Discontinued", |p| &p.discontinued, |p| &mut p.discontinued);
        d.column("ListedAt", |p| &p.listed_at, |p| &mut p.listed_at);
        d.has_one::<Category>("Category");
    }
}

/// Composite-key entity without an engine-generated key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderLine {
    pub order_no: i64,
    pub line_no: i32,
    pub sku: String,
    pub quantity: i32,
    pub note: Option<String>,
}

impl Entity for OrderLine {
    fn describe(d: &mut Describe<Self>) {
        d.column("OrderNo", |l| &l.order_no, |l| &mut l.order_no)
            .primary_key();
        d.column("LineNo", |l| &l.line_no, |l| &mut l.line_no)
            .primary_key();
        d.column("Sku", |l| &l.sku, |l| &mut l.sku);
        d.column("Quantity", |l| &l.quantity, |l| &mut l.quantity);
        d.column("Note", |l| &l.note, |l| &mut l.note);
    }
}

/// Seeds `count` products spread over `categories` categories, named `P01`, `P02`, ...
pub fn seed_products(db: &Database, categories: usize, count: usize) -> Vec<Product> {
    let category_table = db.table::<Category>().unwrap();
    let mut cats: Vec<Category> = (1..=categories)
        .map(|i| Category {
            category_id: 0,
            title: format!("Category {}", i),
        })
        .collect();
    category_table.insert_all(&mut cats).unwrap();

    let products = db.table::<Product>().unwrap();
    let mut rows: Vec<Product> = (0..count)
        .map(|i| {
            Product::new(
                &format!("P{:02}", i + 1),
                cats[i % categories].category_id,
                (i + 1) as f64 * 1.5,
            )
        })
        .collect();
    products.insert_all(&mut rows).unwrap();
    rows
}
