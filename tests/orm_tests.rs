//! End-to-end tests of the mapper against on-disk databases.

mod common;

use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use common::{seed_products, shop_db, temp_pool, Category, OrderLine, Product};
use liteorm::{
    col, col_of, count, outer, subquery, sum, val, ConnectionTarget, CreateTableResult, Describe,
    Entity, OrmError, Query, Value,
};
use uuid::Uuid;

#[test]
fn test_insert_get_update_delete() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "crud.db");
    let products = db.table::<Product>().unwrap();

    let listed = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
    let mut widget = Product {
        listed_at: Some(listed),
        ..Product::new("Widget", 1, 9.99)
    };
    assert_eq!(products.insert(&mut widget).unwrap(), 1);
    assert!(widget.product_id > 0);

    let loaded = products.get(widget.product_id).unwrap();
    assert_eq!(loaded, widget);

    widget.price = 12.5;
    widget.discontinued = true;
    assert_eq!(products.update(&widget).unwrap(), 1);
    let reloaded = products.get(widget.product_id).unwrap();
    assert_eq!(reloaded.price, 12.5);
    assert!(reloaded.discontinued);

    assert_eq!(products.delete(&widget).unwrap(), 1);
    assert_eq!(products.find(widget.product_id).unwrap(), None);
    match products.get(widget.product_id) {
        Err(OrmError::NotFound(_)) => {}
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_auto_increment_keys_are_distinct() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "keys.db");
    let rows = seed_products(&db, 2, 12);

    let mut ids: Vec<i64> = rows.iter().map(|p| p.product_id).collect();
    assert!(ids.iter().all(|id| *id != 0));
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 12);
}

#[test]
fn test_filter_by_category() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "filter.db");
    seed_products(&db, 4, 10);
    let products = db.table::<Product>().unwrap();

    let matched = products
        .filter(col("CategoryID").eq(3))
        .order_by(col("ProductID"))
        .to_list()
        .unwrap();
    let names: Vec<&str> = matched.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["P03", "P07"]);
    assert!(matched.iter().all(|p| p.category_id == 3));

    let cheap = products.filter(col("Price").lt(6.0)).count().unwrap();
    assert_eq!(cheap, 3);
    assert!(products.filter(col("Name").like("P1%")).any().unwrap());
    assert!(!products.filter(col("Name").eq("nope")).any().unwrap());
}

#[test]
fn test_skip_take_window() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "paging.db");
    seed_products(&db, 3, 33);
    let products = db.table::<Product>().unwrap();

    let page = products
        .query()
        .order_by(col("ProductID"))
        .skip(3)
        .take(5)
        .to_list()
        .unwrap();
    let names: Vec<&str> = page.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["P04", "P05", "P06", "P07", "P08"]);

    let tail = products.query().order_by(col("ProductID")).skip(30).to_list().unwrap();
    assert_eq!(tail.len(), 3);

    assert_eq!(
        products.query().order_by(col("ProductID")).element_at(9).unwrap().name,
        "P10"
    );
    assert!(matches!(
        products.query().element_at(33),
        Err(OrmError::NotFound(_))
    ));
    assert_eq!(products.query().skip(30).take(10).count().unwrap(), 3);
}

#[test]
fn test_ordering_and_first() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "order.db");
    seed_products(&db, 2, 6);
    let products = db.table::<Product>().unwrap();

    let priciest = products.query().order_by_desc(col("Price")).first().unwrap();
    assert_eq!(priciest.name, "P06");

    let by_category = products
        .query()
        .order_by(col("CategoryID"))
        .then_by_desc(col("Price"))
        .to_list()
        .unwrap();
    let names: Vec<&str> = by_category.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["P05", "P03", "P01", "P06", "P04", "P02"]);

    assert!(products
        .filter(col("Price").gt(1000.0))
        .first_or_none()
        .unwrap()
        .is_none());
    assert!(matches!(
        products.filter(col("Price").gt(1000.0)).first(),
        Err(OrmError::NotFound(_))
    ));
}

#[test]
fn test_delete_then_query_is_empty() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "delete.db");
    let rows = seed_products(&db, 2, 4);
    let products = db.table::<Product>().unwrap();

    assert_eq!(products.delete_by_key(rows[0].product_id).unwrap(), 1);
    assert_eq!(products.delete_by_key(rows[0].product_id).unwrap(), 0);
    assert_eq!(
        products
            .filter(col("ProductID").eq(rows[0].product_id))
            .to_list()
            .unwrap(),
        Vec::new()
    );

    assert_eq!(products.delete_all().unwrap(), 3);
    assert!(products.to_list().unwrap().is_empty());
}

#[test]
fn test_fluent_update_and_delete() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "fluent.db");
    seed_products(&db, 2, 8);
    let products = db.table::<Product>().unwrap();

    let changed = products
        .filter(col("CategoryID").eq(1))
        .update(&[("Price", col("Price").mul(2)), ("Discontinued", val(true))])
        .unwrap();
    assert_eq!(changed, 4);

    let first = products.get(1i64).unwrap();
    assert_eq!(first.price, 3.0);
    assert!(first.discontinued);
    assert!(!products.get(2i64).unwrap().discontinued);

    let removed = products.filter(col("Discontinued").eq(true)).delete().unwrap();
    assert_eq!(removed, 4);
    assert_eq!(products.count().unwrap(), 4);
}

#[test]
fn test_insert_or_replace_and_composite_keys() {
    let (_dir, pool) = temp_pool();
    let db = pool.database(&ConnectionTarget::new("lines.db")).unwrap();
    assert_eq!(db.create_table::<OrderLine>().unwrap(), CreateTableResult::Created);
    let lines = db.table::<OrderLine>().unwrap();

    let mut line = OrderLine {
        order_no: 7,
        line_no: 1,
        sku: "A-1".to_string(),
        quantity: 2,
        note: None,
    };
    lines.insert(&mut line).unwrap();
    let mut second = OrderLine {
        line_no: 2,
        sku: "B-2".to_string(),
        ..line.clone()
    };
    lines.insert(&mut second).unwrap();

    line.quantity = 5;
    line.note = Some("rush".to_string());
    lines.insert_or_replace(&mut line).unwrap();
    assert_eq!(lines.count().unwrap(), 2);

    let found = lines
        .find_by_key(&[Value::Integer(7), Value::Integer(1)])
        .unwrap()
        .unwrap();
    assert_eq!(found.quantity, 5);
    assert_eq!(found.note.as_deref(), Some("rush"));

    // A single key value against a two-column key.
    assert!(matches!(lines.find(7i64), Err(OrmError::Mapping(_))));

    // Duplicate key through a plain insert is an engine error.
    let mut duplicate = second.clone();
    let err = lines.insert(&mut duplicate).unwrap_err();
    assert!(err.is_engine());
}

#[test]
fn test_join_and_select() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "join.db");
    seed_products(&db, 3, 9);
    let products = db.table::<Product>().unwrap();

    let in_second = products
        .query()
        .join_association("c", "Category")
        .unwrap()
        .filter(col_of("c", "Title").eq("Category 2"))
        .to_list()
        .unwrap();
    assert_eq!(in_second.len(), 3);
    assert!(in_second.iter().all(|p| p.category_id == 2));

    let rows = products
        .query()
        .join_on::<Category>("c", &[("CategoryID", "CategoryID")])
        .unwrap()
        .order_by(col("ProductID"))
        .select(vec![("Name", col("Name")), ("Title", col_of("c", "Title"))])
        .take(2)
        .to_list()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<String>("Name").unwrap(), "P01");
    assert_eq!(rows[0].get::<String>("Title").unwrap(), "Category 1");
    assert_eq!(rows[1].get::<String>("Title").unwrap(), "Category 2");
}

#[test]
fn test_group_join_keeps_empty_groups() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "groupjoin.db");
    seed_products(&db, 2, 5);
    let categories = db.table::<Category>().unwrap();
    let mut empty = Category {
        category_id: 0,
        title: "Empty".to_string(),
    };
    categories.insert(&mut empty).unwrap();

    let groups = categories
        .query()
        .order_by(col("CategoryID"))
        .group_join::<Product>("p", &[("CategoryID", "CategoryID")])
        .unwrap();
    let shape: Vec<(&str, usize)> = groups
        .iter()
        .map(|(c, products)| (c.title.as_str(), products.len()))
        .collect();
    assert_eq!(shape, vec![("Category 1", 3), ("Category 2", 2), ("Empty", 0)]);
    assert!(groups[0].1.iter().all(|p| p.category_id == 1));
}

#[test]
fn test_grouping_and_aggregates() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "aggregate.db");
    seed_products(&db, 4, 10);
    let products = db.table::<Product>().unwrap();

    let groups = products
        .query()
        .group_by(vec![col("CategoryID")])
        .filter(count().gt(2))
        .select(vec![
            ("CategoryID", col("CategoryID")),
            ("N", count()),
            ("Total", sum(col("Price"))),
        ])
        .order_by(col("CategoryID"))
        .to_list()
        .unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].get::<i64>("CategoryID").unwrap(), 1);
    assert_eq!(groups[0].get::<i64>("N").unwrap(), 3);
    // P01 + P05 + P09
    assert_eq!(groups[0].get::<f64>("Total").unwrap(), 1.5 + 7.5 + 13.5);

    let total: f64 = products.query().sum(col("Price")).unwrap();
    assert_eq!(total, 1.5 * 55.0);
    let none: f64 = products.filter(col("Price").lt(0.0)).sum(col("Price")).unwrap();
    assert_eq!(none, 0.0);

    assert_eq!(products.query().max::<f64>(col("Price")).unwrap(), Some(15.0));
    assert_eq!(products.query().min::<String>(col("Name")).unwrap(), Some("P01".to_string()));
    assert_eq!(products.filter(col("Price").lt(0.0)).avg(col("Price")).unwrap(), None);
    assert_eq!(products.filter(col("CategoryID").eq(2)).avg(col("Price")).unwrap(), Some(9.0));
}

#[test]
fn test_group_filter_after_paging() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "group_paging.db");
    let products = db.table::<Product>().unwrap();
    let mut rows = vec![
        Product::new("Solo", 1, 1.0),
        Product::new("A", 2, 1.0),
        Product::new("B", 2, 2.0),
        Product::new("C", 2, 3.0),
    ];
    products.insert_all(&mut rows).unwrap();

    let groups = products
        .query()
        .group_by(vec![col("CategoryID")])
        .order_by(col("CategoryID"));

    // take(1) keeps category 1, which has a single product.
    let first = groups.take(1);
    assert!(first.filter(count().gt(1)).to_list().unwrap().is_empty());
    assert_eq!(first.filter(count().gt(1)).count().unwrap(), 0);

    let busy = groups.take(2).filter(count().gt(1)).to_list().unwrap();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].get::<i64>("key0").unwrap(), 2);

    let counted = first
        .select(vec![("CategoryID", col("CategoryID")), ("N", count())])
        .to_list()
        .unwrap();
    assert_eq!(counted.len(), 1);
    assert_eq!(counted[0].get::<i64>("CategoryID").unwrap(), 1);
    assert_eq!(counted[0].get::<i64>("N").unwrap(), 1);

    let later = groups.take(2).filter(col("CategoryID").gt(1)).to_list().unwrap();
    assert_eq!(later.len(), 1);
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Sample {
    sample_id: i64,
    tiny: i8,
    small: i16,
    medium: i32,
    byte: u8,
    word: u16,
    dword: u32,
    single: f32,
    double: f64,
    flag: bool,
    text: String,
    payload: Vec<u8>,
    serial: Uuid,
    taken_at: chrono::DateTime<Utc>,
    local_at: chrono::DateTime<FixedOffset>,
    day: NaiveDate,
    elapsed: Duration,
    maybe_serial: Option<Uuid>,
    maybe_day: Option<NaiveDate>,
}

impl Entity for Sample {
    fn describe(d: &mut Describe<Self>) {
        d.column("SampleID", |s| &s.sample_id, |s| &mut s.sample_id)
            .auto_increment();
        d.column("Tiny", |s| &s.tiny, |s| &mut s.tiny);
        d.column("Small", |s| &s.small, |s| &mut s.small);
        d.column("Medium", |s| &s.medium, |s| &mut s.medium);
        d.column("Byte", |s| &s.byte, |s| &mut s.byte);
        d.column("Word", |s| &s.word, |s| &mut s.word);
        d.column("DWord", |s| &s.dword, |s| &mut s.dword);
        d.column("Single", |s| &s.single, |s| &mut s.single);
        d.column("Double", |s| &s.double, |s| &mut s.double);
        d.column("Flag", |s| &s.flag, |s| &mut s.flag);
        d.column("Text", |s| &s.text, |s| &mut s.text);
        d.column("Payload", |s| &s.payload, |s| &mut s.payload);
        d.column("Serial", |s| &s.serial, |s| &mut s.serial);
        d.column("TakenAt", |s| &s.taken_at, |s| &mut s.taken_at);
        d.column("LocalAt", |s| &s.local_at, |s| &mut s.local_at);
        d.column("Day", |s| &s.day, |s| &mut s.day);
        d.column("Elapsed", |s| &s.elapsed, |s| &mut s.elapsed);
        d.column("MaybeSerial", |s| &s.maybe_serial, |s| &mut s.maybe_serial);
        d.column("MaybeDay", |s| &s.maybe_day, |s| &mut s.maybe_day);
    }
}

#[test]
fn test_every_scalar_kind_round_trips() {
    let (_dir, pool) = temp_pool();
    let db = pool.database(&ConnectionTarget::new("scalars.db")).unwrap();
    db.create_table::<Sample>().unwrap();
    let samples = db.table::<Sample>().unwrap();

    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    let mut full = Sample {
        sample_id: 0,
        tiny: -8,
        small: -1600,
        medium: 320_000,
        byte: 255,
        word: 65_535,
        dword: u32::MAX,
        single: 0.15625,
        double: -2.5e-3,
        flag: true,
        text: "naïve 'quoted' text".to_string(),
        payload: vec![0, 1, 2, 254, 255],
        serial: Uuid::new_v4(),
        taken_at: Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap(),
        local_at: offset.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap(),
        day: NaiveDate::from_ymd_opt(1999, 12, 31).unwrap(),
        elapsed: Duration::microseconds(-90_061_000_001),
        maybe_serial: Some(Uuid::new_v4()),
        maybe_day: None,
    };
    samples.insert(&mut full).unwrap();
    let loaded = samples.get(full.sample_id).unwrap();
    assert_eq!(loaded, full);
    // Offsets are normalized to UTC; the instant is kept.
    assert_eq!(loaded.local_at.offset().local_minus_utc(), 0);

    let mut empty = Sample::default();
    samples.insert(&mut empty).unwrap();
    let loaded_empty = samples.get(empty.sample_id).unwrap();
    assert_eq!(loaded_empty, empty);
    assert!(loaded_empty.payload.is_empty());
    assert_eq!(loaded_empty.maybe_serial, None);
}

#[test]
fn test_correlated_subquery_filter() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "subquery.db");
    seed_products(&db, 3, 4);
    let categories = db.table::<Category>().unwrap();

    let per_category = Query::from::<Product>()
        .unwrap()
        .filter(col("CategoryID").eq(outer("CategoryID")))
        .count();
    let busy = categories
        .filter(subquery(per_category).gt(1))
        .to_list()
        .unwrap();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].title, "Category 1");
}

#[test]
fn test_projection_into_other_entity() {
    #[derive(Debug, Default)]
    struct PriceTag {
        label: String,
        amount: f64,
    }

    impl Entity for PriceTag {
        fn describe(d: &mut Describe<Self>) {
            d.column("Label", |t| &t.label, |t| &mut t.label);
            d.column("Amount", |t| &t.amount, |t| &mut t.amount);
        }
    }

    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "project.db");
    seed_products(&db, 1, 3);
    let tags = db
        .table::<Product>()
        .unwrap()
        .query()
        .order_by_desc(col("Price"))
        .project::<PriceTag>(vec![
            ("Label", col("Name").concat(" tag")),
            ("Amount", col("Price").mul(10)),
        ])
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0].label, "P03 tag");
    assert_eq!(tags[0].amount, 45.0);
}

#[test]
fn test_transaction_rolls_back_on_error() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "tx.db");
    let products = db.table::<Product>().unwrap();

    let result: liteorm::Result<()> = db.run_in_transaction(|session| {
        let mut p = Product::new("Temp", 1, 1.0);
        session.insert(&mut p)?;
        session.execute("INSERT INTO missing_table VALUES (1)", &[])?;
        Ok(())
    });
    assert!(result.unwrap_err().is_engine());
    assert_eq!(products.count().unwrap(), 0);

    let committed = db
        .run_in_transaction(|session| {
            let mut p = Product::new("Kept", 1, 1.0);
            session.insert(&mut p)?;
            Ok(p.product_id)
        })
        .unwrap();
    assert_eq!(products.get(committed).unwrap().name, "Kept");
}

#[test]
fn test_table_calls_inside_a_transaction_fail_instead_of_hanging() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "reentry.db");
    let products = db.table::<Product>().unwrap();

    let result: liteorm::Result<u64> = db.run_in_transaction(|session| {
        let mut p = Product::new("Inner", 1, 1.0);
        session.insert(&mut p)?;
        products.count()
    });
    match result {
        Err(liteorm::OrmError::Engine(msg)) => assert!(msg.contains("already held")),
        other => panic!("Expected Engine error, got {:?}", other),
    }

    // The failed body rolled back and released the guard.
    assert_eq!(products.count().unwrap(), 0);
    let nested = db.with_session(|_| db.with_session(|_| Ok(())));
    assert!(matches!(nested, Err(liteorm::OrmError::Engine(_))));
}

#[test]
fn test_migration_adds_columns() {
    #[derive(Debug, Default)]
    struct Gadget {
        gadget_id: i64,
        name: String,
    }

    impl Entity for Gadget {
        fn describe(d: &mut Describe<Self>) {
            d.table("Gadgets");
            d.column("GadgetID", |g| &g.gadget_id, |g| &mut g.gadget_id)
                .auto_increment();
            d.column("Name", |g| &g.name, |g| &mut g.name);
        }
    }

    #[derive(Debug, Default)]
    struct GadgetV2 {
        gadget_id: i64,
        name: String,
        weight: f64,
        colour: Option<String>,
    }

    impl Entity for GadgetV2 {
        fn describe(d: &mut Describe<Self>) {
            d.table("Gadgets");
            d.column("GadgetID", |g| &g.gadget_id, |g| &mut g.gadget_id)
                .auto_increment();
            d.column("Name", |g| &g.name, |g| &mut g.name);
            d.column("Weight", |g| &g.weight, |g| &mut g.weight);
            d.column("Colour", |g| &g.colour, |g| &mut g.colour);
        }
    }

    let (_dir, pool) = temp_pool();
    let db = pool.database(&ConnectionTarget::new("migrate.db")).unwrap();
    assert_eq!(db.create_table::<Gadget>().unwrap(), CreateTableResult::Created);
    let mut old = Gadget {
        gadget_id: 0,
        name: "old".to_string(),
    };
    db.table::<Gadget>().unwrap().insert(&mut old).unwrap();

    assert_eq!(db.create_table::<GadgetV2>().unwrap(), CreateTableResult::Migrated);
    let columns: Vec<String> = db
        .table_info("Gadgets")
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(columns, vec!["GadgetID", "Name", "Weight", "Colour"]);

    let migrated = db.table::<GadgetV2>().unwrap().get(old.gadget_id).unwrap();
    assert_eq!(migrated.name, "old");
    assert_eq!(migrated.weight, 0.0);
    assert_eq!(migrated.colour, None);

    assert_eq!(db.create_table::<GadgetV2>().unwrap(), CreateTableResult::Migrated);
}

#[test]
fn test_raw_sql_and_scalars() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "raw.db");
    seed_products(&db, 2, 4);

    let n: Option<i64> = db
        .execute_scalar("SELECT COUNT(*) FROM \"Products\" WHERE \"CategoryID\" = ?", &[Value::Integer(2)])
        .unwrap();
    assert_eq!(n, Some(2));
    let changed = db
        .execute("UPDATE \"Products\" SET \"Price\" = 0 WHERE \"Price\" > ?", &[Value::Real(3.0)])
        .unwrap();
    assert_eq!(changed, 2);

    let rows = db
        .query_rows("SELECT \"Name\" AS name FROM \"Products\" ORDER BY \"Name\" LIMIT 1", &[])
        .unwrap();
    assert_eq!(rows[0].get::<String>("name").unwrap(), "P01");

    db.create_index("Products", &["Name", "Price"], false).unwrap();
    let indexes: Vec<String> = db
        .query_rows("PRAGMA index_list(\"Products\")", &[])
        .unwrap()
        .iter()
        .map(|r| r.get::<String>("name").unwrap())
        .collect();
    assert!(indexes.contains(&"Products_Name_Price".to_string()));
    assert!(indexes.contains(&"Products_CategoryID".to_string()));
}

#[test]
fn test_unsupported_shapes_fail_before_execution() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "unsupported.db");
    let products = db.table::<Product>().unwrap();

    assert!(matches!(
        products.query().then_by(col("Name")).to_list(),
        Err(OrmError::Unsupported(_))
    ));
    assert!(matches!(
        products.filter(col("Nope").eq(1)).to_list(),
        Err(OrmError::Mapping(_))
    ));
    assert!(matches!(
        products.query().take(2).update(&[("Price", val(1.0))]),
        Err(OrmError::Unsupported(_))
    ));
}

#[test]
fn test_async_operations() {
    let (_dir, pool) = temp_pool();
    let db = shop_db(&pool, "async.db");
    let products = db.table::<Product>().unwrap();

    let pending: Vec<_> = (0..6)
        .map(|i| products.insert_async(Product::new(&format!("A{}", i), 1, i as f64)))
        .collect();
    let inserted: Vec<Product> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
    assert!(inserted.iter().all(|p| p.product_id > 0));

    assert_eq!(products.count_async().wait().unwrap(), 6);
    let listed = products
        .query()
        .order_by(col("Price"))
        .to_list_async()
        .wait()
        .unwrap();
    assert_eq!(listed[0].name, "A0");

    let changed = products
        .filter(col("Price").ge(3.0))
        .update_async(vec![("Discontinued".to_string(), val(true))])
        .wait()
        .unwrap();
    assert_eq!(changed, 3);

    let total: f64 = products.query().sum_async(col("Price")).wait().unwrap();
    assert_eq!(total, 15.0);

    let missing = products.get_async(999i64).wait();
    assert!(matches!(missing, Err(OrmError::NotFound(_))));

    let counted = db
        .run_in_transaction_async(|session| session.execute("DELETE FROM \"Products\"", &[]))
        .wait()
        .unwrap();
    assert_eq!(counted, 6);
}

#[test]
fn test_closed_connection_and_reopen() {
    let (_dir, pool) = temp_pool();
    let target = ConnectionTarget::new("close.db");
    let db = shop_db(&pool, "close.db");
    seed_products(&db, 1, 2);

    db.close().unwrap();
    assert!(matches!(db.table::<Product>().unwrap().count(), Err(OrmError::Closed(_))));

    let reopened = pool.database(&target).unwrap();
    assert_eq!(reopened.table::<Product>().unwrap().count().unwrap(), 2);

    pool.forget(&target).unwrap();
    assert!(matches!(reopened.execute("SELECT 1", &[]), Err(OrmError::Closed(_))));
}
