use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::sync::Once;

use sales_warehouse::dimension::{DimensionResolver, KeyMap, UNKNOWN_KEY};
use sales_warehouse::dimensions::{
    LocationDimension, PaymentDimension, PaymentKey, ProductDimension, ProductKey,
    SellerDimension, TimeDimension,
};
use sales_warehouse::fact::FactPopulator;
use sales_warehouse::memory::MemoryDimension;
use sales_warehouse::staging::sentinel;
use sales_warehouse::store::{
    DimensionStore, FactSale, FactStore, SchemaStore, StagingStore,
};
use sales_warehouse::{
    MemoryWarehouse, Phase, Pipeline, StagingRecord, WarehouseError,
};

static INIT: Once = Once::new();

fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

fn loaded_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 8, 30, 0).unwrap()
}

fn day(d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 3, d)
}

fn sale(product: &str, purchase_date: Option<NaiveDate>) -> StagingRecord {
    StagingRecord {
        product_name: product.to_string(),
        category_name: "electronics".to_string(),
        brand_name: None,
        price_cents: 4990,
        shipping_cost_cents: Some(1200),
        purchase_date,
        seller_name: "ana lima".to_string(),
        location_code: "sp".to_string(),
        purchase_rating: Some(4),
        payment_type: "boleto".to_string(),
        installments_quantity: None,
        latitude: Some(-23.55),
        longitude: Some(-46.63),
        loaded_at: loaded_at(),
    }
}

async fn staged(records: &[StagingRecord]) -> MemoryWarehouse {
    let warehouse = MemoryWarehouse::new();
    warehouse.ensure_schema().await.unwrap();
    warehouse.replace_staging(records).await.unwrap();
    warehouse
}

async fn resolve_all_but_seller(warehouse: &MemoryWarehouse, staging: &[StagingRecord]) {
    DimensionResolver::<TimeDimension>::new()
        .populate(warehouse, staging)
        .await
        .unwrap();
    DimensionResolver::<LocationDimension>::new()
        .populate(warehouse, staging)
        .await
        .unwrap();
    DimensionResolver::<ProductDimension>::new()
        .populate(warehouse, staging)
        .await
        .unwrap();
    DimensionResolver::<PaymentDimension>::new()
        .populate(warehouse, staging)
        .await
        .unwrap();
}

#[tokio::test]
async fn populating_twice_leaves_dimensions_unchanged() {
    init_test_logging();

    // Given: a staging table with repeated natural keys
    let staging = vec![
        sale("mouse", day(2)),
        sale("mouse", day(5)),
        sale("keyboard", day(5)),
        StagingRecord {
            seller_name: "bruno souza".to_string(),
            ..sale("monitor", None)
        },
    ];
    let warehouse = staged(&staging).await;
    let pipeline = Pipeline::new(&warehouse);

    // When: the population runs twice
    let first = pipeline.populate().await.unwrap();
    let counts_after_first = dimension_counts(&warehouse).await;
    let second = pipeline.populate().await.unwrap();

    // Then: the second run inserts nothing and row counts stay put
    assert_eq!(first.dimension("product").unwrap().inserted, 3);
    assert_eq!(first.dimension("time").unwrap().inserted, 2);
    assert_eq!(first.dimension("seller").unwrap().inserted, 2);
    for name in ["product", "seller", "location", "time", "payment"] {
        let report = second.dimension(name).unwrap();
        assert_eq!(report.inserted, 0, "{} grew on the second run", name);
        assert_eq!(report.already_present, report.candidates);
    }
    assert_eq!(dimension_counts(&warehouse).await, counts_after_first);

    // And: facts were reloaded, not appended
    assert_eq!(warehouse.count_facts().await.unwrap(), 3);
    assert_eq!(second.fact().unwrap().inserted, 3);
}

#[tokio::test]
async fn null_natural_key_parts_share_one_row() {
    init_test_logging();

    let staging = vec![
        sale("mouse", day(2)),
        StagingRecord {
            price_cents: 3990,
            purchase_rating: None,
            ..sale("mouse", day(2))
        },
    ];
    let warehouse = staged(&staging).await;

    Pipeline::new(&warehouse).populate().await.unwrap();

    let products = warehouse.members::<ProductDimension>().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].1.brand, None);

    let payments = warehouse.members::<PaymentDimension>().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].1.installments, None);

    let facts = warehouse.load_facts().await.unwrap();
    assert_eq!(facts.len(), 2);
    assert!(facts.iter().all(|f| f.product_key == products[0].0));
    assert!(facts.iter().all(|f| f.payment_key == payments[0].0));
}

#[tokio::test]
async fn fact_count_matches_dated_staging_rows() {
    init_test_logging();

    let staging = vec![
        sale("mouse", day(2)),
        sale("mouse", None),
        sale("keyboard", day(3)),
        sale("webcam", None),
        sale("headset", day(3)),
    ];
    let warehouse = staged(&staging).await;

    let report = Pipeline::new(&warehouse).populate().await.unwrap();

    let fact = report.fact().unwrap();
    assert_eq!(fact.eligible, 3);
    assert_eq!(fact.skipped_without_date, 2);
    assert_eq!(warehouse.count_facts().await.unwrap(), 3);

    // Undated rows still feed the other dimensions
    assert_eq!(warehouse.members::<ProductDimension>().unwrap().len(), 4);
    assert_eq!(warehouse.members::<TimeDimension>().unwrap().len(), 2);
}

#[tokio::test]
async fn unresolved_seller_falls_back_until_resolved() {
    init_test_logging();

    // Given: every dimension except sellers has been populated
    let staging = vec![sale("mouse", day(2)), sale("keyboard", day(4))];
    let warehouse = staged(&staging).await;
    resolve_all_but_seller(&warehouse, &staging).await;

    // When: facts are populated
    let report = FactPopulator::new()
        .populate(&warehouse, &staging)
        .await
        .unwrap();

    // Then: the seller reference is the unknown row, and the fact is kept
    assert_eq!(report.inserted, 2);
    assert_eq!(report.unresolved["seller"], 2);
    assert_eq!(report.unresolved["product"], 0);
    let facts = warehouse.load_facts().await.unwrap();
    assert!(facts.iter().all(|f| f.seller_key == UNKNOWN_KEY));

    // When: the seller resolver catches up and facts are reloaded
    DimensionResolver::<SellerDimension>::new()
        .populate(&warehouse, &staging)
        .await
        .unwrap();
    warehouse.truncate_facts().await.unwrap();
    let report = FactPopulator::new()
        .populate(&warehouse, &staging)
        .await
        .unwrap();

    // Then: no fallback is needed any more
    let sellers = warehouse.members::<SellerDimension>().unwrap();
    assert_eq!(sellers.len(), 1);
    assert_eq!(report.unresolved["seller"], 0);
    let facts = warehouse.load_facts().await.unwrap();
    assert!(facts.iter().all(|f| f.seller_key == sellers[0].0));
}

#[tokio::test]
async fn sentinel_values_never_become_dimension_rows() {
    init_test_logging();

    let staging = vec![
        sale(sentinel::PRODUCT_NAME, day(2)),
        StagingRecord {
            category_name: sentinel::CATEGORY.to_string(),
            ..sale("cable", day(2))
        },
        StagingRecord {
            seller_name: sentinel::SELLER.to_string(),
            location_code: sentinel::LOCATION.to_string(),
            payment_type: sentinel::PAYMENT_TYPE.to_string(),
            ..sale("mouse", day(2))
        },
    ];
    let warehouse = staged(&staging).await;

    let report = Pipeline::new(&warehouse).populate().await.unwrap();

    let products = warehouse.members::<ProductDimension>().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].1.name, "mouse");
    assert!(products
        .iter()
        .all(|(_, p)| p.name != sentinel::PRODUCT_NAME));

    let fact = report.fact().unwrap();
    assert_eq!(fact.inserted, 3);
    assert_eq!(fact.unresolved["product"], 2);
    assert_eq!(fact.unresolved["seller"], 1);
    assert_eq!(fact.unresolved["location"], 1);
    assert_eq!(fact.unresolved["payment"], 1);
    assert_eq!(fact.unresolved["time"], 0);

    // The reserved row is counted but never listed as a member
    assert_eq!(
        DimensionStore::<SellerDimension>::count(&warehouse)
            .await
            .unwrap(),
        warehouse.members::<SellerDimension>().unwrap().len() + 1
    );
}

#[tokio::test]
async fn same_product_on_two_dates_shares_its_key() {
    init_test_logging();

    let raw = vec![
        json!({
            "Produto": "Mouse",
            "Categoria do Produto": "Electronics",
            "Preço": 49.9,
            "Data da Compra": "02/03/2024",
            "Vendedor": "Ana Lima",
            "Local da compra": "SP",
            "Tipo de pagamento": "boleto"
        }),
        json!({
            "Produto": "Mouse",
            "Categoria do Produto": "Electronics",
            "Preço": "52.10",
            "Data da Compra": "05/03/2024",
            "Vendedor": "Ana Lima",
            "Local da compra": "SP",
            "Tipo de pagamento": "boleto"
        }),
    ];
    let warehouse = MemoryWarehouse::new();
    let pipeline = Pipeline::new(&warehouse);

    let staged = pipeline.load_staging(&raw).await.unwrap();
    assert_eq!(staged.phases.len(), 3);
    pipeline.populate().await.unwrap();

    let facts = warehouse.load_facts().await.unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].product_key, facts[1].product_key);
    assert_ne!(facts[0].product_key, UNKNOWN_KEY);
    assert_ne!(facts[0].time_key, facts[1].time_key);
    assert_eq!(
        facts.iter().map(|f| f.price_cents).collect::<Vec<_>>(),
        vec![4990, 5210]
    );

    let dates: Vec<NaiveDate> = warehouse
        .members::<TimeDimension>()
        .unwrap()
        .into_iter()
        .map(|(_, member)| member.date)
        .collect();
    assert_eq!(dates, vec![day(2).unwrap(), day(5).unwrap()]);
}

#[tokio::test]
async fn ensuring_the_schema_twice_keeps_data() {
    init_test_logging();

    let warehouse = staged(&[sale("mouse", day(2))]).await;
    Pipeline::new(&warehouse).populate().await.unwrap();

    warehouse.ensure_schema().await.unwrap();

    assert_eq!(warehouse.load_staging().await.unwrap().len(), 1);
    assert_eq!(warehouse.members::<ProductDimension>().unwrap().len(), 1);
    assert_eq!(warehouse.count_facts().await.unwrap(), 1);
}

#[tokio::test]
async fn stores_refuse_work_before_the_schema_exists() {
    let warehouse = MemoryWarehouse::new();

    assert!(matches!(
        warehouse.load_staging().await,
        Err(WarehouseError::InvalidInput { .. })
    ));
    assert!(warehouse.insert_facts(&[]).await.is_err());
}

#[tokio::test]
async fn facts_cannot_reference_missing_dimension_rows() {
    let warehouse = staged(&[]).await;

    let dangling = FactSale {
        product_key: 7,
        seller_key: UNKNOWN_KEY,
        location_key: UNKNOWN_KEY,
        time_key: UNKNOWN_KEY,
        payment_key: UNKNOWN_KEY,
        price_cents: 100,
        shipping_cost_cents: None,
        purchase_rating: None,
        loaded_at: loaded_at(),
    };

    let err = warehouse.insert_facts(&[dangling]).await.unwrap_err();
    assert!(err.to_string().contains("dim_product"));
    assert_eq!(warehouse.count_facts().await.unwrap(), 0);
}

#[tokio::test]
async fn cleansing_nothing_fails_the_transform_phase() {
    init_test_logging();

    let warehouse = MemoryWarehouse::new();
    let raw = vec![json!({ "Produto": "mouse" })];

    let err = Pipeline::new(&warehouse)
        .load_staging(&raw)
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::Transform);
}

#[tokio::test]
async fn replacing_facts_is_all_or_nothing() {
    init_test_logging();

    // Given: a populated warehouse with one fact row
    let warehouse = staged(&[sale("mouse", day(2))]).await;
    Pipeline::new(&warehouse).populate().await.unwrap();
    let before = warehouse.load_facts().await.unwrap();
    assert_eq!(before.len(), 1);

    // When: a replacement mixes a valid row with a dangling one
    let dangling = FactSale {
        product_key: 999,
        ..before[0].clone()
    };
    let result = warehouse
        .replace_facts(&[before[0].clone(), before[0].clone(), dangling])
        .await;

    // Then: it fails and the previous rows are untouched
    assert!(result.is_err());
    assert_eq!(warehouse.load_facts().await.unwrap(), before);
}

#[tokio::test]
async fn conflicting_members_count_as_already_present() {
    init_test_logging();

    let warehouse = staged(&[]).await;
    let product = ProductKey {
        name: "mouse".to_string(),
        category: "electronics".to_string(),
        brand: None,
    };
    let payment = PaymentKey {
        payment_type: "boleto".to_string(),
        installments: None,
    };

    // A concurrent run inserting the same natural key is skipped, not an error
    let first = DimensionStore::<ProductDimension>::insert_members(&warehouse, &[product.clone()])
        .await
        .unwrap();
    let second = DimensionStore::<ProductDimension>::insert_members(&warehouse, &[product])
        .await
        .unwrap();
    assert_eq!((first, second), (1, 0));

    let first = DimensionStore::<PaymentDimension>::insert_members(&warehouse, &[payment.clone()])
        .await
        .unwrap();
    let second = DimensionStore::<PaymentDimension>::insert_members(&warehouse, &[payment])
        .await
        .unwrap();
    assert_eq!((first, second), (1, 0));

    assert_eq!(warehouse.members::<ProductDimension>().unwrap().len(), 1);
    assert_eq!(warehouse.members::<PaymentDimension>().unwrap().len(), 1);
}

#[derive(Clone, Copy, PartialEq)]
enum Outage {
    LocationInserts,
    FactReferences,
}

/// Delegates to a [`MemoryWarehouse`] but breaks one kind of write.
struct FlakyWarehouse {
    inner: MemoryWarehouse,
    outage: Outage,
}

#[async_trait]
impl SchemaStore for FlakyWarehouse {
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        self.inner.ensure_schema().await
    }
}

#[async_trait]
impl StagingStore for FlakyWarehouse {
    async fn load_staging(&self) -> Result<Vec<StagingRecord>, WarehouseError> {
        self.inner.load_staging().await
    }

    async fn replace_staging(&self, records: &[StagingRecord]) -> Result<usize, WarehouseError> {
        self.inner.replace_staging(records).await
    }
}

#[async_trait]
impl<D: MemoryDimension> DimensionStore<D> for FlakyWarehouse {
    async fn key_map(&self) -> Result<KeyMap<D::Key>, WarehouseError> {
        DimensionStore::<D>::key_map(&self.inner).await
    }

    async fn insert_members(&self, members: &[D::Member]) -> Result<usize, WarehouseError> {
        if self.outage == Outage::LocationInserts && D::NAME == "location" {
            return Err(WarehouseError::ConnectionError {
                message: "connection reset by peer".to_string(),
            });
        }
        DimensionStore::<D>::insert_members(&self.inner, members).await
    }

    async fn count(&self) -> Result<usize, WarehouseError> {
        DimensionStore::<D>::count(&self.inner).await
    }
}

#[async_trait]
impl FactStore for FlakyWarehouse {
    async fn truncate_facts(&self) -> Result<(), WarehouseError> {
        self.inner.truncate_facts().await
    }

    async fn replace_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError> {
        if self.outage == Outage::FactReferences {
            let broken: Vec<FactSale> = facts
                .iter()
                .map(|fact| FactSale {
                    product_key: 999,
                    ..fact.clone()
                })
                .collect();
            return self.inner.replace_facts(&broken).await;
        }
        self.inner.replace_facts(facts).await
    }

    async fn insert_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError> {
        self.inner.insert_facts(facts).await
    }

    async fn load_facts(&self) -> Result<Vec<FactSale>, WarehouseError> {
        self.inner.load_facts().await
    }

    async fn count_facts(&self) -> Result<usize, WarehouseError> {
        self.inner.count_facts().await
    }
}

#[tokio::test]
async fn failing_dimension_halts_the_remaining_phases() {
    init_test_logging();

    // Given: a warehouse whose location inserts fail
    let warehouse = FlakyWarehouse {
        inner: staged(&[sale("mouse", day(2))]).await,
        outage: Outage::LocationInserts,
    };

    // When: the population runs
    let err = Pipeline::new(&warehouse).populate().await.unwrap_err();

    // Then: the failure names the phase and its cause
    assert_eq!(err.phase, Phase::Dimension("location"));
    assert!(matches!(err.source, WarehouseError::ConnectionError { .. }));
    assert!(err.to_string().contains("dimension:location"));

    // And: earlier phases committed, later ones never ran
    assert_eq!(warehouse.inner.members::<TimeDimension>().unwrap().len(), 1);
    assert!(warehouse.inner.members::<SellerDimension>().unwrap().is_empty());
    assert!(warehouse.inner.members::<ProductDimension>().unwrap().is_empty());
    assert_eq!(warehouse.inner.count_facts().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_fact_phase_keeps_the_previous_facts() {
    init_test_logging();

    // Given: a first run that loaded one fact row
    let inner = staged(&[sale("mouse", day(2))]).await;
    Pipeline::new(&inner).populate().await.unwrap();
    let before = inner.load_facts().await.unwrap();
    assert_eq!(before.len(), 1);

    // When: a second run over new staging fails while writing facts
    inner
        .replace_staging(&[sale("mouse", day(2)), sale("keyboard", day(3))])
        .await
        .unwrap();
    let warehouse = FlakyWarehouse {
        inner,
        outage: Outage::FactReferences,
    };
    let err = Pipeline::new(&warehouse).populate().await.unwrap_err();

    // Then: the fact phase is reported and the first run's facts survive
    assert_eq!(err.phase, Phase::Fact);
    assert_eq!(warehouse.inner.load_facts().await.unwrap(), before);
}

async fn dimension_counts(warehouse: &MemoryWarehouse) -> [usize; 5] {
    [
        DimensionStore::<ProductDimension>::count(warehouse).await.unwrap(),
        DimensionStore::<SellerDimension>::count(warehouse).await.unwrap(),
        DimensionStore::<LocationDimension>::count(warehouse).await.unwrap(),
        DimensionStore::<TimeDimension>::count(warehouse).await.unwrap(),
        DimensionStore::<PaymentDimension>::count(warehouse).await.unwrap(),
    ]
}
