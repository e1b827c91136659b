use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dimension::{Dimension, KeyMap};
use crate::dimensions::{
    LocationDimension, PaymentDimension, ProductDimension, SellerDimension, TimeDimension,
};
use crate::error::WarehouseError;
use crate::staging::StagingRecord;

/// A fact row ready for insertion; its own surrogate key is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactSale {
    pub product_key: i32,
    pub seller_key: i32,
    pub location_key: i32,
    pub time_key: i32,
    pub payment_key: i32,
    pub price_cents: i64,
    pub shipping_cost_cents: Option<i64>,
    pub purchase_rating: Option<i32>,
    pub loaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Creates every table, constraint, index and reserved unknown row that is missing.
    async fn ensure_schema(&self) -> Result<(), WarehouseError>;
}

#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn load_staging(&self) -> Result<Vec<StagingRecord>, WarehouseError>;

    /// Truncates staging and bulk-inserts `records` as one unit.
    async fn replace_staging(&self, records: &[StagingRecord]) -> Result<usize, WarehouseError>;
}

#[async_trait]
pub trait DimensionStore<D: Dimension>: Send + Sync {
    /// Natural key to surrogate key for every row except the reserved unknown one.
    async fn key_map(&self) -> Result<KeyMap<D::Key>, WarehouseError>;

    /// Inserts `members` atomically. Members whose natural key already exists
    /// are skipped, not reported. Returns how many rows were really added.
    async fn insert_members(&self, members: &[D::Member]) -> Result<usize, WarehouseError>;

    /// Row count, including the reserved unknown row.
    async fn count(&self) -> Result<usize, WarehouseError>;
}

#[async_trait]
pub trait FactStore: Send + Sync {
    async fn truncate_facts(&self) -> Result<(), WarehouseError>;

    /// Swaps the whole fact table for `facts` as one unit. On failure the
    /// previous rows stay in place.
    async fn replace_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError>;

    async fn insert_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError>;

    async fn load_facts(&self) -> Result<Vec<FactSale>, WarehouseError>;

    async fn count_facts(&self) -> Result<usize, WarehouseError>;
}

/// Everything the pipeline needs from a warehouse backend.
pub trait Warehouse:
    SchemaStore
    + StagingStore
    + FactStore
    + DimensionStore<ProductDimension>
    + DimensionStore<SellerDimension>
    + DimensionStore<LocationDimension>
    + DimensionStore<TimeDimension>
    + DimensionStore<PaymentDimension>
{
}

impl<T> Warehouse for T where
    T: SchemaStore
        + StagingStore
        + FactStore
        + DimensionStore<ProductDimension>
        + DimensionStore<SellerDimension>
        + DimensionStore<LocationDimension>
        + DimensionStore<TimeDimension>
        + DimensionStore<PaymentDimension>
{
}
