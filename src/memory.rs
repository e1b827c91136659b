use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::dimension::{Dimension, KeyMap, UNKNOWN_KEY};
use crate::dimensions::{
    LocationDimension, LocationMember, PaymentDimension, PaymentKey, ProductDimension,
    ProductKey, SellerDimension, SellerKey, TimeDimension, TimeMember,
};
use crate::error::WarehouseError;
use crate::staging::StagingRecord;
use crate::store::{DimensionStore, FactSale, FactStore, SchemaStore, StagingStore};

/// One in-memory dimension table. Surrogate keys count up from 1; the reserved
/// unknown row exists once the schema has been ensured.
#[derive(Debug)]
pub struct MemoryTable<M> {
    rows: Vec<(i32, M)>,
    next_key: i32,
}

impl<M> Default for MemoryTable<M> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_key: 1,
        }
    }
}

impl<M> MemoryTable<M> {
    fn contains_key(&self, key: i32) -> bool {
        key == UNKNOWN_KEY || self.rows.iter().any(|(k, _)| *k == key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryState {
    schema_ready: bool,
    staging: Vec<StagingRecord>,
    product: MemoryTable<ProductKey>,
    seller: MemoryTable<SellerKey>,
    location: MemoryTable<LocationMember>,
    time: MemoryTable<TimeMember>,
    payment: MemoryTable<PaymentKey>,
    facts: Vec<(i64, FactSale)>,
    next_fact_key: i64,
}

impl MemoryState {
    /// Fails on the first fact whose dimension reference has no row, like a
    /// foreign key would.
    fn check_references(&self, facts: &[FactSale]) -> Result<(), WarehouseError> {
        for fact in facts {
            let references = [
                ("dim_product", self.product.contains_key(fact.product_key)),
                ("dim_seller", self.seller.contains_key(fact.seller_key)),
                ("dim_location", self.location.contains_key(fact.location_key)),
                ("dim_time", self.time.contains_key(fact.time_key)),
                ("dim_payment", self.payment.contains_key(fact.payment_key)),
            ];
            if let Some((table, _)) = references.iter().find(|(_, present)| !present) {
                return Err(WarehouseError::InvalidInput {
                    message: format!("fact_sales references a missing {} row", table),
                });
            }
        }
        Ok(())
    }

    fn append_facts(&mut self, facts: &[FactSale]) {
        for fact in facts {
            self.facts.push((self.next_fact_key, fact.clone()));
            self.next_fact_key += 1;
        }
    }
}

/// Maps a dimension to its table inside [`MemoryState`].
pub trait MemoryDimension: Dimension {
    fn table(state: &mut MemoryState) -> &mut MemoryTable<Self::Member>;
}

impl MemoryDimension for ProductDimension {
    fn table(state: &mut MemoryState) -> &mut MemoryTable<ProductKey> {
        &mut state.product
    }
}

impl MemoryDimension for SellerDimension {
    fn table(state: &mut MemoryState) -> &mut MemoryTable<SellerKey> {
        &mut state.seller
    }
}

impl MemoryDimension for LocationDimension {
    fn table(state: &mut MemoryState) -> &mut MemoryTable<LocationMember> {
        &mut state.location
    }
}

impl MemoryDimension for TimeDimension {
    fn table(state: &mut MemoryState) -> &mut MemoryTable<TimeMember> {
        &mut state.time
    }
}

impl MemoryDimension for PaymentDimension {
    fn table(state: &mut MemoryState) -> &mut MemoryTable<PaymentKey> {
        &mut state.payment
    }
}

/// Process-local warehouse with the same semantics as the PostgreSQL one.
/// Backs `--dry-run` and the test suite.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<MemoryState>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, WarehouseError> {
        self.state.lock().map_err(|e| WarehouseError::InternalError {
            message: format!("Memory warehouse lock poisoned: {}", e),
        })
    }

    fn lock_ready(&self) -> Result<MutexGuard<'_, MemoryState>, WarehouseError> {
        let state = self.lock()?;
        if !state.schema_ready {
            return Err(WarehouseError::InvalidInput {
                message: "warehouse schema has not been created".to_string(),
            });
        }
        Ok(state)
    }

    /// Real rows of a dimension with their surrogate keys, in insertion order.
    pub fn members<D: MemoryDimension>(&self) -> Result<Vec<(i32, D::Member)>, WarehouseError> {
        let mut state = self.lock_ready()?;
        Ok(D::table(&mut state).rows.clone())
    }
}

#[async_trait]
impl SchemaStore for MemoryWarehouse {
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        let mut state = self.lock()?;
        if !state.schema_ready {
            state.schema_ready = true;
            state.next_fact_key = 1;
            debug!("Created in-memory warehouse schema");
        }
        Ok(())
    }
}

#[async_trait]
impl StagingStore for MemoryWarehouse {
    async fn load_staging(&self) -> Result<Vec<StagingRecord>, WarehouseError> {
        Ok(self.lock_ready()?.staging.clone())
    }

    async fn replace_staging(&self, records: &[StagingRecord]) -> Result<usize, WarehouseError> {
        let mut state = self.lock_ready()?;
        state.staging = records.to_vec();
        Ok(records.len())
    }
}

#[async_trait]
impl<D: MemoryDimension> DimensionStore<D> for MemoryWarehouse {
    async fn key_map(&self) -> Result<KeyMap<D::Key>, WarehouseError> {
        let mut state = self.lock_ready()?;
        Ok(D::table(&mut state)
            .rows
            .iter()
            .map(|(key, member)| (D::member_key(member), *key))
            .collect())
    }

    async fn insert_members(&self, members: &[D::Member]) -> Result<usize, WarehouseError> {
        let mut state = self.lock_ready()?;
        let table = D::table(&mut state);

        let mut inserted = 0;
        for member in members {
            let natural_key = D::member_key(member);
            if table
                .rows
                .iter()
                .any(|(_, existing)| D::member_key(existing) == natural_key)
            {
                continue;
            }
            let key = table.next_key;
            table.next_key += 1;
            table.rows.push((key, member.clone()));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn count(&self) -> Result<usize, WarehouseError> {
        let mut state = self.lock_ready()?;
        Ok(D::table(&mut state).rows.len() + 1)
    }
}

#[async_trait]
impl FactStore for MemoryWarehouse {
    async fn truncate_facts(&self) -> Result<(), WarehouseError> {
        let mut state = self.lock_ready()?;
        state.facts.clear();
        state.next_fact_key = 1;
        Ok(())
    }

    async fn replace_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError> {
        let mut state = self.lock_ready()?;
        state.check_references(facts)?;

        state.facts.clear();
        state.next_fact_key = 1;
        state.append_facts(facts);
        Ok(facts.len())
    }

    async fn insert_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError> {
        let mut state = self.lock_ready()?;
        state.check_references(facts)?;

        state.append_facts(facts);
        Ok(facts.len())
    }

    async fn load_facts(&self) -> Result<Vec<FactSale>, WarehouseError> {
        Ok(self
            .lock_ready()?
            .facts
            .iter()
            .map(|(_, fact)| fact.clone())
            .collect())
    }

    async fn count_facts(&self) -> Result<usize, WarehouseError> {
        Ok(self.lock_ready()?.facts.len())
    }
}
