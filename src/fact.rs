use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::dimension::{Dimension, KeyMap, UNKNOWN_KEY};
use crate::dimensions::{
    LocationDimension, PaymentDimension, ProductDimension, SellerDimension, TimeDimension,
};
use crate::error::WarehouseError;
use crate::staging::StagingRecord;
use crate::store::{DimensionStore, FactSale, FactStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactReport {
    pub eligible: usize,
    pub skipped_without_date: usize,
    pub inserted: usize,
    /// Per dimension, how many fact rows fell back to the unknown key.
    pub unresolved: BTreeMap<&'static str, usize>,
}

/// Surrogate key lookups for all five dimensions, taken once per run.
pub struct ResolvedKeys {
    product: KeyMap<<ProductDimension as Dimension>::Key>,
    seller: KeyMap<<SellerDimension as Dimension>::Key>,
    location: KeyMap<<LocationDimension as Dimension>::Key>,
    time: KeyMap<<TimeDimension as Dimension>::Key>,
    payment: KeyMap<<PaymentDimension as Dimension>::Key>,
}

impl ResolvedKeys {
    pub async fn load<S>(store: &S) -> Result<Self, WarehouseError>
    where
        S: DimensionStore<ProductDimension>
            + DimensionStore<SellerDimension>
            + DimensionStore<LocationDimension>
            + DimensionStore<TimeDimension>
            + DimensionStore<PaymentDimension>
            + ?Sized,
    {
        Ok(Self {
            product: DimensionStore::<ProductDimension>::key_map(store).await?,
            seller: DimensionStore::<SellerDimension>::key_map(store).await?,
            location: DimensionStore::<LocationDimension>::key_map(store).await?,
            time: DimensionStore::<TimeDimension>::key_map(store).await?,
            payment: DimensionStore::<PaymentDimension>::key_map(store).await?,
        })
    }

    /// `None` when the record has no purchase date and so cannot become a fact.
    pub fn fact_for(&self, record: &StagingRecord) -> Option<FactSale> {
        if !record.has_purchase_date() {
            return None;
        }

        Some(FactSale {
            product_key: ProductDimension::resolve(&self.product, record),
            seller_key: SellerDimension::resolve(&self.seller, record),
            location_key: LocationDimension::resolve(&self.location, record),
            time_key: TimeDimension::resolve(&self.time, record),
            payment_key: PaymentDimension::resolve(&self.payment, record),
            price_cents: record.price_cents,
            shipping_cost_cents: record.shipping_cost_cents,
            purchase_rating: record.purchase_rating,
            loaded_at: record.loaded_at,
        })
    }
}

/// Emits one fact row per dated staging record.
///
/// Expects every dimension to be populated for the current staging snapshot. It
/// never deduplicates against earlier fact rows and never writes to a dimension:
/// `populate` appends to a freshly truncated table, `replace` swaps the whole
/// table in one transaction.
#[derive(Default)]
pub struct FactPopulator;

impl FactPopulator {
    pub fn new() -> Self {
        Self
    }

    pub async fn populate<S>(
        &self,
        store: &S,
        staging: &[StagingRecord],
    ) -> Result<FactReport, WarehouseError>
    where
        S: FactStore
            + DimensionStore<ProductDimension>
            + DimensionStore<SellerDimension>
            + DimensionStore<LocationDimension>
            + DimensionStore<TimeDimension>
            + DimensionStore<PaymentDimension>
            + ?Sized,
    {
        let (facts, mut report) = Self::plan(store, staging).await?;
        report.inserted = if facts.is_empty() {
            0
        } else {
            store.insert_facts(&facts).await?
        };
        Self::log(&report);
        Ok(report)
    }

    /// Like [`FactPopulator::populate`], but replaces every existing fact row atomically.
    pub async fn replace<S>(
        &self,
        store: &S,
        staging: &[StagingRecord],
    ) -> Result<FactReport, WarehouseError>
    where
        S: FactStore
            + DimensionStore<ProductDimension>
            + DimensionStore<SellerDimension>
            + DimensionStore<LocationDimension>
            + DimensionStore<TimeDimension>
            + DimensionStore<PaymentDimension>
            + ?Sized,
    {
        let (facts, mut report) = Self::plan(store, staging).await?;
        report.inserted = store.replace_facts(&facts).await?;
        Self::log(&report);
        Ok(report)
    }

    async fn plan<S>(
        store: &S,
        staging: &[StagingRecord],
    ) -> Result<(Vec<FactSale>, FactReport), WarehouseError>
    where
        S: DimensionStore<ProductDimension>
            + DimensionStore<SellerDimension>
            + DimensionStore<LocationDimension>
            + DimensionStore<TimeDimension>
            + DimensionStore<PaymentDimension>
            + ?Sized,
    {
        let keys = ResolvedKeys::load(store).await?;

        let facts: Vec<FactSale> = staging.iter().filter_map(|r| keys.fact_for(r)).collect();
        let unresolved = count_unresolved(&facts);

        for (dimension, count) in unresolved.iter().filter(|(_, count)| **count > 0) {
            warn!(
                "{} fact rows have no matching {} row and use the unknown key",
                count, dimension
            );
        }

        let report = FactReport {
            eligible: facts.len(),
            skipped_without_date: staging.len() - facts.len(),
            inserted: 0,
            unresolved,
        };
        Ok((facts, report))
    }

    fn log(report: &FactReport) {
        info!(
            "Populated fact_sales: {} inserted, {} staging rows skipped without purchase date",
            report.inserted, report.skipped_without_date
        );
    }
}

fn count_unresolved(facts: &[FactSale]) -> BTreeMap<&'static str, usize> {
    BTreeMap::from([
        (ProductDimension::NAME, unknown_count(facts, |f| f.product_key)),
        (SellerDimension::NAME, unknown_count(facts, |f| f.seller_key)),
        (LocationDimension::NAME, unknown_count(facts, |f| f.location_key)),
        (TimeDimension::NAME, unknown_count(facts, |f| f.time_key)),
        (PaymentDimension::NAME, unknown_count(facts, |f| f.payment_key)),
    ])
}

fn unknown_count(facts: &[FactSale], key: impl Fn(&FactSale) -> i32) -> usize {
    facts.iter().filter(|f| key(f) == UNKNOWN_KEY).count()
}
