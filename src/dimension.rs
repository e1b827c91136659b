use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use tracing::{debug, info};

use crate::error::WarehouseError;
use crate::staging::StagingRecord;
use crate::store::DimensionStore;

/// Surrogate key of the reserved "Unknown" row present in every dimension.
pub const UNKNOWN_KEY: i32 = -1;

/// Natural key to surrogate key, for every real (non-reserved) row of a dimension.
pub type KeyMap<K> = HashMap<K, i32>;

/// A star-schema dimension keyed by a fixed-arity natural key.
///
/// `Key` equality is the uniqueness rule of the dimension. Optional parts are
/// `Option`s, so two NULLs in the same position compare equal.
pub trait Dimension: Send + Sync + 'static {
    const NAME: &'static str;
    const TABLE: &'static str;

    type Key: Eq + Hash + Clone + Debug + Send + Sync;
    type Member: Clone + Debug + Send + Sync;

    /// Natural key of a staging record, or `None` when a required attribute is missing.
    fn lookup_key(record: &StagingRecord) -> Option<Self::Key>;

    /// Keys made of placeholder values never get a dimension row.
    fn is_sentinel(key: &Self::Key) -> bool;

    fn member_key(member: &Self::Member) -> Self::Key;

    /// Builds the row for `key` from every staging record that carries it.
    fn build_member(key: Self::Key, records: &[&StagingRecord]) -> Self::Member;

    /// Distinct, non-sentinel members in first-seen order.
    fn members(records: &[StagingRecord]) -> Vec<Self::Member> {
        let mut order = Vec::new();
        let mut groups: HashMap<Self::Key, Vec<&StagingRecord>> = HashMap::new();

        for record in records {
            let Some(key) = Self::lookup_key(record) else {
                continue;
            };
            if Self::is_sentinel(&key) {
                continue;
            }
            match groups.entry(key) {
                Entry::Occupied(mut slot) => slot.get_mut().push(record),
                Entry::Vacant(slot) => {
                    order.push(slot.key().clone());
                    slot.insert(vec![record]);
                }
            }
        }

        order
            .into_iter()
            .map(|key| {
                let grouped = groups.remove(&key).unwrap_or_default();
                Self::build_member(key, &grouped)
            })
            .collect()
    }

    /// Surrogate key for a record, falling back to [`UNKNOWN_KEY`] on no match.
    fn resolve(keys: &KeyMap<Self::Key>, record: &StagingRecord) -> i32 {
        Self::lookup_key(record)
            .and_then(|key| keys.get(&key).copied())
            .unwrap_or(UNKNOWN_KEY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionReport {
    pub dimension: &'static str,
    pub candidates: usize,
    pub inserted: usize,
    pub already_present: usize,
}

/// Makes sure every distinct natural key in staging has exactly one dimension row.
///
/// Additive only: existing rows are never updated or deleted, so running it
/// again over the same staging snapshot inserts nothing.
pub struct DimensionResolver<D> {
    _dimension: PhantomData<D>,
}

impl<D: Dimension> Default for DimensionResolver<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dimension> DimensionResolver<D> {
    pub fn new() -> Self {
        Self {
            _dimension: PhantomData,
        }
    }

    pub async fn populate<S>(
        &self,
        store: &S,
        staging: &[StagingRecord],
    ) -> Result<DimensionReport, WarehouseError>
    where
        S: DimensionStore<D> + ?Sized,
    {
        let existing = store.key_map().await?;
        let candidates = D::members(staging);
        let candidate_count = candidates.len();

        let missing: Vec<D::Member> = candidates
            .into_iter()
            .filter(|member| !existing.contains_key(&D::member_key(member)))
            .collect();

        debug!(
            dimension = D::NAME,
            existing = existing.len(),
            missing = missing.len(),
            "Resolved dimension candidates"
        );

        let inserted = if missing.is_empty() {
            0
        } else {
            store.insert_members(&missing).await?
        };

        // Rows that lost a race to a concurrent run are counted as present.
        let report = DimensionReport {
            dimension: D::NAME,
            candidates: candidate_count,
            inserted,
            already_present: candidate_count - inserted,
        };

        info!(
            "Populated {}: {} candidates, {} inserted, {} already present",
            D::TABLE,
            report.candidates,
            report.inserted,
            report.already_present
        );

        Ok(report)
    }
}
