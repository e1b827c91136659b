use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::dimension::{Dimension, DimensionReport, DimensionResolver};
use crate::dimensions::{
    LocationDimension, PaymentDimension, ProductDimension, SellerDimension, TimeDimension,
};
use crate::error::{PhaseError, WarehouseError};
use crate::extract::{ApiExtractor, RawLanding};
use crate::fact::{FactPopulator, FactReport};
use crate::store::{DimensionStore, Warehouse};
use crate::transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extract,
    Land,
    Transform,
    Schema,
    Staging,
    Dimension(&'static str),
    Fact,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Extract => write!(f, "extract"),
            Phase::Land => write!(f, "land"),
            Phase::Transform => write!(f, "transform"),
            Phase::Schema => write!(f, "schema"),
            Phase::Staging => write!(f, "staging"),
            Phase::Dimension(name) => write!(f, "dimension:{}", name),
            Phase::Fact => write!(f, "fact"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseDetail {
    Extracted { records: usize },
    Landed { path: PathBuf },
    Cleansed { staged: usize, dropped: usize },
    SchemaReady,
    Staged { rows: usize },
    Dimension(DimensionReport),
    Fact(FactReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub detail: PhaseDetail,
}

/// Success half of the orchestrator signal: every phase that completed, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub phases: Vec<PhaseReport>,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phases: Vec::new(),
        }
    }

    fn record(&mut self, phase: Phase, detail: PhaseDetail) {
        info!("Phase {} completed", phase);
        self.phases.push(PhaseReport { phase, detail });
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionReport> {
        self.phases.iter().find_map(|p| match &p.detail {
            PhaseDetail::Dimension(report) if report.dimension == name => Some(report),
            _ => None,
        })
    }

    pub fn fact(&self) -> Option<&FactReport> {
        self.phases.iter().find_map(|p| match &p.detail {
            PhaseDetail::Fact(report) => Some(report),
            _ => None,
        })
    }
}

fn failed(phase: Phase) -> impl FnOnce(WarehouseError) -> PhaseError {
    move |source| {
        error!("Phase {} failed: {}", phase, source);
        PhaseError::new(phase, source)
    }
}

/// Sequences the warehouse phases. The five dimension phases all finish
/// before the fact phase starts; the first failure halts the run.
pub struct Pipeline<'a, W: ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> Pipeline<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Schema, then every dimension, then facts, from the staging rows already stored.
    pub async fn populate(&self) -> Result<PipelineReport, PhaseError> {
        let mut report = PipelineReport::new();
        let span = info_span!("populate", run_id = %report.run_id);

        async move {
            self.schema_phase(&mut report).await?;
            self.population_phases(&mut report).await?;
            Ok::<_, PhaseError>(report)
        }
        .instrument(span)
        .await
    }

    /// Cleanses `raw` and replaces the staging table with the result.
    pub async fn load_staging(&self, raw: &[Value]) -> Result<PipelineReport, PhaseError> {
        let mut report = PipelineReport::new();
        let span = info_span!("load_staging", run_id = %report.run_id);

        async move {
            self.staging_phases(raw, &mut report).await?;
            Ok::<_, PhaseError>(report)
        }
        .instrument(span)
        .await
    }

    /// The whole chain: extract, land, cleanse, stage and populate.
    pub async fn run(
        &self,
        extractor: &ApiExtractor,
        landing: &RawLanding,
    ) -> Result<PipelineReport, PhaseError> {
        let mut report = PipelineReport::new();
        let span = info_span!("run", run_id = %report.run_id);

        async move {
            let raw = extractor.extract().await.map_err(failed(Phase::Extract))?;
            report.record(
                Phase::Extract,
                PhaseDetail::Extracted {
                    records: raw.len(),
                },
            );

            landing.store(&raw).await.map_err(failed(Phase::Land))?;
            report.record(
                Phase::Land,
                PhaseDetail::Landed {
                    path: landing.path().to_path_buf(),
                },
            );

            self.staging_phases(&raw, &mut report).await?;
            self.population_phases(&mut report).await?;
            Ok::<_, PhaseError>(report)
        }
        .instrument(span)
        .await
    }

    async fn schema_phase(&self, report: &mut PipelineReport) -> Result<(), PhaseError> {
        info!("Ensuring warehouse schema");
        self.warehouse
            .ensure_schema()
            .await
            .map_err(failed(Phase::Schema))?;
        report.record(Phase::Schema, PhaseDetail::SchemaReady);
        Ok(())
    }

    async fn staging_phases(
        &self,
        raw: &[Value],
        report: &mut PipelineReport,
    ) -> Result<(), PhaseError> {
        let records = transform::cleanse(raw, Utc::now());
        if records.is_empty() {
            return Err(failed(Phase::Transform)(WarehouseError::InvalidInput {
                message: format!("none of the {} raw records could be cleansed", raw.len()),
            }));
        }
        report.record(
            Phase::Transform,
            PhaseDetail::Cleansed {
                staged: records.len(),
                dropped: raw.len() - records.len(),
            },
        );

        self.schema_phase(report).await?;

        let rows = self
            .warehouse
            .replace_staging(&records)
            .await
            .map_err(failed(Phase::Staging))?;
        report.record(Phase::Staging, PhaseDetail::Staged { rows });
        Ok(())
    }

    async fn population_phases(&self, report: &mut PipelineReport) -> Result<(), PhaseError> {
        self.dimension_phase::<TimeDimension>(report).await?;
        self.dimension_phase::<LocationDimension>(report).await?;
        self.dimension_phase::<SellerDimension>(report).await?;
        self.dimension_phase::<ProductDimension>(report).await?;
        self.dimension_phase::<PaymentDimension>(report).await?;

        self.fact_phase(report).await
    }

    async fn dimension_phase<D>(&self, report: &mut PipelineReport) -> Result<(), PhaseError>
    where
        D: Dimension,
        W: DimensionStore<D>,
    {
        let phase = Phase::Dimension(D::NAME);
        let staging = self
            .warehouse
            .load_staging()
            .await
            .map_err(failed(phase))?;

        let result = DimensionResolver::<D>::new()
            .populate(self.warehouse, &staging)
            .await
            .map_err(failed(phase))?;

        report.record(phase, PhaseDetail::Dimension(result));
        Ok(())
    }

    async fn fact_phase(&self, report: &mut PipelineReport) -> Result<(), PhaseError> {
        let staging = self
            .warehouse
            .load_staging()
            .await
            .map_err(failed(Phase::Fact))?;

        let result = FactPopulator::new()
            .replace(self.warehouse, &staging)
            .await
            .map_err(failed(Phase::Fact))?;

        report.record(Phase::Fact, PhaseDetail::Fact(result));
        Ok(())
    }
}
