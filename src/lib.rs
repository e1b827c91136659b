pub mod config;
pub mod database;
pub mod dimension;
pub mod dimensions;
pub mod error;
pub mod extract;
pub mod fact;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod staging;
pub mod store;
pub mod transform;

pub use config::WarehouseConfig;
pub use database::PgWarehouse;
pub use error::{PhaseError, WarehouseError};
pub use memory::MemoryWarehouse;
pub use pipeline::{Phase, Pipeline, PipelineReport};
pub use staging::StagingRecord;
