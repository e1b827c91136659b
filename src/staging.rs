use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder values the cleansing stage writes when a field was not provided.
pub mod sentinel {
    pub const PRODUCT_NAME: &str = "unavailable name";
    pub const CATEGORY: &str = "other";
    pub const SELLER: &str = "unknown seller";
    pub const LOCATION: &str = "n/a";
    pub const PAYMENT_TYPE: &str = "unspecified";
}

/// One cleansed sale observation as it sits in the staging table.
///
/// Money is kept in integer cents end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub product_name: String,
    pub category_name: String,
    pub brand_name: Option<String>,
    pub price_cents: i64,
    pub shipping_cost_cents: Option<i64>,
    pub purchase_date: Option<NaiveDate>,
    pub seller_name: String,
    pub location_code: String,
    pub purchase_rating: Option<i32>,
    pub payment_type: String,
    pub installments_quantity: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub loaded_at: DateTime<Utc>,
}

impl StagingRecord {
    pub fn has_purchase_date(&self) -> bool {
        self.purchase_date.is_some()
    }
}
