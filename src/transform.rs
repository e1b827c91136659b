//! Cleansing of raw API sale objects into staging records.
//!
//! Text is trimmed and lower-cased, money becomes integer cents, the purchase
//! date is read as `dd/mm/yyyy`, and missing mandatory text falls back to the
//! sentinel placeholders the dimensions know how to exclude.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::staging::{sentinel, StagingRecord};

const DATE_FORMAT: &str = "%d/%m/%Y";

/// A sale object as delivered by the upstream API. Every field is loosely typed
/// because the feed mixes numbers and strings.
#[derive(Debug, Default, Deserialize)]
pub struct RawSale {
    #[serde(rename = "Produto")]
    pub product: Option<Value>,
    #[serde(rename = "Categoria do Produto")]
    pub category: Option<Value>,
    #[serde(rename = "Marca")]
    pub brand: Option<Value>,
    #[serde(rename = "Preço")]
    pub price: Option<Value>,
    #[serde(rename = "Frete")]
    pub shipping: Option<Value>,
    #[serde(rename = "Data da Compra")]
    pub purchase_date: Option<Value>,
    #[serde(rename = "Vendedor")]
    pub seller: Option<Value>,
    #[serde(rename = "Local da compra")]
    pub location: Option<Value>,
    #[serde(rename = "Avaliação da compra")]
    pub rating: Option<Value>,
    #[serde(rename = "Tipo de pagamento")]
    pub payment_type: Option<Value>,
    #[serde(rename = "Quantidade de parcelas")]
    pub installments: Option<Value>,
    #[serde(rename = "lat")]
    pub latitude: Option<Value>,
    #[serde(rename = "lon")]
    pub longitude: Option<Value>,
}

/// Cleanses a whole extraction. Every produced record carries `loaded_at`.
///
/// Objects that are not sales, or whose price cannot be read, are dropped.
pub fn cleanse(raw: &[Value], loaded_at: DateTime<Utc>) -> Vec<StagingRecord> {
    info!("Cleansing {} raw records", raw.len());

    let records: Vec<StagingRecord> = raw
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let sale = match RawSale::deserialize(value) {
                Ok(sale) => sale,
                Err(e) => {
                    warn!("Skipping raw record #{}: not a sale object ({})", index, e);
                    return None;
                }
            };
            let record = cleanse_sale(&sale, loaded_at);
            if record.is_none() {
                warn!(
                    "Skipping raw record #{}: unreadable price {:?}",
                    index, sale.price
                );
            }
            record
        })
        .collect();

    info!(
        "Cleansing finished: {} staged, {} dropped",
        records.len(),
        raw.len() - records.len()
    );
    records
}

/// `None` only when the unit price is missing or unreadable.
pub fn cleanse_sale(sale: &RawSale, loaded_at: DateTime<Utc>) -> Option<StagingRecord> {
    let price_cents = sale.price.as_ref().and_then(decimal).map(to_cents)?;

    Some(StagingRecord {
        product_name: text_or(&sale.product, sentinel::PRODUCT_NAME),
        category_name: text_or(&sale.category, sentinel::CATEGORY),
        brand_name: sale.brand.as_ref().and_then(text),
        price_cents,
        shipping_cost_cents: sale.shipping.as_ref().and_then(shipping_cost).map(to_cents),
        purchase_date: sale.purchase_date.as_ref().and_then(date),
        seller_name: text_or(&sale.seller, sentinel::SELLER),
        location_code: text_or(&sale.location, sentinel::LOCATION),
        purchase_rating: sale.rating.as_ref().and_then(integer),
        payment_type: text_or(&sale.payment_type, sentinel::PAYMENT_TYPE),
        installments_quantity: sale.installments.as_ref().and_then(integer),
        latitude: sale.latitude.as_ref().and_then(decimal),
        longitude: sale.longitude.as_ref().and_then(decimal),
        loaded_at,
    })
}

fn text(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let normalized = raw.trim().to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

fn text_or(value: &Option<Value>, fallback: &str) -> String {
    value
        .as_ref()
        .and_then(text)
        .unwrap_or_else(|| fallback.to_string())
}

fn decimal(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Shipping arrives as free text at times ("R$ 12.50", "grátis"); the first
/// number in it is the cost. A number has at most one decimal point.
fn shipping_cost(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => first_number(s),
        other => decimal(other),
    }
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d+\.?\d*|\.\d+").ok())
        .as_ref()
}

fn first_number(s: &str) -> Option<f64> {
    number_pattern()?.find(s)?.as_str().parse::<f64>().ok()
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn integer(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

fn date(value: &Value) -> Option<NaiveDate> {
    let Value::String(s) = value else {
        return None;
    };
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}
