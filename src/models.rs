use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use crate::dimensions::{LocationMember, PaymentKey, ProductKey, SellerKey, TimeMember};
use crate::schema::{
    dim_location, dim_payment, dim_product, dim_seller, dim_time, fact_sales, staging_sales,
};
use crate::staging::StagingRecord;
use crate::store::FactSale;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = staging_sales)]
#[diesel(primary_key(staging_id))]
pub struct StagingRow {
    pub staging_id: i32,
    pub product_name: String,
    pub category_name: String,
    pub brand_name: Option<String>,
    pub price_cents: i64,
    pub shipping_cost_cents: Option<i64>,
    pub purchase_date: Option<NaiveDate>,
    pub seller_name: String,
    pub purchase_location_code: String,
    pub purchase_rating: Option<i32>,
    pub payment_type: String,
    pub installments_quantity: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub etl_load_timestamp: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = staging_sales)]
pub struct NewStagingRow<'a> {
    pub product_name: &'a str,
    pub category_name: &'a str,
    pub brand_name: Option<&'a str>,
    pub price_cents: i64,
    pub shipping_cost_cents: Option<i64>,
    pub purchase_date: Option<NaiveDate>,
    pub seller_name: &'a str,
    pub purchase_location_code: &'a str,
    pub purchase_rating: Option<i32>,
    pub payment_type: &'a str,
    pub installments_quantity: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub etl_load_timestamp: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = dim_product)]
pub struct NewProduct<'a> {
    pub product_name: &'a str,
    pub category_name: &'a str,
    pub brand_name: Option<&'a str>,
}

#[derive(Insertable)]
#[diesel(table_name = dim_seller)]
pub struct NewSeller<'a> {
    pub seller_name: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = dim_location)]
pub struct NewLocation<'a> {
    pub location_code: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Insertable)]
#[diesel(table_name = dim_time)]
pub struct NewTime<'a> {
    pub full_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub day: Option<i32>,
    pub weekday_name: Option<&'a str>,
    pub month_name: Option<&'a str>,
    pub quarter: Option<i32>,
    pub half_year: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = dim_payment)]
pub struct NewPayment<'a> {
    pub payment_type: &'a str,
    pub installments_quantity: Option<i32>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = fact_sales)]
#[diesel(primary_key(sale_key))]
pub struct FactSaleRow {
    pub sale_key: i64,
    pub product_key: i32,
    pub seller_key: i32,
    pub location_key: i32,
    pub time_key: i32,
    pub payment_key: i32,
    pub price_cents: i64,
    pub shipping_cost_cents: Option<i64>,
    pub purchase_rating: Option<i32>,
    pub etl_load_timestamp: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = fact_sales)]
pub struct NewFactSale {
    pub product_key: i32,
    pub seller_key: i32,
    pub location_key: i32,
    pub time_key: i32,
    pub payment_key: i32,
    pub price_cents: i64,
    pub shipping_cost_cents: Option<i64>,
    pub purchase_rating: Option<i32>,
    pub etl_load_timestamp: DateTime<Utc>,
}

impl From<StagingRow> for StagingRecord {
    fn from(row: StagingRow) -> Self {
        StagingRecord {
            product_name: row.product_name,
            category_name: row.category_name,
            brand_name: row.brand_name,
            price_cents: row.price_cents,
            shipping_cost_cents: row.shipping_cost_cents,
            purchase_date: row.purchase_date,
            seller_name: row.seller_name,
            location_code: row.purchase_location_code,
            purchase_rating: row.purchase_rating,
            payment_type: row.payment_type,
            installments_quantity: row.installments_quantity,
            latitude: row.latitude,
            longitude: row.longitude,
            loaded_at: row.etl_load_timestamp,
        }
    }
}

impl<'a> From<&'a StagingRecord> for NewStagingRow<'a> {
    fn from(record: &'a StagingRecord) -> Self {
        NewStagingRow {
            product_name: &record.product_name,
            category_name: &record.category_name,
            brand_name: record.brand_name.as_deref(),
            price_cents: record.price_cents,
            shipping_cost_cents: record.shipping_cost_cents,
            purchase_date: record.purchase_date,
            seller_name: &record.seller_name,
            purchase_location_code: &record.location_code,
            purchase_rating: record.purchase_rating,
            payment_type: &record.payment_type,
            installments_quantity: record.installments_quantity,
            latitude: record.latitude,
            longitude: record.longitude,
            etl_load_timestamp: record.loaded_at,
        }
    }
}

impl<'a> From<&'a ProductKey> for NewProduct<'a> {
    fn from(key: &'a ProductKey) -> Self {
        NewProduct {
            product_name: &key.name,
            category_name: &key.category,
            brand_name: key.brand.as_deref(),
        }
    }
}

impl<'a> From<&'a SellerKey> for NewSeller<'a> {
    fn from(key: &'a SellerKey) -> Self {
        NewSeller {
            seller_name: &key.name,
        }
    }
}

impl<'a> From<&'a LocationMember> for NewLocation<'a> {
    fn from(member: &'a LocationMember) -> Self {
        NewLocation {
            location_code: &member.code,
            latitude: member.latitude,
            longitude: member.longitude,
        }
    }
}

impl<'a> From<&'a TimeMember> for NewTime<'a> {
    fn from(member: &'a TimeMember) -> Self {
        NewTime {
            full_date: Some(member.date),
            year: Some(member.year),
            month: Some(member.month),
            day: Some(member.day),
            weekday_name: Some(member.weekday_name.as_str()),
            month_name: Some(member.month_name.as_str()),
            quarter: Some(member.quarter),
            half_year: Some(member.half_year),
        }
    }
}

impl<'a> From<&'a PaymentKey> for NewPayment<'a> {
    fn from(key: &'a PaymentKey) -> Self {
        NewPayment {
            payment_type: &key.payment_type,
            installments_quantity: key.installments,
        }
    }
}

impl From<&FactSale> for NewFactSale {
    fn from(fact: &FactSale) -> Self {
        NewFactSale {
            product_key: fact.product_key,
            seller_key: fact.seller_key,
            location_key: fact.location_key,
            time_key: fact.time_key,
            payment_key: fact.payment_key,
            price_cents: fact.price_cents,
            shipping_cost_cents: fact.shipping_cost_cents,
            purchase_rating: fact.purchase_rating,
            etl_load_timestamp: fact.loaded_at,
        }
    }
}

impl From<FactSaleRow> for FactSale {
    fn from(row: FactSaleRow) -> Self {
        FactSale {
            product_key: row.product_key,
            seller_key: row.seller_key,
            location_key: row.location_key,
            time_key: row.time_key,
            payment_key: row.payment_key,
            price_cents: row.price_cents,
            shipping_cost_cents: row.shipping_cost_cents,
            purchase_rating: row.purchase_rating,
            loaded_at: row.etl_load_timestamp,
        }
    }
}
