use chrono::{Datelike, NaiveDate};

use crate::dimension::Dimension;
use crate::staging::{sentinel, StagingRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductKey {
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
}

pub struct ProductDimension;

impl Dimension for ProductDimension {
    const NAME: &'static str = "product";
    const TABLE: &'static str = "dim_product";

    type Key = ProductKey;
    type Member = ProductKey;

    fn lookup_key(record: &StagingRecord) -> Option<ProductKey> {
        Some(ProductKey {
            name: record.product_name.clone(),
            category: record.category_name.clone(),
            brand: record.brand_name.clone(),
        })
    }

    fn is_sentinel(key: &ProductKey) -> bool {
        key.name == sentinel::PRODUCT_NAME || key.category == sentinel::CATEGORY
    }

    fn member_key(member: &ProductKey) -> ProductKey {
        member.clone()
    }

    fn build_member(key: ProductKey, _records: &[&StagingRecord]) -> ProductKey {
        key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SellerKey {
    pub name: String,
}

pub struct SellerDimension;

impl Dimension for SellerDimension {
    const NAME: &'static str = "seller";
    const TABLE: &'static str = "dim_seller";

    type Key = SellerKey;
    type Member = SellerKey;

    fn lookup_key(record: &StagingRecord) -> Option<SellerKey> {
        Some(SellerKey {
            name: record.seller_name.clone(),
        })
    }

    fn is_sentinel(key: &SellerKey) -> bool {
        key.name == sentinel::SELLER
    }

    fn member_key(member: &SellerKey) -> SellerKey {
        member.clone()
    }

    fn build_member(key: SellerKey, _records: &[&StagingRecord]) -> SellerKey {
        key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationKey {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationMember {
    pub code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub struct LocationDimension;

impl Dimension for LocationDimension {
    const NAME: &'static str = "location";
    const TABLE: &'static str = "dim_location";

    type Key = LocationKey;
    type Member = LocationMember;

    fn lookup_key(record: &StagingRecord) -> Option<LocationKey> {
        Some(LocationKey {
            code: record.location_code.clone(),
        })
    }

    fn is_sentinel(key: &LocationKey) -> bool {
        key.code == sentinel::LOCATION
    }

    fn member_key(member: &LocationMember) -> LocationKey {
        LocationKey {
            code: member.code.clone(),
        }
    }

    /// Several sales can report slightly different coordinates for one code;
    /// the smallest non-null value of each axis wins.
    fn build_member(key: LocationKey, records: &[&StagingRecord]) -> LocationMember {
        LocationMember {
            code: key.code,
            latitude: min_coordinate(records.iter().map(|r| r.latitude)),
            longitude: min_coordinate(records.iter().map(|r| r.longitude)),
        }
    }
}

fn min_coordinate(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().filter(|v| !v.is_nan()).reduce(f64::min)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeMember {
    pub date: NaiveDate,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub weekday_name: String,
    pub month_name: String,
    pub quarter: i32,
    pub half_year: i32,
}

impl TimeMember {
    /// Calendar attributes are derived once here and stored, never recomputed on read.
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month() as i32;
        Self {
            date,
            year: date.year(),
            month,
            day: date.day() as i32,
            weekday_name: date.format("%A").to_string(),
            month_name: date.format("%B").to_string(),
            quarter: (month + 2) / 3,
            half_year: if month <= 6 { 1 } else { 2 },
        }
    }
}

pub struct TimeDimension;

impl Dimension for TimeDimension {
    const NAME: &'static str = "time";
    const TABLE: &'static str = "dim_time";

    type Key = NaiveDate;
    type Member = TimeMember;

    fn lookup_key(record: &StagingRecord) -> Option<NaiveDate> {
        record.purchase_date
    }

    fn is_sentinel(_key: &NaiveDate) -> bool {
        false
    }

    fn member_key(member: &TimeMember) -> NaiveDate {
        member.date
    }

    fn build_member(key: NaiveDate, _records: &[&StagingRecord]) -> TimeMember {
        TimeMember::from_date(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymentKey {
    pub payment_type: String,
    pub installments: Option<i32>,
}

pub struct PaymentDimension;

impl Dimension for PaymentDimension {
    const NAME: &'static str = "payment";
    const TABLE: &'static str = "dim_payment";

    type Key = PaymentKey;
    type Member = PaymentKey;

    fn lookup_key(record: &StagingRecord) -> Option<PaymentKey> {
        Some(PaymentKey {
            payment_type: record.payment_type.clone(),
            installments: record.installments_quantity,
        })
    }

    fn is_sentinel(key: &PaymentKey) -> bool {
        key.payment_type == sentinel::PAYMENT_TYPE
    }

    fn member_key(member: &PaymentKey) -> PaymentKey {
        member.clone()
    }

    fn build_member(key: PaymentKey, _records: &[&StagingRecord]) -> PaymentKey {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{KeyMap, UNKNOWN_KEY};
    use chrono::{TimeZone, Utc};

    fn record(product: &str, brand: Option<&str>, date: Option<(i32, u32, u32)>) -> StagingRecord {
        StagingRecord {
            product_name: product.to_string(),
            category_name: "electronics".to_string(),
            brand_name: brand.map(str::to_string),
            price_cents: 1999,
            shipping_cost_cents: Some(500),
            purchase_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            seller_name: "ana".to_string(),
            location_code: "sp".to_string(),
            purchase_rating: Some(4),
            payment_type: "boleto".to_string(),
            installments_quantity: None,
            latitude: Some(-23.5),
            longitude: Some(-46.6),
            loaded_at: Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn null_brands_collapse_into_one_product() {
        let records = vec![
            record("mouse", None, Some((2024, 3, 2))),
            record("mouse", None, Some((2024, 3, 5))),
            record("mouse", Some("acme"), Some((2024, 3, 5))),
        ];

        let members = ProductDimension::members(&records);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].brand, None);
        assert_eq!(members[1].brand.as_deref(), Some("acme"));
    }

    #[test]
    fn sentinel_products_are_excluded() {
        let mut other_category = record("keyboard", None, None);
        other_category.category_name = sentinel::CATEGORY.to_string();
        let records = vec![
            record(sentinel::PRODUCT_NAME, None, None),
            other_category,
            record("keyboard", None, None),
        ];

        let members = ProductDimension::members(&records);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "keyboard");
    }

    #[test]
    fn sentinel_seller_location_and_payment_are_excluded() {
        let mut r = record("mouse", None, None);
        r.seller_name = sentinel::SELLER.to_string();
        r.location_code = sentinel::LOCATION.to_string();
        r.payment_type = sentinel::PAYMENT_TYPE.to_string();
        let records = vec![r];

        assert!(SellerDimension::members(&records).is_empty());
        assert!(LocationDimension::members(&records).is_empty());
        assert!(PaymentDimension::members(&records).is_empty());
    }

    #[test]
    fn location_takes_minimum_non_null_coordinates() {
        let mut a = record("mouse", None, None);
        a.latitude = Some(-20.0);
        a.longitude = None;
        let mut b = record("mouse", None, None);
        b.latitude = Some(-23.5);
        b.longitude = Some(-46.6);
        let mut c = record("mouse", None, None);
        c.latitude = None;
        c.longitude = Some(-40.0);

        let members = LocationDimension::members(&[a, b, c]);
        assert_eq!(
            members,
            vec![LocationMember {
                code: "sp".to_string(),
                latitude: Some(-23.5),
                longitude: Some(-46.6),
            }]
        );
    }

    #[test]
    fn location_without_coordinates_keeps_nulls() {
        let mut a = record("mouse", None, None);
        a.latitude = None;
        a.longitude = None;

        let members = LocationDimension::members(&[a]);
        assert_eq!(members[0].latitude, None);
        assert_eq!(members[0].longitude, None);
    }

    #[test]
    fn calendar_attributes_are_derived() {
        let member = TimeMember::from_date(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(member.year, 2024);
        assert_eq!(member.month, 3);
        assert_eq!(member.day, 2);
        assert_eq!(member.weekday_name, "Saturday");
        assert_eq!(member.month_name, "March");
        assert_eq!(member.quarter, 1);
        assert_eq!(member.half_year, 1);

        let july = TimeMember::from_date(NaiveDate::from_ymd_opt(2023, 7, 31).unwrap());
        assert_eq!(july.quarter, 3);
        assert_eq!(july.half_year, 2);

        let december = TimeMember::from_date(NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(december.quarter, 4);
        assert_eq!(december.half_year, 2);

        let june = TimeMember::from_date(NaiveDate::from_ymd_opt(2023, 6, 30).unwrap());
        assert_eq!(june.quarter, 2);
        assert_eq!(june.half_year, 1);
    }

    #[test]
    fn records_without_date_have_no_time_member() {
        let records = vec![
            record("mouse", None, None),
            record("mouse", None, Some((2024, 3, 2))),
            record("mouse", None, Some((2024, 3, 2))),
        ];

        let members = TimeDimension::members(&records);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn payment_installments_compare_null_safely() {
        let mut a = record("mouse", None, None);
        a.payment_type = "credit card".to_string();
        let b = a.clone();
        let mut c = a.clone();
        c.installments_quantity = Some(3);

        let members = PaymentDimension::members(&[a, b, c]);
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn resolve_falls_back_to_unknown_key() {
        let mut keys: KeyMap<SellerKey> = KeyMap::new();
        keys.insert(
            SellerKey {
                name: "ana".to_string(),
            },
            7,
        );

        let known = record("mouse", None, None);
        let mut unknown = known.clone();
        unknown.seller_name = "bruno".to_string();

        assert_eq!(SellerDimension::resolve(&keys, &known), 7);
        assert_eq!(SellerDimension::resolve(&keys, &unknown), UNKNOWN_KEY);
    }
}
