diesel::table! {
    staging_sales (staging_id) {
        staging_id -> Int4,
        product_name -> Text,
        category_name -> Text,
        brand_name -> Nullable<Text>,
        price_cents -> Int8,
        shipping_cost_cents -> Nullable<Int8>,
        purchase_date -> Nullable<Date>,
        seller_name -> Text,
        purchase_location_code -> Text,
        purchase_rating -> Nullable<Int4>,
        payment_type -> Text,
        installments_quantity -> Nullable<Int4>,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        etl_load_timestamp -> Timestamptz,
    }
}

diesel::table! {
    dim_product (product_key) {
        product_key -> Int4,
        product_name -> Text,
        category_name -> Text,
        brand_name -> Nullable<Text>,
    }
}

diesel::table! {
    dim_seller (seller_key) {
        seller_key -> Int4,
        seller_name -> Text,
    }
}

diesel::table! {
    dim_location (location_key) {
        location_key -> Int4,
        location_code -> Text,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
    }
}

diesel::table! {
    dim_time (time_key) {
        time_key -> Int4,
        full_date -> Nullable<Date>,
        year -> Nullable<Int4>,
        month -> Nullable<Int4>,
        day -> Nullable<Int4>,
        weekday_name -> Nullable<Text>,
        month_name -> Nullable<Text>,
        quarter -> Nullable<Int4>,
        half_year -> Nullable<Int4>,
    }
}

diesel::table! {
    dim_payment (payment_key) {
        payment_key -> Int4,
        payment_type -> Text,
        installments_quantity -> Nullable<Int4>,
    }
}

diesel::table! {
    fact_sales (sale_key) {
        sale_key -> Int8,
        product_key -> Int4,
        seller_key -> Int4,
        location_key -> Int4,
        time_key -> Int4,
        payment_key -> Int4,
        price_cents -> Int8,
        shipping_cost_cents -> Nullable<Int8>,
        purchase_rating -> Nullable<Int4>,
        etl_load_timestamp -> Timestamptz,
    }
}

diesel::joinable!(fact_sales -> dim_product (product_key));
diesel::joinable!(fact_sales -> dim_seller (seller_key));
diesel::joinable!(fact_sales -> dim_location (location_key));
diesel::joinable!(fact_sales -> dim_time (time_key));
diesel::joinable!(fact_sales -> dim_payment (payment_key));

diesel::allow_tables_to_appear_in_same_query!(
    staging_sales,
    dim_product,
    dim_seller,
    dim_location,
    dim_time,
    dim_payment,
    fact_sales,
);
