use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::dimension::{KeyMap, UNKNOWN_KEY};
use crate::dimensions::{
    LocationDimension, LocationKey, LocationMember, PaymentDimension, PaymentKey,
    ProductDimension, ProductKey, SellerDimension, SellerKey, TimeDimension, TimeMember,
};
use crate::error::WarehouseError;
use crate::models::*;
use crate::schema::*;
use crate::staging::StagingRecord;
use crate::store::{DimensionStore, FactSale, FactStore, SchemaStore, StagingStore};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Rows per INSERT statement, well below PostgreSQL's bind parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// Inserts `$rows` in chunks inside one transaction, skipping rows whose
/// natural key already exists. Evaluates to the number of rows added.
macro_rules! insert_skipping_conflicts {
    ($conn:expr, $table:expr, $rows:expr) => {
        $conn
            .transaction::<_, WarehouseError, _>(|conn| {
                Box::pin(async move {
                    let mut inserted = 0;
                    for chunk in $rows.chunks(INSERT_CHUNK_SIZE) {
                        inserted += diesel::insert_into($table)
                            .values(chunk)
                            .on_conflict_do_nothing()
                            .execute(conn)
                            .await?;
                    }
                    Ok(inserted)
                })
            })
            .await
    };
}

#[derive(Clone)]
pub struct PgWarehouse {
    pool: Pool<AsyncPgConnection>,
    database_url: String,
}

impl PgWarehouse {
    pub async fn new(database_url: &str, pool_size: usize) -> Result<Self, WarehouseError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(config)
            .max_size(pool_size)
            .build()
            .map_err(|e| WarehouseError::ConfigError {
                message: format!("Failed to create database pool: {}", e),
            })?;

        Ok(Self {
            pool,
            database_url: database_url.to_string(),
        })
    }

    async fn connection(&self) -> Result<Object<AsyncPgConnection>, WarehouseError> {
        self.pool
            .get()
            .await
            .map_err(|e| WarehouseError::ConnectionError {
                message: format!("Failed to get database connection: {}", e),
            })
    }

    pub async fn run_migrations(&self) -> Result<(), WarehouseError> {
        // diesel_migrations only drives synchronous connections
        let database_url = self.database_url.clone();

        tokio::task::spawn_blocking(move || -> Result<(), WarehouseError> {
            let mut connection = PgConnection::establish(&database_url)?;
            let applied = connection
                .run_pending_migrations(MIGRATIONS)
                .map_err(|e| WarehouseError::MigrationError {
                    message: format!("Failed to run migrations: {}", e),
                })?;
            info!("Applied {} pending warehouse migrations", applied.len());
            Ok(())
        })
        .await
        .map_err(|e| WarehouseError::InternalError {
            message: format!("Migration task failed: {}", e),
        })?
    }
}

fn as_count(count: i64) -> usize {
    usize::try_from(count).unwrap_or_default()
}

#[async_trait]
impl SchemaStore for PgWarehouse {
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        self.run_migrations().await
    }
}

#[async_trait]
impl StagingStore for PgWarehouse {
    async fn load_staging(&self) -> Result<Vec<StagingRecord>, WarehouseError> {
        let mut conn = self.connection().await?;

        let rows = staging_sales::table
            .order(staging_sales::staging_id.asc())
            .select(StagingRow::as_select())
            .load::<StagingRow>(&mut conn)
            .await?;

        Ok(rows.into_iter().map(StagingRecord::from).collect())
    }

    async fn replace_staging(&self, records: &[StagingRecord]) -> Result<usize, WarehouseError> {
        info!("Replacing staging_sales with {} records", records.len());
        let rows: Vec<NewStagingRow<'_>> = records.iter().map(NewStagingRow::from).collect();
        let mut conn = self.connection().await?;

        conn.transaction::<_, WarehouseError, _>(|conn| {
            Box::pin(async move {
                diesel::sql_query("TRUNCATE TABLE staging_sales RESTART IDENTITY")
                    .execute(conn)
                    .await?;

                let mut inserted = 0;
                for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                    inserted += diesel::insert_into(staging_sales::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok(inserted)
            })
        })
        .await
    }
}

#[async_trait]
impl DimensionStore<ProductDimension> for PgWarehouse {
    async fn key_map(&self) -> Result<KeyMap<ProductKey>, WarehouseError> {
        use crate::schema::dim_product::dsl::*;
        let mut conn = self.connection().await?;

        let rows = dim_product
            .filter(product_key.ne(UNKNOWN_KEY))
            .select((product_key, product_name, category_name, brand_name))
            .load::<(i32, String, String, Option<String>)>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(key, name, category, brand)| {
                (
                    ProductKey {
                        name,
                        category,
                        brand,
                    },
                    key,
                )
            })
            .collect())
    }

    async fn insert_members(&self, members: &[ProductKey]) -> Result<usize, WarehouseError> {
        let rows: Vec<NewProduct<'_>> = members.iter().map(NewProduct::from).collect();
        let mut conn = self.connection().await?;
        insert_skipping_conflicts!(conn, dim_product::table, rows)
    }

    async fn count(&self) -> Result<usize, WarehouseError> {
        let mut conn = self.connection().await?;
        let count = dim_product::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;
        Ok(as_count(count))
    }
}

#[async_trait]
impl DimensionStore<SellerDimension> for PgWarehouse {
    async fn key_map(&self) -> Result<KeyMap<SellerKey>, WarehouseError> {
        use crate::schema::dim_seller::dsl::*;
        let mut conn = self.connection().await?;

        let rows = dim_seller
            .filter(seller_key.ne(UNKNOWN_KEY))
            .select((seller_key, seller_name))
            .load::<(i32, String)>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(key, name)| (SellerKey { name }, key))
            .collect())
    }

    async fn insert_members(&self, members: &[SellerKey]) -> Result<usize, WarehouseError> {
        let rows: Vec<NewSeller<'_>> = members.iter().map(NewSeller::from).collect();
        let mut conn = self.connection().await?;
        insert_skipping_conflicts!(conn, dim_seller::table, rows)
    }

    async fn count(&self) -> Result<usize, WarehouseError> {
        let mut conn = self.connection().await?;
        let count = dim_seller::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;
        Ok(as_count(count))
    }
}

#[async_trait]
impl DimensionStore<LocationDimension> for PgWarehouse {
    async fn key_map(&self) -> Result<KeyMap<LocationKey>, WarehouseError> {
        use crate::schema::dim_location::dsl::*;
        let mut conn = self.connection().await?;

        let rows = dim_location
            .filter(location_key.ne(UNKNOWN_KEY))
            .select((location_key, location_code))
            .load::<(i32, String)>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(key, code)| (LocationKey { code }, key))
            .collect())
    }

    async fn insert_members(&self, members: &[LocationMember]) -> Result<usize, WarehouseError> {
        let rows: Vec<NewLocation<'_>> = members.iter().map(NewLocation::from).collect();
        let mut conn = self.connection().await?;
        insert_skipping_conflicts!(conn, dim_location::table, rows)
    }

    async fn count(&self) -> Result<usize, WarehouseError> {
        let mut conn = self.connection().await?;
        let count = dim_location::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;
        Ok(as_count(count))
    }
}

#[async_trait]
impl DimensionStore<TimeDimension> for PgWarehouse {
    async fn key_map(&self) -> Result<KeyMap<NaiveDate>, WarehouseError> {
        use crate::schema::dim_time::dsl::*;
        let mut conn = self.connection().await?;

        let rows = dim_time
            .filter(time_key.ne(UNKNOWN_KEY))
            .select((time_key, full_date))
            .load::<(i32, Option<NaiveDate>)>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, date)| date.map(|date| (date, key)))
            .collect())
    }

    async fn insert_members(&self, members: &[TimeMember]) -> Result<usize, WarehouseError> {
        let rows: Vec<NewTime<'_>> = members.iter().map(NewTime::from).collect();
        let mut conn = self.connection().await?;
        insert_skipping_conflicts!(conn, dim_time::table, rows)
    }

    async fn count(&self) -> Result<usize, WarehouseError> {
        let mut conn = self.connection().await?;
        let count = dim_time::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;
        Ok(as_count(count))
    }
}

#[async_trait]
impl DimensionStore<PaymentDimension> for PgWarehouse {
    async fn key_map(&self) -> Result<KeyMap<PaymentKey>, WarehouseError> {
        use crate::schema::dim_payment::dsl::*;
        let mut conn = self.connection().await?;

        let rows = dim_payment
            .filter(payment_key.ne(UNKNOWN_KEY))
            .select((payment_key, payment_type, installments_quantity))
            .load::<(i32, String, Option<i32>)>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(key, kind, installments)| {
                (
                    PaymentKey {
                        payment_type: kind,
                        installments,
                    },
                    key,
                )
            })
            .collect())
    }

    async fn insert_members(&self, members: &[PaymentKey]) -> Result<usize, WarehouseError> {
        let rows: Vec<NewPayment<'_>> = members.iter().map(NewPayment::from).collect();
        let mut conn = self.connection().await?;
        insert_skipping_conflicts!(conn, dim_payment::table, rows)
    }

    async fn count(&self) -> Result<usize, WarehouseError> {
        let mut conn = self.connection().await?;
        let count = dim_payment::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;
        Ok(as_count(count))
    }
}

#[async_trait]
impl FactStore for PgWarehouse {
    async fn truncate_facts(&self) -> Result<(), WarehouseError> {
        let mut conn = self.connection().await?;
        diesel::sql_query("TRUNCATE TABLE fact_sales RESTART IDENTITY")
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn replace_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError> {
        info!("Replacing fact_sales with {} rows", facts.len());
        let rows: Vec<NewFactSale> = facts.iter().map(NewFactSale::from).collect();
        let mut conn = self.connection().await?;

        // TRUNCATE holds an exclusive lock until commit, so concurrent replaces serialize.
        conn.transaction::<_, WarehouseError, _>(|conn| {
            Box::pin(async move {
                diesel::sql_query("TRUNCATE TABLE fact_sales RESTART IDENTITY")
                    .execute(conn)
                    .await?;

                let mut inserted = 0;
                for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                    inserted += diesel::insert_into(fact_sales::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok(inserted)
            })
        })
        .await
    }

    async fn insert_facts(&self, facts: &[FactSale]) -> Result<usize, WarehouseError> {
        let rows: Vec<NewFactSale> = facts.iter().map(NewFactSale::from).collect();
        let mut conn = self.connection().await?;

        conn.transaction::<_, WarehouseError, _>(|conn| {
            Box::pin(async move {
                let mut inserted = 0;
                for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                    inserted += diesel::insert_into(fact_sales::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok(inserted)
            })
        })
        .await
    }

    async fn load_facts(&self) -> Result<Vec<FactSale>, WarehouseError> {
        let mut conn = self.connection().await?;

        let rows = fact_sales::table
            .order(fact_sales::sale_key.asc())
            .select(FactSaleRow::as_select())
            .load::<FactSaleRow>(&mut conn)
            .await?;

        Ok(rows.into_iter().map(FactSale::from).collect())
    }

    async fn count_facts(&self) -> Result<usize, WarehouseError> {
        let mut conn = self.connection().await?;
        let count = fact_sales::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;
        Ok(as_count(count))
    }
}
