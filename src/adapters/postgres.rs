use crate::domain::{format_timestamp, parse_timestamp, Delivery, Item, OrderRecord, Payment};
use crate::error::{OrdersError, Result};
use crate::persistence::{InsertOutcome, OrderStore};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }

    fn corrupt(order_uid: &str, reason: &str) -> OrdersError {
        OrdersError::CorruptRecord {
            order_uid: order_uid.to_string(),
            reason: reason.to_string(),
        }
    }

    fn delivery_from_row(row: &PgRow) -> Result<Delivery> {
        Ok(Delivery {
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            zip: row.try_get("zip")?,
            city: row.try_get("city")?,
            address: row.try_get("address")?,
            region: row.try_get("region")?,
            email: row.try_get("email")?,
        })
    }

    fn payment_from_row(row: &PgRow) -> Result<Payment> {
        Ok(Payment {
            transaction: row.try_get("transaction")?,
            request_id: row.try_get("request_id")?,
            currency: row.try_get("currency")?,
            provider: row.try_get("provider")?,
            amount: row.try_get("amount")?,
            payment_dt: row.try_get("payment_dt")?,
            bank: row.try_get("bank")?,
            delivery_cost: row.try_get("delivery_cost")?,
            goods_total: row.try_get("goods_total")?,
            custom_fee: row.try_get("custom_fee")?,
        })
    }

    fn item_from_row(row: &PgRow) -> Result<Item> {
        Ok(Item {
            chrt_id: row.try_get("chrt_id")?,
            track_number: row.try_get("track_number")?,
            price: row.try_get("price")?,
            rid: row.try_get("rid")?,
            name: row.try_get("name")?,
            sale: row.try_get("sale")?,
            size: row.try_get("size")?,
            total_price: row.try_get("total_price")?,
            nm_id: row.try_get("nm_id")?,
            brand: row.try_get("brand")?,
            status: row.try_get("status")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn exists(&self, order_uid: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = $1) AS present")
            .bind(order_uid)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("present")?)
    }

    /// Insert the order row first with `ON CONFLICT DO NOTHING`; when it
    /// returns nothing the id already exists and the transaction is rolled back
    /// without touching the sub-entity tables.
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    async fn insert_if_absent(&self, order: &OrderRecord) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                                customer_id, delivery_service, shardkey, sm_id, date_created,
                                date_created_raw, oof_shard)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (order_uid) DO NOTHING
            RETURNING order_uid
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(format_timestamp(&order.date_created))
        .bind(&order.oof_shard)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            debug!("Order already stored");
            return Ok(InsertOutcome::Duplicate);
        }

        let d = &order.delivery;
        sqlx::query(
            r#"
            INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&order.order_uid)
        .bind(&d.name)
        .bind(&d.phone)
        .bind(&d.zip)
        .bind(&d.city)
        .bind(&d.address)
        .bind(&d.region)
        .bind(&d.email)
        .execute(&mut *tx)
        .await?;

        let p = &order.payment;
        sqlx::query(
            r#"
            INSERT INTO payment (order_uid, transaction, request_id, currency, provider, amount,
                                 payment_dt, bank, delivery_cost, goods_total, custom_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&order.order_uid)
        .bind(&p.transaction)
        .bind(&p.request_id)
        .bind(&p.currency)
        .bind(&p.provider)
        .bind(p.amount)
        .bind(p.payment_dt)
        .bind(&p.bank)
        .bind(p.delivery_cost)
        .bind(p.goods_total)
        .bind(p.custom_fee)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO item (order_uid, chrt_id, track_number, price, rid, name, sale,
                                  size, total_price, nm_id, brand, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(&order.order_uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Inserted order with {} items", order.items.len());
        Ok(InsertOutcome::Inserted)
    }

    #[instrument(skip(self))]
    async fn fetch_by_id(&self, order_uid: &str) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(
            r#"
            SELECT order_uid, track_number, entry, locale, internal_signature, customer_id,
                   delivery_service, shardkey, sm_id, date_created_raw, oof_shard
            FROM orders WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let delivery = sqlx::query(
            "SELECT name, phone, zip, city, address, region, email FROM delivery WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Self::corrupt(order_uid, "missing delivery row"))?;

        let payment = sqlx::query(
            r#"
            SELECT transaction, request_id, currency, provider, amount, payment_dt, bank,
                   delivery_cost, goods_total, custom_fee
            FROM payment WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Self::corrupt(order_uid, "missing payment row"))?;

        let item_rows = sqlx::query(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status
            FROM item WHERE order_uid = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        if item_rows.is_empty() {
            return Err(Self::corrupt(order_uid, "order has no items"));
        }

        // The TIMESTAMPTZ column drives ordering; the raw text keeps the
        // producer's offset and full precision.
        let raw_created: String = row.try_get("date_created_raw")?;
        let date_created = parse_timestamp(&raw_created)
            .map_err(|e| Self::corrupt(order_uid, &format!("date_created: {}", e)))?;

        let items = item_rows
            .iter()
            .map(Self::item_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(OrderRecord {
            order_uid: row.try_get("order_uid")?,
            track_number: row.try_get("track_number")?,
            entry: row.try_get("entry")?,
            locale: row.try_get("locale")?,
            internal_signature: row.try_get("internal_signature")?,
            customer_id: row.try_get("customer_id")?,
            delivery_service: row.try_get("delivery_service")?,
            shardkey: row.try_get("shardkey")?,
            sm_id: row.try_get("sm_id")?,
            date_created,
            oof_shard: row.try_get("oof_shard")?,
            delivery: Self::delivery_from_row(&delivery)?,
            payment: Self::payment_from_row(&payment)?,
            items,
        }))
    }

    async fn list_recent_ids(&self, limit: usize) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT order_uid FROM orders
            ORDER BY date_created DESC, order_uid ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("order_uid").map_err(OrdersError::from))
            .collect()
    }

    async fn list_all_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT order_uid FROM orders ORDER BY date_created DESC, order_uid ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("order_uid").map_err(OrdersError::from))
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
