//! Postgres-backed stock storage.
//!
//! Targets the ERP's existing tables; table names come from [`StockSchema`] and are
//! validated as plain identifiers before being spliced into SQL. Values are always
//! bound as parameters.
//!
//! ## Columns read and written
//!
//! | table | columns |
//! |-------|---------|
//! | warehouses | `codalmacen` |
//! | stock | `codalmacen`, `referencia`, `cantidad`, `pterecibir`, `reservada`, `disponible` |
//! | movements | `codalmacen`, `referencia`, `cantidad` |
//! | purchase/sales lines | `idpedido`, `referencia`, `cantidad`, `servido`, `actualizastock` |
//! | purchase/sales orders | `idpedido`, `codalmacen` |
//!
//! When the stock table is missing, a rebuild creates it inside its own transaction
//! (`CREATE TABLE IF NOT EXISTS`); Postgres DDL is transactional, so a rollback also
//! undoes the creation.
//!
//! ## Error Mapping
//!
//! SQLx errors become [`StorageError::Query`] (or [`StorageError::Transaction`] for
//! begin/commit/rollback) tagged with the failing operation. Rows that cannot be turned
//! into domain values become [`StorageError::Decode`].

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};

use stockrebuild_core::WarehouseCode;
use stockrebuild_inventory::{MovementEntry, PurchaseLine, SalesLine, StockAffect, StockKey, StockRecord};

use super::{SourceSet, StockStorage, StockTransaction, StorageError};
use crate::config::{ConfigError, StockSchema};

/// Postgres stock storage.
///
/// Uses the SQLx connection pool, which is thread-safe; each rebuild holds one pooled
/// connection for the lifetime of its transaction.
#[derive(Debug, Clone)]
pub struct PostgresStockStorage {
    pool: Arc<PgPool>,
    schema: Arc<StockSchema>,
}

impl PostgresStockStorage {
    /// Create a storage over `pool`, validating the schema's table names.
    pub fn new(pool: PgPool, schema: StockSchema) -> Result<Self, ConfigError> {
        schema.validate()?;
        Ok(Self {
            pool: Arc::new(pool),
            schema: Arc::new(schema),
        })
    }

    pub fn schema(&self) -> &StockSchema {
        &self.schema
    }
}

#[async_trait::async_trait]
impl StockStorage for PostgresStockStorage {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StorageError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresStockTransaction {
            tx,
            schema: self.schema.clone(),
        }))
    }
}

/// One open Postgres transaction. Dropping it uncommitted rolls back.
pub struct PostgresStockTransaction {
    tx: Transaction<'static, Postgres>,
    schema: Arc<StockSchema>,
}

impl PostgresStockTransaction {
    async fn order_lines(
        &mut self,
        operation: &'static str,
        lines_table: &str,
        orders_table: &str,
        warehouse: &WarehouseCode,
        flag: StockAffect,
    ) -> Result<Vec<(String, f64, f64, StockAffect)>, StorageError> {
        let sql = format!(
            "SELECT l.referencia, \
                    l.cantidad::double precision AS ordered, \
                    l.servido::double precision AS served, \
                    l.actualizastock::integer AS stock_affect \
             FROM {lines_table} l \
             JOIN {orders_table} p ON l.idpedido = p.idpedido \
             WHERE l.referencia IS NOT NULL \
               AND l.actualizastock = $2 \
               AND p.codalmacen = $1"
        );

        let rows = sqlx::query(&sql)
            .bind(warehouse.as_str())
            .bind(flag.code())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let reference: String = row.try_get("referencia").map_err(|e| decode_error(operation, e))?;
            let ordered: f64 = row.try_get("ordered").map_err(|e| decode_error(operation, e))?;
            let served: f64 = row.try_get("served").map_err(|e| decode_error(operation, e))?;
            let code: i32 = row.try_get("stock_affect").map_err(|e| decode_error(operation, e))?;
            let stock_affect = StockAffect::from_code(code).map_err(|e| decode_error(operation, e))?;
            lines.push((reference, ordered, served, stock_affect));
        }

        debug!(operation, warehouse = %warehouse, rows = lines.len(), "loaded order lines");
        Ok(lines)
    }
}

#[async_trait::async_trait]
impl StockTransaction for PostgresStockTransaction {
    async fn sources(&mut self) -> Result<SourceSet, StorageError> {
        let schema = &self.schema;
        let wanted: Vec<String> = vec![
            schema.stock.clone(),
            schema.movements.clone(),
            schema.purchase_lines.clone(),
            schema.purchase_orders.clone(),
            schema.sales_lines.clone(),
            schema.sales_orders.clone(),
        ];

        let rows = sqlx::query(
            r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_name = ANY($1)
            "#,
        )
        .bind(&wanted[..])
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("sources", e))?;

        let mut present = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("table_name").map_err(|e| decode_error("sources", e))?;
            present.push(name);
        }
        let exists = |table: &str| present.iter().any(|p| p == table);

        Ok(SourceSet {
            stock: exists(schema.stock.as_str()),
            movements: exists(schema.movements.as_str()),
            purchase_lines: exists(schema.purchase_lines.as_str()) && exists(schema.purchase_orders.as_str()),
            sales_lines: exists(schema.sales_lines.as_str()) && exists(schema.sales_orders.as_str()),
        })
    }

    async fn warehouses(&mut self) -> Result<Vec<WarehouseCode>, StorageError> {
        let sql = format!("SELECT codalmacen FROM {} ORDER BY codalmacen", self.schema.warehouses);
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("warehouses", e))?;

        let mut codes = Vec::with_capacity(rows.len());
        for row in rows {
            let code: String = row.try_get("codalmacen").map_err(|e| decode_error("warehouses", e))?;
            codes.push(WarehouseCode::new(code).map_err(|e| decode_error("warehouses", e))?);
        }
        Ok(codes)
    }

    async fn movements(&mut self, warehouse: &WarehouseCode) -> Result<Vec<MovementEntry>, StorageError> {
        let sql = format!(
            "SELECT referencia, SUM(cantidad)::double precision AS total \
             FROM {} \
             WHERE codalmacen = $1 AND referencia IS NOT NULL \
             GROUP BY referencia",
            self.schema.movements
        );
        let rows = sqlx::query(&sql)
            .bind(warehouse.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("movements", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let reference: String = row.try_get("referencia").map_err(|e| decode_error("movements", e))?;
            let total: Option<f64> = row.try_get("total").map_err(|e| decode_error("movements", e))?;
            entries.push(MovementEntry::new(warehouse.clone(), reference, total.unwrap_or(0.0)));
        }
        Ok(entries)
    }

    async fn purchase_lines(&mut self, warehouse: &WarehouseCode) -> Result<Vec<PurchaseLine>, StorageError> {
        let schema = self.schema.clone();
        let rows = self
            .order_lines(
                "purchase_lines",
                &schema.purchase_lines,
                &schema.purchase_orders,
                warehouse,
                StockAffect::PendingReceipt,
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|(reference, ordered, served, flag)| {
                PurchaseLine::new(warehouse.clone(), reference, ordered, served, flag)
            })
            .collect())
    }

    async fn sales_lines(&mut self, warehouse: &WarehouseCode) -> Result<Vec<SalesLine>, StorageError> {
        let schema = self.schema.clone();
        let rows = self
            .order_lines(
                "sales_lines",
                &schema.sales_lines,
                &schema.sales_orders,
                warehouse,
                StockAffect::Reserve,
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|(reference, ordered, served, flag)| SalesLine::new(warehouse.clone(), reference, ordered, served, flag))
            .collect())
    }

    async fn zero_stock(&mut self) -> Result<u64, StorageError> {
        let sql = format!(
            "UPDATE {} SET cantidad = 0, disponible = 0, pterecibir = 0, reservada = 0",
            self.schema.stock
        );
        let result = sqlx::query(&sql)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("zero_stock", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn create_stock_table(&mut self) -> Result<(), StorageError> {
        let sql = create_stock_table_sql(&self.schema.stock);
        sqlx::query(&sql)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("create_stock_table", e))?;
        debug!(table = %self.schema.stock, "stock table ensured");
        Ok(())
    }

    async fn find_stock(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        let sql = format!(
            "SELECT cantidad::double precision AS cantidad, \
                    pterecibir::double precision AS pterecibir, \
                    reservada::double precision AS reservada, \
                    disponible::double precision AS disponible \
             FROM {} \
             WHERE codalmacen = $1 AND referencia = $2 \
             LIMIT 1",
            self.schema.stock
        );
        let row = sqlx::query(&sql)
            .bind(key.warehouse.as_str())
            .bind(key.reference.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_stock", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = StockRecord::new(key.clone());
        record.on_hand = row.try_get("cantidad").map_err(|e| decode_error("find_stock", e))?;
        record.pending_receipt = row.try_get("pterecibir").map_err(|e| decode_error("find_stock", e))?;
        record.reserved = row.try_get("reservada").map_err(|e| decode_error("find_stock", e))?;
        record.available = row.try_get("disponible").map_err(|e| decode_error("find_stock", e))?;
        Ok(Some(record))
    }

    async fn update_stock(&mut self, record: &StockRecord) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE {} SET cantidad = $3, pterecibir = $4, reservada = $5 \
             WHERE codalmacen = $1 AND referencia = $2",
            self.schema.stock
        );
        let result = sqlx::query(&sql)
            .bind(record.warehouse().as_str())
            .bind(record.reference().as_str())
            .bind(record.on_hand)
            .bind(record.pending_receipt)
            .bind(record.reserved)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Query {
                operation: "update_stock",
                message: format!("no stock record for {}", record.key()),
            });
        }
        Ok(())
    }

    async fn insert_stock(&mut self, record: &StockRecord) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} (codalmacen, referencia, cantidad, pterecibir, reservada, disponible) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.schema.stock
        );
        sqlx::query(&sql)
            .bind(record.warehouse().as_str())
            .bind(record.reference().as_str())
            .bind(record.on_hand)
            .bind(record.pending_receipt)
            .bind(record.reserved)
            .bind(record.available)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_stock", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// DDL for the stock table, keyed by (warehouse, reference).
fn create_stock_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            idstock     SERIAL PRIMARY KEY,
            codalmacen  VARCHAR NOT NULL,
            referencia  VARCHAR NOT NULL,
            cantidad    DOUBLE PRECISION NOT NULL DEFAULT 0,
            disponible  DOUBLE PRECISION NOT NULL DEFAULT 0,
            pterecibir  DOUBLE PRECISION NOT NULL DEFAULT 0,
            reservada   DOUBLE PRECISION NOT NULL DEFAULT 0,
            UNIQUE (codalmacen, referencia)
        )
        "#
    )
}

fn decode_error(operation: &'static str, err: impl core::fmt::Display) -> StorageError {
    StorageError::Decode {
        operation,
        message: err.to_string(),
    }
}

/// Map SQLx errors to storage errors tagged with the failing operation.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StorageError {
    let transaction_control = matches!(operation, "begin" | "commit" | "rollback");

    let message = match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!("database error {}: {}", code, db_err.message()),
            None => format!("database error: {}", db_err.message()),
        },
        sqlx::Error::PoolClosed => "connection pool closed".to_string(),
        sqlx::Error::PoolTimedOut => "timed out waiting for a pooled connection".to_string(),
        sqlx::Error::ColumnNotFound(column) => {
            return StorageError::Decode {
                operation,
                message: format!("column not found: {column}"),
            };
        }
        other => format!("sqlx error: {other}"),
    };

    if transaction_control {
        StorageError::Transaction { operation, message }
    } else {
        StorageError::Query { operation, message }
    }
}
