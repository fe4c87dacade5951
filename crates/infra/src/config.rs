//! Configuration loading and representation.
//!
//! Everything has a default matching the ERP's stock schema; environment variables only
//! override table names (for prefixed or renamed deployments) and supply the database
//! URL for callers that open their own pool.

use thiserror::Error;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid table name: {value:?}")]
    InvalidTableName { key: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Names of the tables a rebuild reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockSchema {
    pub warehouses: String,
    pub stock: String,
    pub movements: String,
    pub purchase_lines: String,
    pub purchase_orders: String,
    pub sales_lines: String,
    pub sales_orders: String,
}

impl Default for StockSchema {
    fn default() -> Self {
        Self {
            warehouses: "almacenes".to_string(),
            stock: "stocks".to_string(),
            movements: "stocks_movimientos".to_string(),
            purchase_lines: "lineaspedidosprov".to_string(),
            purchase_orders: "pedidosprov".to_string(),
            sales_lines: "lineaspedidoscli".to_string(),
            sales_orders: "pedidoscli".to_string(),
        }
    }
}

impl StockSchema {
    fn tables(&self) -> [(&'static str, &str); 7] {
        [
            ("STOCK_REBUILD_TABLE_WAREHOUSES", self.warehouses.as_str()),
            ("STOCK_REBUILD_TABLE_STOCK", self.stock.as_str()),
            ("STOCK_REBUILD_TABLE_MOVEMENTS", self.movements.as_str()),
            ("STOCK_REBUILD_TABLE_PURCHASE_LINES", self.purchase_lines.as_str()),
            ("STOCK_REBUILD_TABLE_PURCHASE_ORDERS", self.purchase_orders.as_str()),
            ("STOCK_REBUILD_TABLE_SALES_LINES", self.sales_lines.as_str()),
            ("STOCK_REBUILD_TABLE_SALES_ORDERS", self.sales_orders.as_str()),
        ]
    }

    /// Table names are spliced into SQL, so they must be plain identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in self.tables() {
            if !is_identifier(value) {
                return Err(ConfigError::InvalidTableName {
                    key,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Stock rebuild configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockRebuildConfig {
    pub database_url: Option<String>,
    pub schema: StockSchema,
}

impl StockRebuildConfig {
    /// Load from process environment (`DATABASE_URL`, `STOCK_REBUILD_TABLE_*`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut schema = StockSchema::default();
        let overrides: [(&str, &mut String); 7] = [
            ("STOCK_REBUILD_TABLE_WAREHOUSES", &mut schema.warehouses),
            ("STOCK_REBUILD_TABLE_STOCK", &mut schema.stock),
            ("STOCK_REBUILD_TABLE_MOVEMENTS", &mut schema.movements),
            ("STOCK_REBUILD_TABLE_PURCHASE_LINES", &mut schema.purchase_lines),
            ("STOCK_REBUILD_TABLE_PURCHASE_ORDERS", &mut schema.purchase_orders),
            ("STOCK_REBUILD_TABLE_SALES_LINES", &mut schema.sales_lines),
            ("STOCK_REBUILD_TABLE_SALES_ORDERS", &mut schema.sales_orders),
        ];
        for (key, slot) in overrides {
            if let Some(value) = get(key) {
                *slot = value.trim().to_string();
            }
        }
        schema.validate()?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            schema,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}
