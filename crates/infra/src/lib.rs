//! Infrastructure layer: storage adapters, config, audit, and the rebuild orchestrator.

pub mod audit;
pub mod config;
pub mod rebuild;
pub mod storage;


pub use audit::{AuditEntry, AuditLevel, AuditSink, RecordingAuditSink, TracingAuditSink, REBUILT_STOCK};
pub use config::{ConfigError, StockRebuildConfig, StockSchema};
pub use rebuild::{RebuildError, RebuildPhase, RebuildReport, StockRebuild};
pub use storage::{
    DataSource, FailurePoint, InMemoryStockStorage, PostgresStockStorage, SourceSet, StockDataset,
    StockStorage, StockTransaction, StorageError,
};
