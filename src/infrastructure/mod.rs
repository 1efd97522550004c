//! 基础设施层：持有数据库连接，只暴露存储能力

pub mod catalog;
pub mod db;
pub mod job_store;

pub use catalog::{CatalogStore, SqliteCatalog};
pub use job_store::{JobStore, SqliteJobStore};
