//! Warehouse collaborator: the narrow [`QueryBackend`] interface, its
//! ClickHouse and in-memory implementations, and the SQL plan built from a
//! resolved configuration.

pub mod analysis;
pub mod backend;
pub mod clickhouse_backend;
pub mod recording;
pub mod sql;

pub use analysis::{Analysis, AnalysisWindow, PlannedQuery};
pub use backend::{QueryBackend, TableLabels, TableMetadata, WarehouseError, LAST_UPDATED_LABEL};
pub use clickhouse_backend::ClickHouseBackend;
pub use recording::{RecordedQuery, RecordingBackend};
