pub mod config;
pub mod controller;
pub mod interval;
pub mod render;
pub mod snapshot;
pub mod storage;

pub use config::AppConfig;
pub use controller::{CycleController, CycleOutcome, CycleReport, ImportOutcome};
pub use interval::{smart_interval, smart_interval_secs};
pub use render::LogRenderer;
pub use snapshot::{Snapshot, SnapshotConfig};
pub use storage::{MemoryStore, SqliteStateStore};
