//! Model-level save and load, in memory and on disk.
pub mod config;
pub mod file;
pub mod snapshot;

pub use config::SaveOptions;
pub use file::{load_from_file, read_snapshot, save_to_file, write_snapshot};
pub use snapshot::{load, save, Bounds, ModelSnapshot};
