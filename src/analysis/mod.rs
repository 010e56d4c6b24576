//! Structural diagnostics over live expression graphs.
pub mod sharing;

pub use sharing::SharingReport;
