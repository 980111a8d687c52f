//! CLI commands

mod build;
mod clean;
mod clones;
mod devices;
mod multi_scan;
mod runtimes;
mod scan;

pub use build::BuildCommand;
pub use clean::CleanCommand;
pub use clones::ClonesCommand;
pub use devices::DevicesCommand;
pub use multi_scan::MultiScanCommand;
pub use runtimes::RuntimesCommand;
pub use scan::ScanCommand;
