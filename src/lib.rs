//! Label and box-mark production for distribution workbooks.
//!
//! A run reads the distribution sheets of a workbook, copies the matching
//! `.pld` label templates into per-shop folders and rewrites their dates,
//! then fills one box-mark template per destination from the box-mark sheet.

pub mod commands;
pub mod core;
pub mod logging;
pub mod models;
pub mod utils;

pub use commands::{process_workbook, spawn_batch, RunResult};
pub use models::{LabelBoxError, OutputMode, RunConfig, TypeMode};
pub use utils::progress::{ChannelProgress, NoopProgress, ProgressSink, RunEvent};
