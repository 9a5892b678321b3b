//! Background poll loop.

mod interval;
mod service;

pub use interval::IntervalPolicy;
pub use service::{CycleReport, MonitorConfig, PostingMonitor};
