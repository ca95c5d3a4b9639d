//! iotopd - disk throughput sampling library.
//!
//! Supervises an external `iotop` process, parses its periodic summary
//! lines into bitrate samples, and hands them to a polling host through a
//! plugin-style lifecycle (`configure` / `init` / `read` / `shutdown`).

pub mod parser;
pub mod plugin;
pub mod supervisor;
pub mod timestamp;
pub mod worker;
