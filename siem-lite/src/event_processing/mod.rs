//! Event Processing Module
//!
//! Key components:
//! - EventParser: wire decoding for pages, stream frames and health
//! - ReconciliationBuffer: bounded, ordered, duplicate-free event window
//! - DashboardSession: buffer plus derived view state behind one lock

pub mod buffer_manager;
pub mod parser;
pub mod processor;

pub use buffer_manager::{AdmissionOutcome, ReconciliationBuffer};
pub use parser::{EventParser, HealthStatus, LogPage, StreamMessage};
pub use processor::{DashboardProjection, DashboardSession, RequestTicket};
