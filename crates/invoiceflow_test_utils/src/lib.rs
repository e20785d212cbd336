//! In-memory doubles and store fixtures for invoiceflow tests.
//!
//! Every double implements the same trait the production wiring uses, so
//! tests exercise the real coordinator/store/handler code with only the
//! outermost I/O swapped out.

pub mod bus;
pub mod clients;
pub mod fixtures;
pub mod sources;

pub use bus::MemoryBus;
pub use clients::{MemoryAccounting, MemoryDrive};
pub use fixtures::PipelineFixture;
pub use sources::ScriptedSource;
