//! Shared payloads and pure helpers for the invoiceflow pipeline.
//!
//! Everything that crosses a process boundary lives here: the job lifecycle
//! events carried by the bus, the in-memory invoice shapes handed from
//! sources to exports, and the date/template helpers both sides agree on.

pub mod dates;
pub mod defaults;
pub mod events;
pub mod invoice;
pub mod template;

pub use events::{JobCompletedEvent, JobFailedEvent, JobStartedEvent, JobStats};
pub use invoice::{Invoice, InvoiceData};
pub use template::{render_template, validate_template, TemplateContext, TemplateError};
