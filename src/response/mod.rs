//! Response side: payload schema, dedup registry, dispatcher and audit trail.

pub mod audit;
pub mod dispatcher;
pub mod payload;
pub mod registry;

pub use audit::AuditLog;
pub use dispatcher::{DispatchOutcome, DispatcherSettings, ResponseDispatcher};
pub use payload::{PayloadSchema, SchemaEntry};
pub use registry::{Reservation, ResponseRegistry, MAX_ATTEMPTS};
