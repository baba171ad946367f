//! Resilient model client.
//!
//! The public surface is [`ModelClient`] plus its builder and per-call
//! [`InvokeOptions`]. Retry policy, audit records, JSON handling and snapshots
//! live in submodules under `src/client/`.

pub mod audit;
pub mod builder;
pub mod core;
pub mod policy;
pub mod signals;
pub mod structured;

pub use audit::AuditLog;
pub use builder::{ModelClientBuilder, DEFAULT_MODEL_ID};
pub use self::core::{ChunkCallback, GenerationDefaults, InvokeOptions, ModelClient};
pub use policy::RetryPolicy;
pub use signals::ClientSignals;
