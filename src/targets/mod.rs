//! Target subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     TargetSpec[] (URL string or object)
//!     → registry.rs (parse, merge defaults, validate)
//!     → TargetRegistry (immutable descriptors + rotation counter)
//!
//! Per request:
//!     → round_robin.rs (atomic increment-and-wrap)
//!     → Arc<TargetDescriptor>
//! ```
//!
//! # Design Decisions
//! - Specs are interpreted once at startup, never per request
//! - The only shared mutable state is the rotation counter
//! - A single configured target skips the counter entirely

pub mod registry;
pub mod round_robin;

pub use registry::{
    resolve, RequestOverrides, Scheme, TargetDefaults, TargetDescriptor, TargetError, TargetRegistry,
};
pub use round_robin::RoundRobin;
