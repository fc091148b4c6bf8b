//! enclave-core: configuration, the computation descriptor, and HTTP body
//! types. Every other enclave crate depends on this one.

pub mod computation;
pub mod config;
pub mod wire;

pub use computation::{content_id, Computation};
pub use wire::{PortTriple, RunAck};
