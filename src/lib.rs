//! # Stoffel Share PDK
//!
//! Boundary layer between an untrusted bytecode interpreter and a
//! secret-sharing computation engine. The interpreter only ever holds opaque
//! handles to vectors of shared unsigned integers; every syscall validates
//! its argument layout, the execution context it addresses and each handle's
//! liveness and type before touching any data.

pub mod configuration;
pub mod heap;
pub mod host;
pub mod model_evaluator;
pub mod module;
pub mod module_api;
pub mod profiler;
pub mod protection_domain;
pub mod protocols;
pub mod share_vector;
pub mod syscalls;
pub mod value_traits;

#[cfg(test)]
mod tests;

pub use heap::{Handle, HandleHeap};
pub use host::{HostFacilities, LocalHost};
pub use module::{Logger, Module};
pub use module_api::{CReference, CodeBlock, ModuleError, ModuleResult, Reference, SyscallCall};
pub use share_vector::{AnyShareVec, ShareVec};
pub use value_traits::{SfUint32, SfUint64, ShareValue, TypeTag};
