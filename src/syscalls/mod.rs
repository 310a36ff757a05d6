//! # Syscalls
//!
//! The externally callable surface of the module.
//!
//! - `common`: argument-shape checking, PDPI resolution and the dispatch skeleton
//! - `variables`: direct vector operations (create, copy, access, delete)
//! - `meta`: protocol-backed templates over share vectors
//! - `table`: the registration table mapping names to entry points

pub mod common;
pub mod meta;
pub mod table;
pub mod variables;

pub use common::{ArgShape, ReturnSlot, MODULE_NAME, PDK_INDEX};
pub use table::{SyscallDefinition, SyscallFn, SyscallTable, SyscallTableBuilder, TableError};
