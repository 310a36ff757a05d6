//! # Module API
//!
//! Types that cross the boundary between the host interpreter and this
//! module:
//!
//! - `CodeBlock`: one scalar stack word
//! - `Reference` / `CReference`: mutable / immutable byte buffers owned by the host
//! - `SyscallCall`: the flat argument bundle every syscall receives
//! - `SyscallContext`: host services available while a syscall runs
//! - `FacilityProvider`: host services available at module start-up
//! - `ModuleError`: the fixed status vocabulary reported back to the host
//!
//! Byte buffers supplied by the host are, by convention, one byte longer than
//! the data they carry (the host never allocates zero-sized blocks). Every
//! size check in the syscalls accounts for that trailing byte.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::heap::Handle;

/// One scalar word on the interpreter stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CodeBlock(u64);

impl CodeBlock {
    pub const fn from_u64(value: u64) -> Self {
        CodeBlock(value)
    }

    pub const fn from_u32(value: u32) -> Self {
        CodeBlock(value as u64)
    }

    pub const fn from_handle(handle: Handle) -> Self {
        CodeBlock(handle.raw())
    }

    /// Low 32 bits of the word
    pub const fn uint32(self) -> u32 {
        self.0 as u32
    }

    pub const fn uint64(self) -> u64 {
        self.0
    }

    pub const fn handle(self) -> Handle {
        Handle::from_raw(self.0)
    }

    pub fn set_uint64(&mut self, value: u64) {
        self.0 = value;
    }

    pub fn set_handle(&mut self, handle: Handle) {
        self.0 = handle.raw();
    }
}

/// Mutable byte buffer in host memory
pub struct Reference<'m> {
    data: &'m mut [u8],
}

impl<'m> Reference<'m> {
    pub fn new(data: &'m mut [u8]) -> Self {
        Reference { data }
    }

    /// Allocated size in bytes, including the trailing convention byte
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data
    }
}

/// Immutable byte buffer in host memory
#[derive(Clone, Copy)]
pub struct CReference<'m> {
    data: &'m [u8],
}

impl<'m> CReference<'m> {
    pub fn new(data: &'m [u8]) -> Self {
        CReference { data }
    }

    /// Allocated size in bytes, including the trailing convention byte
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &'m [u8] {
        self.data
    }
}

/// Arguments of one syscall invocation
///
/// An absent reference list and an empty one both mean "no references".
pub struct SyscallCall<'c, 'm> {
    pub args: &'c [CodeBlock],
    pub refs: Option<&'c mut [Reference<'m>]>,
    pub crefs: Option<&'c [CReference<'m>]>,
    pub return_value: Option<&'c mut CodeBlock>,
}

impl<'c, 'm> SyscallCall<'c, 'm> {
    pub fn new(args: &'c [CodeBlock]) -> Self {
        SyscallCall {
            args,
            refs: None,
            crefs: None,
            return_value: None,
        }
    }

    pub fn with_refs(mut self, refs: &'c mut [Reference<'m>]) -> Self {
        self.refs = Some(refs);
        self
    }

    pub fn with_crefs(mut self, crefs: &'c [CReference<'m>]) -> Self {
        self.crefs = Some(crefs);
        self
    }

    pub fn with_return(mut self, return_value: &'c mut CodeBlock) -> Self {
        self.return_value = Some(return_value);
        self
    }

    pub fn num_refs(&self) -> usize {
        self.refs.as_ref().map_or(0, |refs| refs.len())
    }

    pub fn num_crefs(&self) -> usize {
        self.crefs.map_or(0, |crefs| crefs.len())
    }

    pub fn has_return(&self) -> bool {
        self.return_value.is_some()
    }

    /// First mutable reference, if any
    pub fn first_ref(&mut self) -> Option<&mut Reference<'m>> {
        self.refs.as_deref_mut().and_then(|refs| refs.first_mut())
    }

    /// First immutable reference, if any
    pub fn first_cref(&self) -> Option<CReference<'m>> {
        self.crefs.and_then(|crefs| crefs.first().copied())
    }

    /// Write a word into the return slot if the caller supplied one
    pub fn set_return(&mut self, value: u64) {
        if let Some(slot) = self.return_value.as_deref_mut() {
            slot.set_uint64(value);
        }
    }
}

/// Status vocabulary reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ModuleError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("required facility is missing")]
    MissingFacility,
    #[error("invalid protection domain configuration")]
    InvalidPdConfiguration,
    #[error("invalid call")]
    InvalidCall,
    #[error("operation failed")]
    OperationFailed,
}

pub type ModuleResult<T = ()> = Result<T, ModuleError>;

/// Status code for a successful call
pub const STATUS_OK: u32 = 0;

impl ModuleError {
    /// Numeric status code as seen by the host
    pub const fn code(self) -> u32 {
        match self {
            ModuleError::OutOfMemory => 1,
            ModuleError::MissingFacility => 2,
            ModuleError::InvalidPdConfiguration => 3,
            ModuleError::InvalidCall => 4,
            ModuleError::OperationFailed => 5,
        }
    }

    pub fn status<T>(result: &ModuleResult<T>) -> u32 {
        match result {
            Ok(_) => STATUS_OK,
            Err(e) => e.code(),
        }
    }
}

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a loaded module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u64);

impl ModuleId {
    pub fn next() -> Self {
        ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// What the host knows about an execution context
pub struct PdpiInfo<'a> {
    /// The context object, opaque to the host
    pub pdpi: &'a mut (dyn Any + 'static),
    /// Index of the protection domain kind within its module
    pub pdk_index: usize,
    /// Module that created the context
    pub module_id: ModuleId,
}

/// Host services available during a syscall
pub trait SyscallContext {
    /// Module whose syscall is being executed
    fn module_id(&self) -> ModuleId;

    /// Look up the execution context registered under `pd_index`
    fn pdpi_info(&mut self, pd_index: u64) -> Option<PdpiInfo<'_>>;

    /// Allocate `size` bytes of public interpreter memory
    fn public_alloc(&mut self, size: u64) -> Option<u64>;

    /// Access a public memory block by handle
    fn public_mem_mut(&mut self, handle: u64) -> Option<&mut [u8]>;

    /// Release a public memory block; false if the handle is unknown
    fn public_free(&mut self, handle: u64) -> bool;
}

/// Facility object handed out by the host
pub type Facility = Arc<dyn Any + Send + Sync>;

pub const LOGGER_FACILITY: &str = "Logger";
pub const PROFILER_FACILITY: &str = "Profiler";

/// Host services available at module start-up
pub trait FacilityProvider {
    fn module_facility(&self, name: &str) -> Option<Facility>;
}
