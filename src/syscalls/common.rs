//! Shared skeleton for every syscall: argument-shape check, context
//! resolution, panic containment and profiling.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::module_api::{CodeBlock, ModuleError, ModuleResult, SyscallCall, SyscallContext};
use crate::protection_domain::Pdpi;
use crate::protocols::ProtocolResult;

/// Index of this module's only protection domain kind
pub const PDK_INDEX: usize = 0;

/// Prefix of every registered syscall name
pub const MODULE_NAME: &str = "stoffel_share";

/// Whether a syscall expects a return slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnSlot {
    Forbidden,
    Required,
    Optional,
}

impl ReturnSlot {
    fn accepts(self, present: bool) -> bool {
        match self {
            ReturnSlot::Forbidden => !present,
            ReturnSlot::Required => present,
            ReturnSlot::Optional => true,
        }
    }
}

/// Accepted argument layout of a syscall
///
/// Counts are inclusive ranges; most syscalls accept exactly one count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgShape {
    args: (usize, usize),
    ret: ReturnSlot,
    refs: (usize, usize),
    crefs: (usize, usize),
}

impl ArgShape {
    pub const fn exact(num_args: usize, needs_return: bool, num_refs: usize, num_crefs: usize) -> Self {
        ArgShape {
            args: (num_args, num_args),
            ret: if needs_return {
                ReturnSlot::Required
            } else {
                ReturnSlot::Forbidden
            },
            refs: (num_refs, num_refs),
            crefs: (num_crefs, num_crefs),
        }
    }

    pub const fn with_args(mut self, min: usize, max: usize) -> Self {
        self.args = (min, max);
        self
    }

    pub const fn with_refs(mut self, min: usize, max: usize) -> Self {
        self.refs = (min, max);
        self
    }

    pub const fn with_return(mut self, ret: ReturnSlot) -> Self {
        self.ret = ret;
        self
    }

    pub fn return_slot(&self) -> ReturnSlot {
        self.ret
    }

    /// True iff `call` carries an acceptable number of each argument kind
    pub fn check(&self, call: &SyscallCall<'_, '_>) -> bool {
        let within = |(min, max): (usize, usize), n: usize| min <= n && n <= max;
        within(self.args, call.args.len())
            && self.ret.accepts(call.has_return())
            && within(self.refs, call.num_refs())
            && within(self.crefs, call.num_crefs())
    }
}

/// Find the PDPI a call addresses
///
/// `args[0]` carries the PD index. The context must belong to this module's
/// protection domain kind and to the module executing the call.
pub fn resolve_pdpi<'a>(ctx: &'a mut dyn SyscallContext, args: &[CodeBlock]) -> Option<&'a mut Pdpi> {
    let pd_index = args.first()?.uint64();
    let module_id = ctx.module_id();
    let info = ctx.pdpi_info(pd_index)?;

    if info.pdk_index != PDK_INDEX {
        debug!("PD {} belongs to protection domain kind {}", pd_index, info.pdk_index);
        return None;
    }
    if info.module_id != module_id {
        debug!("PD {} belongs to another module", pd_index);
        return None;
    }
    let pdpi: &'a mut (dyn Any + 'static) = info.pdpi;
    pdpi.downcast_mut::<Pdpi>()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// Run `body`, turning a panic into `OperationFailed`
pub fn guard<R>(name: &str, body: impl FnOnce() -> ModuleResult<R>) -> ModuleResult<R> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => {
            error!("Syscall {} panicked: {}", name, panic_message(payload.as_ref()));
            Err(ModuleError::OperationFailed)
        }
    }
}

/// Run a protocol invocation, mapping failures and panics to `OperationFailed`
pub fn invoke_protocol(name: &str, invoke: impl FnOnce() -> ProtocolResult) -> ModuleResult {
    match panic::catch_unwind(AssertUnwindSafe(invoke)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!("Protocol of {} failed: {}", name, e);
            Err(ModuleError::OperationFailed)
        }
        Err(payload) => {
            error!("Protocol of {} panicked: {}", name, panic_message(payload.as_ref()));
            Err(ModuleError::OperationFailed)
        }
    }
}

/// Common syscall skeleton
///
/// # Arguments
/// * `name` - Fully qualified syscall name, used for logging and profiling
/// * `shape` - Accepted argument layout
/// * `body` - Operation; returns the profiling size parameter
///
/// # Returns
/// `InvalidCall` on a shape or context mismatch, otherwise the body's result.
/// A profiling section is recorded only when the body succeeds.
pub fn run<F>(
    name: &str,
    shape: &ArgShape,
    call: &mut SyscallCall<'_, '_>,
    ctx: &mut dyn SyscallContext,
    body: F,
) -> ModuleResult
where
    F: FnOnce(&mut Pdpi, &mut SyscallCall<'_, '_>) -> ModuleResult<u64>,
{
    if !shape.check(call) {
        debug!("Syscall {} called with an invalid argument layout", name);
        return Err(ModuleError::InvalidCall);
    }
    let Some(pdpi) = resolve_pdpi(ctx, call.args) else {
        debug!("Syscall {} could not resolve its PDPI", name);
        return Err(ModuleError::InvalidCall);
    };

    let parameter = guard(name, || body(&mut *pdpi, call))?;
    pdpi.context().profile(name, parameter);
    Ok(())
}
