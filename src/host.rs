//! # Local Host
//!
//! An in-process host for the module: it provides the facilities the module
//! needs at start-up, owns protection domains and execution contexts, and
//! implements the call context syscalls use to find their PDPI and to
//! allocate public memory.
//!
//! Execution contexts are addressed by the PD index the interpreter passes as
//! the first scalar argument of every syscall.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::module::{Logger, Module};
use crate::module_api::{
    Facility, FacilityProvider, ModuleError, ModuleId, ModuleResult, PdpiInfo, SyscallCall, SyscallContext,
    LOGGER_FACILITY, PROFILER_FACILITY,
};
use crate::profiler::ExecutionProfiler;
use crate::protection_domain::{Pdpi, ProtectionDomain};
use crate::syscalls::PDK_INDEX;

/// Named facilities offered to the module at start-up
#[derive(Default)]
pub struct HostFacilities {
    facilities: FxHashMap<String, Facility>,
}

impl HostFacilities {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Logger bound to the current subscriber plus a fresh profiler
    pub fn standard() -> Self {
        let mut facilities = Self::empty();
        facilities.insert(LOGGER_FACILITY, Arc::new(Logger::from_current()));
        facilities.insert(PROFILER_FACILITY, Arc::new(ExecutionProfiler::new()));
        facilities
    }

    pub fn insert(&mut self, name: &str, facility: Facility) -> &mut Self {
        self.facilities.insert(name.to_string(), facility);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Facility> {
        self.facilities.remove(name)
    }
}

impl FacilityProvider for HostFacilities {
    fn module_facility(&self, name: &str) -> Option<Facility> {
        self.facilities.get(name).cloned()
    }
}

struct HostContext {
    pdpi: Box<dyn Any>,
    pdk_index: usize,
    module_id: ModuleId,
}

/// In-process host owning one module instance
pub struct LocalHost {
    module: Module,
    domains: FxHashMap<String, Arc<ProtectionDomain>>,
    contexts: FxHashMap<u64, HostContext>,
    next_pd_index: u64,
    public_memory: FxHashMap<u64, Vec<u8>>,
    next_public_handle: u64,
}

impl LocalHost {
    /// Start a host with the standard facilities
    pub fn new() -> ModuleResult<Self> {
        Self::with_facilities(&HostFacilities::standard())
    }

    pub fn with_facilities(facilities: &HostFacilities) -> ModuleResult<Self> {
        let module = Module::initialize(facilities)?;
        Ok(LocalHost {
            module,
            domains: FxHashMap::default(),
            contexts: FxHashMap::default(),
            next_pd_index: 1,
            public_memory: FxHashMap::default(),
            next_public_handle: 1,
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn profiler(&self) -> &Arc<ExecutionProfiler> {
        self.module.profiler()
    }

    /// Start the protection domain `name` from its configuration file
    pub fn start_domain(&mut self, name: &str, configuration_path: &Path) -> ModuleResult {
        let domain = self.module.pd_startup(name, configuration_path)?;
        if let Some(previous) = self.domains.insert(name.to_string(), domain) {
            self.module.pd_shutdown(previous);
        }
        Ok(())
    }

    /// Stop a protection domain and every execution context running in it
    ///
    /// Returns false if no such domain was started.
    pub fn stop_domain(&mut self, name: &str) -> bool {
        let Some(domain) = self.domains.remove(name) else {
            return false;
        };

        let indices: Vec<u64> = self
            .contexts
            .iter()
            .filter(|(_, context)| {
                context
                    .pdpi
                    .downcast_ref::<Pdpi>()
                    .is_some_and(|pdpi| pdpi.context().pd_name() == name)
            })
            .map(|(index, _)| *index)
            .collect();
        for index in indices {
            self.stop_process(index);
        }

        self.module.pd_shutdown(domain);
        true
    }

    /// Start an execution context in the domain `pd_name`
    ///
    /// # Returns
    /// The PD index the interpreter passes as the first syscall argument.
    pub fn start_process(&mut self, pd_name: &str) -> ModuleResult<u64> {
        let Some(domain) = self.domains.get(pd_name) else {
            debug!("No protection domain named '{}'", pd_name);
            return Err(ModuleError::InvalidCall);
        };
        let pdpi = self.module.pdpi_startup(domain)?;
        let module_id = self.module.id();
        Ok(self.attach_context(Box::new(pdpi), PDK_INDEX, module_id))
    }

    /// Stop an execution context, returning how many vectors it still held
    pub fn stop_process(&mut self, pd_index: u64) -> Option<usize> {
        let context = self.contexts.remove(&pd_index)?;
        match context.pdpi.downcast::<Pdpi>() {
            Ok(pdpi) => {
                let released = self.module.pdpi_shutdown(*pdpi);
                info!("Stopped process {} ({} vectors released)", pd_index, released);
                Some(released)
            }
            Err(_) => Some(0),
        }
    }

    /// Register a context that does not belong to this module
    ///
    /// Syscalls addressed to it must be rejected during PDPI resolution.
    pub fn attach_foreign_context(&mut self, pdpi: Box<dyn Any>, pdk_index: usize, module_id: ModuleId) -> u64 {
        self.attach_context(pdpi, pdk_index, module_id)
    }

    fn attach_context(&mut self, pdpi: Box<dyn Any>, pdk_index: usize, module_id: ModuleId) -> u64 {
        let index = self.next_pd_index;
        self.next_pd_index += 1;
        self.contexts.insert(
            index,
            HostContext {
                pdpi,
                pdk_index,
                module_id,
            },
        );
        index
    }

    pub fn pdpi(&self, pd_index: u64) -> Option<&Pdpi> {
        self.contexts.get(&pd_index)?.pdpi.downcast_ref::<Pdpi>()
    }

    /// Invoke the syscall registered under its fully qualified `name`
    pub fn syscall(&mut self, name: &str, call: &mut SyscallCall<'_, '_>) -> ModuleResult {
        let Some(definition) = self.module.syscall(name).cloned() else {
            debug!("Unknown syscall {}", name);
            return Err(ModuleError::InvalidCall);
        };
        definition.invoke(call, self)
    }

    pub fn public_memory(&self, handle: u64) -> Option<&[u8]> {
        self.public_memory.get(&handle).map(Vec::as_slice)
    }
}

impl SyscallContext for LocalHost {
    fn module_id(&self) -> ModuleId {
        self.module.id()
    }

    fn pdpi_info(&mut self, pd_index: u64) -> Option<PdpiInfo<'_>> {
        let context = self.contexts.get_mut(&pd_index)?;
        Some(PdpiInfo {
            pdpi: context.pdpi.as_mut(),
            pdk_index: context.pdk_index,
            module_id: context.module_id,
        })
    }

    fn public_alloc(&mut self, size: u64) -> Option<u64> {
        let size = usize::try_from(size).ok()?;
        let mut block = Vec::new();
        block.try_reserve_exact(size).ok()?;
        block.resize(size, 0);

        let handle = self.next_public_handle;
        self.next_public_handle += 1;
        self.public_memory.insert(handle, block);
        Some(handle)
    }

    fn public_mem_mut(&mut self, handle: u64) -> Option<&mut [u8]> {
        self.public_memory.get_mut(&handle).map(Vec::as_mut_slice)
    }

    fn public_free(&mut self, handle: u64) -> bool {
        self.public_memory.remove(&handle).is_some()
    }
}

impl Drop for LocalHost {
    fn drop(&mut self) {
        let indices: Vec<u64> = self.contexts.keys().copied().collect();
        for index in indices {
            self.stop_process(index);
        }
        for (_, domain) in self.domains.drain() {
            self.module.pd_shutdown(domain);
        }
        // The module field is dropped last and logs its deinitialization.
    }
}
