//! # Protection Domains and Their Instances
//!
//! A `ProtectionDomain` is the immutable, named configuration loaded at PD
//! start-up. Every execution context running inside the domain gets its own
//! `Pdpi` (protection domain process instance), which owns a private handle
//! heap and shares the domain's read-only state through a `PdpiContext`.
//!
//! Shutting a PDPI down sweeps its heap, releasing every vector the
//! interpreter did not delete explicitly.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::configuration::{ConfigurationError, PdConfiguration};
use crate::heap::{Handle, HandleHeap, HeapError};
use crate::model_evaluator::{CostModelEvaluator, TIME_MODEL};
use crate::profiler::ExecutionProfiler;
use crate::share_vector::ShareVec;
use crate::value_traits::ShareValue;

/// Named, immutable protection domain configuration
pub struct ProtectionDomain {
    name: String,
    configuration: PdConfiguration,
    model_evaluator: Arc<CostModelEvaluator>,
    profiler: Arc<ExecutionProfiler>,
}

impl ProtectionDomain {
    /// Load the domain configuration and its cost models
    ///
    /// # Arguments
    /// * `name` - Protection domain name
    /// * `configuration_path` - Path of the domain's TOML configuration
    /// * `profiler` - Module-wide profiling sink
    pub fn new(
        name: &str,
        configuration_path: &Path,
        profiler: Arc<ExecutionProfiler>,
    ) -> Result<Self, ConfigurationError> {
        let configuration = PdConfiguration::load(configuration_path)?;
        let model_evaluator = configuration.load_model_evaluator()?;
        info!(
            pd = name,
            models = model_evaluator.model_count(TIME_MODEL),
            "Loaded protection domain configuration"
        );
        Ok(ProtectionDomain {
            name: name.to_string(),
            configuration,
            model_evaluator: Arc::new(model_evaluator),
            profiler,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configuration(&self) -> &PdConfiguration {
        &self.configuration
    }

    pub fn model_evaluator(&self) -> &CostModelEvaluator {
        &self.model_evaluator
    }
}

/// Read-only view of the owning domain, shared by a PDPI and its protocols
#[derive(Clone)]
pub struct PdpiContext {
    domain: Arc<ProtectionDomain>,
}

impl PdpiContext {
    pub fn pd_name(&self) -> &str {
        &self.domain.name
    }

    pub fn configuration(&self) -> &PdConfiguration {
        &self.domain.configuration
    }

    pub fn model_evaluator(&self) -> &Arc<CostModelEvaluator> {
        &self.domain.model_evaluator
    }

    pub fn profiler(&self) -> &Arc<ExecutionProfiler> {
        &self.domain.profiler
    }

    /// Record a profiling section for `name` if a time model is configured for it
    pub fn profile(&self, name: &str, parameter: u64) {
        let Some(model) = self.domain.model_evaluator.model(TIME_MODEL, name) else {
            return;
        };
        let profiler = &self.domain.profiler;
        let section_type = profiler.new_section_type(name);
        profiler.add_section(section_type, parameter, profiler.now(), model.evaluate(parameter));
    }
}

/// Per-execution-context state: the heap plus a view of the domain
pub struct Pdpi {
    context: PdpiContext,
    heap: HandleHeap,
}

impl Pdpi {
    pub fn new(domain: Arc<ProtectionDomain>) -> Result<Self, HeapError> {
        Ok(Pdpi {
            context: PdpiContext { domain },
            heap: HandleHeap::new()?,
        })
    }

    pub fn context(&self) -> &PdpiContext {
        &self.context
    }

    pub fn heap(&self) -> &HandleHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut HandleHeap {
        &mut self.heap
    }

    /// Borrow the shared context and the heap at the same time
    pub fn split_mut(&mut self) -> (&PdpiContext, &mut HandleHeap) {
        (&self.context, &mut self.heap)
    }

    pub fn is_valid_handle<T: ShareValue>(&self, handle: Handle) -> bool {
        self.heap.is_valid_handle::<T>(handle)
    }

    pub fn register_vector<T: ShareValue>(&mut self, vector: ShareVec<T>) -> Result<Handle, HeapError> {
        self.heap.insert(vector)
    }

    pub fn free_registered_vector(&mut self, handle: Handle) -> bool {
        self.heap.erase(handle)
    }

    /// Release every live vector; returns how many were released
    pub fn shutdown(&mut self) -> usize {
        let released = self.heap.sweep();
        debug!(pd = self.context.pd_name(), released, "PDPI heap swept");
        released
    }
}

impl Drop for Pdpi {
    fn drop(&mut self) {
        if !self.heap.is_empty() {
            self.shutdown();
        }
    }
}
