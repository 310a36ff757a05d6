//! # Execution Profiler
//!
//! Host-provided sink for per-syscall cost samples. Section types are
//! interned by name; each recorded section carries the type, the size
//! parameter of the call, a start timestamp and a modelled duration.
//!
//! The profiler is shared by every protection domain of a module, so all
//! state lives behind a `parking_lot::Mutex`.
//!
//! Sections are kept in a bounded ring: once `capacity` sections are held,
//! each new one evicts the oldest. Hosts collect samples with
//! `drain_sections`; `dropped` counts what was evicted before collection.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Interned section type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionTypeId(u32);

/// One recorded profiling sample
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSection {
    pub section_type: SectionTypeId,
    pub parameter: u64,
    pub start: u64,
    pub duration: f64,
}

/// Sections retained by `ExecutionProfiler::new`
pub const DEFAULT_SECTION_CAPACITY: usize = 1 << 16;

#[derive(Default)]
struct ProfilerState {
    type_ids: FxHashMap<String, SectionTypeId>,
    type_names: Vec<String>,
    sections: VecDeque<ProfileSection>,
    dropped: u64,
}

/// Thread-safe collector of profiling sections
pub struct ExecutionProfiler {
    epoch: Instant,
    capacity: usize,
    state: Mutex<ProfilerState>,
}

impl Default for ExecutionProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProfiler {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SECTION_CAPACITY)
    }

    /// Profiler retaining at most `capacity` sections (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        ExecutionProfiler {
            epoch: Instant::now(),
            capacity: capacity.max(1),
            state: Mutex::new(ProfilerState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Nanoseconds elapsed since the profiler was created
    pub fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Return the section type for `name`, creating it on first use
    pub fn new_section_type(&self, name: &str) -> SectionTypeId {
        let mut state = self.state.lock();
        if let Some(id) = state.type_ids.get(name) {
            return *id;
        }
        let id = SectionTypeId(state.type_names.len() as u32);
        state.type_names.push(name.to_string());
        state.type_ids.insert(name.to_string(), id);
        id
    }

    pub fn section_type_name(&self, id: SectionTypeId) -> Option<String> {
        self.state.lock().type_names.get(id.0 as usize).cloned()
    }

    pub fn add_section(&self, section_type: SectionTypeId, parameter: u64, start: u64, duration: f64) {
        let mut state = self.state.lock();
        if state.sections.len() == self.capacity {
            state.sections.pop_front();
            state.dropped += 1;
        }
        state.sections.push_back(ProfileSection {
            section_type,
            parameter,
            start,
            duration,
        });
    }

    /// Snapshot of the retained sections, oldest first
    pub fn sections(&self) -> Vec<ProfileSection> {
        self.state.lock().sections.iter().cloned().collect()
    }

    /// Remove and return the retained sections, oldest first
    pub fn drain_sections(&self) -> Vec<ProfileSection> {
        self.state.lock().sections.drain(..).collect()
    }

    /// Number of sections evicted before they were drained
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Sections recorded under the type called `name`
    pub fn sections_named(&self, name: &str) -> Vec<ProfileSection> {
        let state = self.state.lock();
        match state.type_ids.get(name) {
            Some(id) => state
                .sections
                .iter()
                .filter(|s| s.section_type == *id)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.sections.clear();
        state.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_types_are_interned() {
        let profiler = ExecutionProfiler::new();
        let a = profiler.new_section_type("stoffel_share::add_uint32_vec");
        let b = profiler.new_section_type("stoffel_share::mul_uint32_vec");
        assert_ne!(a, b);
        assert_eq!(profiler.new_section_type("stoffel_share::add_uint32_vec"), a);
        assert_eq!(
            profiler.section_type_name(b).as_deref(),
            Some("stoffel_share::mul_uint32_vec")
        );
    }

    #[test]
    fn test_sections_are_filtered_by_name() {
        let profiler = ExecutionProfiler::new();
        let add = profiler.new_section_type("add");
        let mul = profiler.new_section_type("mul");
        profiler.add_section(add, 4, 0, 4.0);
        profiler.add_section(mul, 8, 1, 16.0);
        profiler.add_section(add, 2, 2, 2.0);

        assert_eq!(profiler.sections().len(), 3);
        let adds = profiler.sections_named("add");
        assert_eq!(adds.len(), 2);
        assert_eq!(adds[1].parameter, 2);
        assert!(profiler.sections_named("sub").is_empty());

        profiler.clear();
        assert!(profiler.sections().is_empty());
    }

    #[test]
    fn test_ring_evicts_oldest_sections() {
        let profiler = ExecutionProfiler::with_capacity(2);
        let add = profiler.new_section_type("add");
        for parameter in 1..=3 {
            profiler.add_section(add, parameter, parameter, 1.0);
        }

        let parameters: Vec<u64> = profiler.sections().iter().map(|s| s.parameter).collect();
        assert_eq!(parameters, vec![2, 3]);
        assert_eq!(profiler.dropped(), 1);
        assert_eq!(profiler.capacity(), 2);
    }

    #[test]
    fn test_drain_sections_empties_the_ring() {
        let profiler = ExecutionProfiler::new();
        let mul = profiler.new_section_type("mul");
        profiler.add_section(mul, 8, 0, 16.0);
        profiler.add_section(mul, 4, 1, 8.0);

        let drained = profiler.drain_sections();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].parameter, 8);
        assert!(profiler.sections().is_empty());
        assert!(profiler.drain_sections().is_empty());
        assert_eq!(profiler.dropped(), 0);
    }
}
