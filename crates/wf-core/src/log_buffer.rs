use std::collections::{BTreeMap, HashSet};

use wf_api_types::ExecutionLog;

/// Key under which entries without a step are grouped.
pub const GENERAL_STEP: &str = "general";

/// Execution log grouped by step, with a per-step entry cap.
///
/// Within a step, entries keep their append order. When a step overflows,
/// the entry with the oldest `created_at` is evicted, except that the most
/// recently appended entry is never the victim.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLogBuffer {
    max_per_step: usize,
    steps: BTreeMap<String, Vec<ExecutionLog>>,
}

impl StepLogBuffer {
    pub fn new(max_per_step: usize) -> Self {
        Self {
            max_per_step: max_per_step.max(1),
            steps: BTreeMap::new(),
        }
    }

    pub fn max_per_step(&self) -> usize {
        self.max_per_step
    }

    fn key(entry: &ExecutionLog) -> String {
        entry
            .step
            .clone()
            .unwrap_or_else(|| GENERAL_STEP.to_string())
    }

    /// Append one entry, evicting within its step if the cap is exceeded.
    pub fn append(&mut self, entry: ExecutionLog) {
        let cap = self.max_per_step;
        let bucket = self.steps.entry(Self::key(&entry)).or_default();
        bucket.push(entry);
        while bucket.len() > cap {
            let newest = bucket.len() - 1;
            let victim = bucket[..newest]
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(i, _)| i)
                .unwrap_or(0);
            bucket.remove(victim);
        }
    }

    /// Drop everything and load `entries` in order.
    pub fn replace(&mut self, entries: Vec<ExecutionLog>) {
        self.steps.clear();
        for entry in entries {
            self.append(entry);
        }
    }

    /// Replace with an authoritative server listing.
    ///
    /// Locally synthesized entries newer than the newest server entry are
    /// carried over. Server entries are deduplicated by id.
    pub fn merge_server(&mut self, server: Vec<ExecutionLog>) {
        let newest_server = server.iter().map(|e| e.created_at).max();
        let mut carried: Vec<ExecutionLog> = self
            .iter()
            .filter(|e| e.is_local())
            .filter(|e| newest_server.map_or(true, |newest| e.created_at > newest))
            .cloned()
            .collect();
        carried.sort_by_key(|e| e.created_at);

        let mut seen = HashSet::new();
        let mut merged: Vec<ExecutionLog> = server
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .collect();
        merged.sort_by_key(|e| e.created_at);
        merged.extend(carried);
        self.replace(merged);
    }

    pub fn len(&self) -> usize {
        self.steps.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.values().all(Vec::is_empty)
    }

    /// Entries of one step (`None` selects the general bucket).
    pub fn step(&self, step: Option<&str>) -> &[ExecutionLog] {
        self.steps
            .get(step.unwrap_or(GENERAL_STEP))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn steps(&self) -> impl Iterator<Item = (&str, &[ExecutionLog])> {
        self.steps.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionLog> {
        self.steps.values().flat_map(|v| v.iter())
    }

    /// All entries ordered by creation time.
    pub fn chronological(&self) -> Vec<&ExecutionLog> {
        let mut all: Vec<&ExecutionLog> = self.iter().collect();
        all.sort_by_key(|e| e.created_at);
        all
    }
}

impl Default for StepLogBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}
