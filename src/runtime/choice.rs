//! Weighted next-descriptor oracle.
//!
//! Weights are static: a descriptor that shares resource kinds with the
//! previous call is favoured, and one that consumes what the previous call
//! produced is favoured further.

use std::collections::BTreeSet;

use crate::{CallgenError, CallgenResult, DescriptorIdx, RandSource, Target};

const BASE_WEIGHT: u64 = 1;
const SHARED_KIND_WEIGHT: u64 = 10;
const PRODUCER_CONSUMER_WEIGHT: u64 = 20;

#[derive(Debug, Clone)]
pub struct ChoiceTable {
    enabled: Vec<DescriptorIdx>,
    /// `weights[prev][j]` is the weight of `enabled[j]` after descriptor `prev`.
    weights: Vec<Vec<u64>>,
}

impl ChoiceTable {
    pub fn new(target: &Target) -> Self {
        Self::build(target, (0..target.len()).collect())
    }

    /// Table restricted to the named descriptors.
    pub fn with_enabled<S: AsRef<str>>(target: &Target, names: &[S]) -> CallgenResult<Self> {
        let mut enabled = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let idx = target.lookup(name).ok_or_else(|| {
                CallgenError::InvalidArgument(format!("unknown descriptor {name:?} in enabled set"))
            })?;
            enabled.insert(idx);
        }
        Ok(Self::build(target, enabled.into_iter().collect()))
    }

    fn build(target: &Target, enabled: Vec<DescriptorIdx>) -> Self {
        let weights = target
            .descriptors()
            .iter()
            .map(|prev| {
                let prev_kinds = prev.touched_kinds();
                enabled
                    .iter()
                    .map(|&j| {
                        let next = target.descriptor(j);
                        let shared = next.touched_kinds().intersection(&prev_kinds).count() as u64;
                        let feeds = prev
                            .ret
                            .as_deref()
                            .is_some_and(|k| next.consumed_kinds().any(|c| c == k));
                        BASE_WEIGHT
                            + SHARED_KIND_WEIGHT * shared
                            + if feeds { PRODUCER_CONSUMER_WEIGHT } else { 0 }
                    })
                    .collect()
            })
            .collect();
        Self { enabled, weights }
    }

    pub fn enabled(&self) -> &[DescriptorIdx] {
        &self.enabled
    }

    pub fn is_enabled(&self, idx: DescriptorIdx) -> bool {
        self.enabled.binary_search(&idx).is_ok()
    }

    /// Suggests the next descriptor given the previous call's descriptor.
    /// Uniform over the enabled set when there is no previous call.
    pub fn choose(&self, rand: &mut RandSource, prev: Option<DescriptorIdx>) -> Option<DescriptorIdx> {
        if self.enabled.is_empty() {
            return None;
        }
        let row = prev.and_then(|p| self.weights.get(p));
        let j = match row {
            Some(w) => rand.choose_weighted(w)?,
            None => rand.intn(self.enabled.len()),
        };
        self.enabled.get(j).copied()
    }
}
