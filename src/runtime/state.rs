//! Per-program resource state: which resources exist right now, and the next
//! free call id. One `BuildState` lives for exactly one program build.

use std::collections::BTreeMap;

use crate::{Arg, ArgKind, Call, CallId, Program, ResourceSource, Target};

#[derive(Debug)]
pub struct BuildState<'t> {
    target: &'t Target,
    live: BTreeMap<String, Vec<CallId>>,
    next_id: u32,
}

impl<'t> BuildState<'t> {
    pub fn new(target: &'t Target) -> Self {
        Self {
            target,
            live: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// State as it stands after every call of `program`.
    pub fn replay(target: &'t Target, program: &Program) -> Self {
        let mut state = Self::new(target);
        for c in &program.calls {
            state.analyze(c);
        }
        state
    }

    pub fn target(&self) -> &'t Target {
        self.target
    }

    /// Absorbs a call that was just appended: releases the resources it ends
    /// and records the resource it creates.
    pub fn analyze(&mut self, call: &Call) {
        self.next_id = self.next_id.max(call.id.0.saturating_add(1));
        let Some(desc) = self.target.descriptor_by_name(&call.name) else {
            return;
        };

        for (arg, ad) in call.args.iter().zip(&desc.args) {
            let ArgKind::Resource { release: true, .. } = ad.kind else {
                continue;
            };
            if let Arg::Resource {
                kind,
                source: ResourceSource::Call(id),
            } = arg
            {
                if let Some(ids) = self.live.get_mut(kind) {
                    ids.retain(|x| x != id);
                }
            }
        }

        if let Some(ret) = &desc.ret {
            self.live.entry(ret.clone()).or_default().push(call.id);
        }
    }

    /// Live instances of `kind`, oldest first.
    pub fn live(&self, kind: &str) -> &[CallId] {
        self.live.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn live_count(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }

    pub fn alloc_id(&mut self) -> CallId {
        let id = CallId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }
}
