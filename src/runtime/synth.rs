//! Call synthesis: picks a descriptor and fills in its arguments against the
//! current resource state, inserting producer calls for missing resources.

use crate::{
    Arg, ArgDesc, ArgKind, BuildState, Call, CallId, ChoiceTable, DescriptorIdx, Program, RandSource,
    ResourceSource, Target,
};

/// Nesting limit for producers created to satisfy other producers.
const MAX_SUPPORT_DEPTH: usize = 3;
const MAX_DATA_LEN: usize = 64;

/// Next synthesis unit for `position`: zero or more support calls followed by
/// the requested call. Empty only when nothing can be chosen.
pub fn generate_call(
    rand: &mut RandSource,
    state: &mut BuildState<'_>,
    program: &Program,
    position: usize,
    choice_table: Option<&ChoiceTable>,
) -> Vec<Call> {
    let target = state.target();
    let prev = position
        .checked_sub(1)
        .and_then(|i| program.calls.get(i))
        .and_then(|c| target.lookup(&c.name));
    let idx = match choice_table {
        Some(ct) => ct.choose(rand, prev),
        None if target.is_empty() => None,
        None => Some(rand.intn(target.len())),
    };
    match idx {
        Some(idx) => generate_particular_call(rand, state, idx),
        None => Vec::new(),
    }
}

/// A call of descriptor `idx`, preceded by any support calls it needs.
pub fn generate_particular_call(rand: &mut RandSource, state: &mut BuildState<'_>, idx: DescriptorIdx) -> Vec<Call> {
    let mut out = Vec::new();
    let mut pending = Vec::new();
    let call = build_call(rand, state, idx, 0, Some(&mut out), &mut pending);
    out.push(call);
    out
}

/// Exactly one call of descriptor `idx`. Resource arguments use live
/// resources or defaults; no support calls are created.
pub fn generate_single_call(rand: &mut RandSource, state: &mut BuildState<'_>, idx: DescriptorIdx) -> Call {
    let mut pending = Vec::new();
    build_call(rand, state, idx, 0, None, &mut pending)
}

/// `support` receives producer calls created on the way; `None` forbids them.
/// `pending` holds resources produced by support calls of the current unit,
/// which the state has not absorbed yet.
fn build_call(
    rand: &mut RandSource,
    state: &mut BuildState<'_>,
    idx: DescriptorIdx,
    depth: usize,
    mut support: Option<&mut Vec<Call>>,
    pending: &mut Vec<(String, CallId)>,
) -> Call {
    let target = state.target();
    let desc = target.descriptor(idx);
    let mut args = Vec::with_capacity(desc.args.len());
    for ad in &desc.args {
        let arg = match &ad.kind {
            ArgKind::Resource { kind, release } => {
                resource_arg(rand, state, kind, *release, depth, support.as_deref_mut(), pending)
            }
            _ => plain_arg(rand, target, ad),
        };
        args.push(arg);
    }
    Call {
        id: state.alloc_id(),
        name: desc.name.clone(),
        args,
    }
}

fn resource_arg(
    rand: &mut RandSource,
    state: &mut BuildState<'_>,
    kind: &str,
    release: bool,
    depth: usize,
    support: Option<&mut Vec<Call>>,
    pending: &mut Vec<(String, CallId)>,
) -> Arg {
    let target = state.target();
    let mut candidates: Vec<CallId> = state.live(kind).to_vec();
    candidates.extend(pending.iter().filter(|(k, _)| k == kind).map(|(_, id)| *id));

    // Releasing calls almost always target a live instance.
    let reuse_odds = if release { 20 } else { 10 };
    if !candidates.is_empty() && !rand.one_of(reuse_odds) {
        let id = candidates[rand.intn(candidates.len())];
        return Arg::Resource {
            kind: kind.to_string(),
            source: ResourceSource::Call(id),
        };
    }

    let producers = target.producers_of(kind);
    if let Some(out) = support {
        if depth < MAX_SUPPORT_DEPTH && !producers.is_empty() && (candidates.is_empty() || rand.one_of(4)) {
            let p = producers[rand.intn(producers.len())];
            let call = build_call(rand, state, p, depth + 1, Some(&mut *out), pending);
            let id = call.id;
            out.push(call);
            pending.push((kind.to_string(), id));
            return Arg::Resource {
                kind: kind.to_string(),
                source: ResourceSource::Call(id),
            };
        }
    }

    if let Some(&id) = candidates.last() {
        return Arg::Resource {
            kind: kind.to_string(),
            source: ResourceSource::Call(id),
        };
    }

    let special = target.resource(kind).map(|r| r.special.as_slice()).unwrap_or(&[]);
    let value = if special.is_empty() {
        0
    } else {
        special[rand.intn(special.len())]
    };
    Arg::Resource {
        kind: kind.to_string(),
        source: ResourceSource::Default(value),
    }
}

fn plain_arg(rand: &mut RandSource, target: &Target, ad: &ArgDesc) -> Arg {
    match &ad.kind {
        ArgKind::Int { min, max } => {
            let value = match rand.intn(8) {
                0 => *min,
                1 => *max,
                _ => rand.range_inclusive(*min, *max),
            };
            Arg::Const { value }
        }
        ArgKind::Flags { values } => {
            let mut value = values[rand.intn(values.len())];
            if rand.one_of(4) {
                value |= values[rand.intn(values.len())];
            }
            if rand.one_of(10) {
                value = 0;
            }
            Arg::Const { value }
        }
        ArgKind::Buffer { max_len } => {
            let len = rand.intn((*max_len).min(MAX_DATA_LEN) + 1);
            let mut bytes = vec![0u8; len];
            rand.fill_bytes(&mut bytes);
            Arg::Data { bytes }
        }
        ArgKind::Resource { .. } => Arg::default_for(target, ad),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_on_empty_state_pulls_in_a_producer() {
        let target = Target::builtin();
        let close = target.lookup("close").expect("close");
        let mut r = RandSource::from_seed(11);
        let mut supported = 0;
        for _ in 0..50 {
            let mut s = BuildState::new(&target);
            let calls = generate_particular_call(&mut r, &mut s, close);
            let last = calls.last().expect("requested call");
            assert_eq!(last.name, "close");
            if calls.len() > 1 {
                supported += 1;
                let producer = &calls[calls.len() - 2];
                assert!(producer.name == "open" || producer.name == "dup");
                assert_eq!(last.args[0].referenced_call(), Some(producer.id));
            }
        }
        assert!(supported > 0);
    }

    #[test]
    fn single_call_never_adds_support() {
        let target = Target::builtin();
        let unmount = target.lookup("unmount").expect("unmount");
        let mut r = RandSource::from_seed(5);
        let mut s = BuildState::new(&target);
        let call = generate_single_call(&mut r, &mut s, unmount);
        assert_eq!(call.name, "unmount");
        assert_eq!(
            call.args[0],
            Arg::Resource {
                kind: "mnt".to_string(),
                source: ResourceSource::Default(0),
            }
        );
    }

    #[test]
    fn single_call_uses_live_resource() {
        let target = Target::builtin();
        let mount = target.lookup("mount").expect("mount");
        let unmount = target.lookup("unmount").expect("unmount");
        let mut r = RandSource::from_seed(9);
        let mut s = BuildState::new(&target);
        let m = generate_single_call(&mut r, &mut s, mount);
        s.analyze(&m);
        let u = generate_single_call(&mut r, &mut s, unmount);
        assert_eq!(u.args[0].referenced_call(), Some(m.id));
    }

    #[test]
    fn unit_calls_are_ordered_producers_first() {
        let target = Target::builtin();
        let mut r = RandSource::from_seed(21);
        let mut s = BuildState::new(&target);
        let mut p = target.new_program();
        while p.len() < 40 {
            let calls = generate_call(&mut r, &mut s, &p, p.len(), None);
            for c in calls {
                s.analyze(&c);
                p.calls.push(c);
            }
        }
        p.validate(&target).expect("structurally valid");
    }
}
