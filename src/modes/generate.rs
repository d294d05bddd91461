//! Single-program assembly: synthesize to length, trim overshoot, repair,
//! self-check.

use crate::{generate_call, BuildState, ChoiceTable, Program, RandSource, Target, Verify};

/// Builds a program of exactly `ncalls` calls (fewer only when the catalog
/// offers nothing to choose from).
pub fn generate(
    target: &Target,
    rand: &mut RandSource,
    ncalls: usize,
    choice_table: Option<&ChoiceTable>,
    verify: Verify,
) -> Program {
    let mut p = target.new_program();
    if ncalls == 0 || target.is_empty() {
        return p;
    }

    let mut state = BuildState::new(target);
    while p.len() < ncalls {
        let calls = generate_call(rand, &mut state, &p, p.len(), choice_table);
        if calls.is_empty() {
            tracing::warn!(have = p.len(), want = ncalls, "no descriptor available, stopping early");
            break;
        }
        for c in calls {
            state.analyze(&c);
            p.calls.push(c);
        }
    }

    // The last unit may have dragged in support calls past the budget. Drop
    // those; the requested call keeps its place and falls back to default
    // resource values.
    while p.len() > ncalls {
        let removed = p.remove_call(target, ncalls - 1);
        tracing::trace!(call = %removed.name, "trimmed overshoot call");
    }

    p.sanitize_fix(target);
    p.debug_validate(target, verify);
    tracing::debug!(calls = p.len(), "generated program");
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArgDesc, ArgKind, Descriptor, ResourceKind};

    #[test]
    fn exact_length_for_many_seeds() {
        let target = Target::builtin();
        let ct = ChoiceTable::new(&target);
        for seed in 0..64u64 {
            for ncalls in [1usize, 2, 5, 17] {
                let mut r = RandSource::from_seed(seed);
                let p = generate(&target, &mut r, ncalls, Some(&ct), Verify::Panic);
                assert_eq!(p.len(), ncalls, "seed {seed}");
                p.validate(&target).expect("valid");
            }
        }
    }

    #[test]
    fn deterministic_for_a_seed() {
        let target = Target::builtin();
        let a = generate(&target, &mut RandSource::from_seed(99), 12, None, Verify::Panic);
        let b = generate(&target, &mut RandSource::from_seed(99), 12, None, Verify::Panic);
        assert_eq!(a, b);
    }

    #[test]
    fn degenerate_inputs_give_empty_programs() {
        let target = Target::builtin();
        assert!(generate(&target, &mut RandSource::from_seed(1), 0, None, Verify::Panic).is_empty());

        let empty = Target::new("empty", Vec::new(), Vec::new()).expect("empty catalog");
        assert!(generate(&empty, &mut RandSource::from_seed(1), 5, None, Verify::Panic).is_empty());

        let none_enabled = ChoiceTable::with_enabled::<&str>(&target, &[]).expect("table");
        let p = generate(&target, &mut RandSource::from_seed(1), 5, Some(&none_enabled), Verify::Panic);
        assert!(p.is_empty());
    }

    #[test]
    fn trimming_keeps_requested_call_with_defaults() {
        // A chain where every consumer needs a freshly produced handle.
        let target = Target::new(
            "chain",
            vec![ResourceKind::new("h", vec![0xffff])],
            vec![
                Descriptor::new("make", Vec::new(), Some("h")),
                Descriptor::new(
                    "use",
                    vec![ArgDesc::new(
                        "h",
                        ArgKind::Resource {
                            kind: "h".to_string(),
                            release: true,
                        },
                    )],
                    None,
                ),
            ],
        )
        .expect("catalog");
        let ct = ChoiceTable::with_enabled(&target, &["use"]).expect("table");
        let p = generate(&target, &mut RandSource::from_seed(4), 1, Some(&ct), Verify::Panic);
        assert_eq!(p.call_names(), vec!["use"]);
        assert_eq!(p.calls[0].args[0].referenced_call(), None);
    }
}
