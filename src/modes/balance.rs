//! Resource lifecycle balancing across a finished task batch.
//!
//! Each program is scanned for categories that were produced but never
//! consumed; for each one, while the length budget allows, a single consumer
//! call is appended. The pass only ever appends consumers.

use serde::{Deserialize, Serialize};

use crate::{
    generate_single_call, BuildState, CategorySet, LifecycleRole, Program, RandSource, ResourceCategory,
    Target,
};

/// Which unconsumed categories the balancer repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    /// Every category left open is repaired.
    #[default]
    AllCategories,
    /// Only the first category of the table is ever repaired.
    ///
    /// A narrowed repair mode. It does not reproduce the single-bit check that
    /// tested an already shifted mask: that check never appended anything.
    FirstCategoryOnly,
}

impl clap::ValueEnum for BalancePolicy {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::AllCategories, Self::FirstCategoryOnly]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::AllCategories => clap::builder::PossibleValue::new("all_categories"),
            Self::FirstCategoryOnly => clap::builder::PossibleValue::new("first_category_only"),
        })
    }
}

impl BalancePolicy {
    fn repairs(self, category: ResourceCategory) -> bool {
        match self {
            Self::AllCategories => true,
            Self::FirstCategoryOnly => category == ResourceCategory::ALL[0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceFix {
    pub program: usize,
    pub category: ResourceCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub appended: Vec<BalanceFix>,
    /// Categories left open because the program had no room or the catalog
    /// lacks the consumer.
    pub skipped: Vec<BalanceFix>,
}

impl BalanceReport {
    pub fn is_clean(&self) -> bool {
        self.appended.is_empty()
    }
}

/// Categories whose producer appears in `program` with no later consumer.
pub fn unconsumed_categories(program: &Program) -> CategorySet {
    let mut open = CategorySet::new();
    for c in &program.calls {
        match ResourceCategory::classify(&c.name) {
            Some((cat, LifecycleRole::Producer)) => {
                open.insert(cat);
            }
            Some((cat, LifecycleRole::Consumer)) => {
                open.remove(cat);
            }
            None => {}
        }
    }
    open
}

#[derive(Debug)]
struct ProgramOutcome {
    appended: Vec<ResourceCategory>,
    skipped: Vec<ResourceCategory>,
}

fn balance_one(
    target: &Target,
    rand: &mut RandSource,
    program: &mut Program,
    budget: usize,
    policy: BalancePolicy,
) -> ProgramOutcome {
    let mut outcome = ProgramOutcome {
        appended: Vec::new(),
        skipped: Vec::new(),
    };
    let pending: Vec<ResourceCategory> = unconsumed_categories(program)
        .iter()
        .filter(|c| policy.repairs(*c))
        .collect();
    if pending.is_empty() {
        return outcome;
    }

    let mut state = BuildState::replay(target, program);
    for cat in pending {
        let Some(idx) = target.lookup(cat.consumer()) else {
            tracing::warn!(consumer = cat.consumer(), "catalog has no consumer descriptor, skipping");
            outcome.skipped.push(cat);
            continue;
        };
        if program.len() >= budget {
            outcome.skipped.push(cat);
            continue;
        }
        let call = generate_single_call(rand, &mut state, idx);
        state.analyze(&call);
        program.calls.push(call);
        outcome.appended.push(cat);
    }
    outcome
}

/// Balances one program in place. Returns the categories that received a
/// consumer call.
pub fn balance_program(
    target: &Target,
    rand: &mut RandSource,
    program: &mut Program,
    budget: usize,
    policy: BalancePolicy,
) -> Vec<ResourceCategory> {
    balance_one(target, rand, program, budget, policy).appended
}

/// Balances every program of a task in place.
pub fn balance_task(
    target: &Target,
    rand: &mut RandSource,
    task: &mut [Program],
    budget: usize,
    policy: BalancePolicy,
) -> BalanceReport {
    let mut report = BalanceReport::default();
    for (i, p) in task.iter_mut().enumerate() {
        let outcome = balance_one(target, rand, p, budget, policy);
        report.appended.extend(outcome.appended.into_iter().map(|category| BalanceFix { program: i, category }));
        report.skipped.extend(outcome.skipped.into_iter().map(|category| BalanceFix { program: i, category }));
    }
    if !report.appended.is_empty() {
        tracing::debug!(appended = report.appended.len(), "balanced task");
    }
    report
}
