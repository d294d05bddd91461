//! Task batches: several independently generated, priority-tagged programs,
//! balanced together once all of them exist.

use serde::{Deserialize, Serialize};

use crate::{
    balance_task, generate, BalancePolicy, BalanceReport, ChoiceTable, Program, RandSource, ResourceCategory, Target,
    Verify,
};

pub const DEFAULT_MAX_TASK_PROGRAMS: usize = 7;
pub const DEFAULT_PRIORITY_LEVELS: u8 = 100;
/// Room for one consumer call per lifecycle category.
pub const DEFAULT_BALANCE_HEADROOM: usize = ResourceCategory::ALL.len();

#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Batch size is drawn from `1..=max_programs`.
    pub max_programs: usize,
    /// Priorities are drawn from `0..priority_levels`.
    pub priority_levels: u8,
    pub balance_policy: BalancePolicy,
    /// Extra calls the balancer may append beyond the target length.
    pub balance_headroom: usize,
    /// Worker threads used to build the programs of one batch.
    pub jobs: usize,
    pub verify: Verify,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            max_programs: DEFAULT_MAX_TASK_PROGRAMS,
            priority_levels: DEFAULT_PRIORITY_LEVELS,
            balance_policy: BalancePolicy::default(),
            balance_headroom: DEFAULT_BALANCE_HEADROOM,
            jobs: 1,
            verify: Verify::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub seed: u64,
    pub programs: Vec<Program>,
    pub balance: BalanceReport,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    priority: u8,
    seed: u64,
}

/// Generates one task batch. Equivalent to [`task_generate_with_report`]
/// without the balance report.
pub fn task_generate(
    target: &Target,
    rand: &mut RandSource,
    ncalls: usize,
    choice_table: Option<&ChoiceTable>,
    opt: &TaskOptions,
) -> Vec<Program> {
    task_generate_with_report(target, rand, ncalls, choice_table, opt).programs
}

pub fn task_generate_with_report(
    target: &Target,
    rand: &mut RandSource,
    ncalls: usize,
    choice_table: Option<&ChoiceTable>,
    opt: &TaskOptions,
) -> TaskOutcome {
    let seed = rand.seed();
    let count = rand.intn(opt.max_programs.max(1)) + 1;
    // Seeds are drawn up front so the batch does not depend on `jobs`.
    let slots: Vec<Slot> = (0..count)
        .map(|_| Slot {
            priority: rand.intn(usize::from(opt.priority_levels.max(1))) as u8,
            seed: rand.next_u64(),
        })
        .collect();

    let mut programs = build_slots(target, &slots, ncalls, choice_table, opt);
    let budget = ncalls.saturating_add(opt.balance_headroom);
    let balance = balance_task(target, rand, &mut programs, budget, opt.balance_policy);

    tracing::debug!(programs = programs.len(), ncalls, appended = balance.appended.len(), "generated task");
    TaskOutcome {
        seed,
        programs,
        balance,
    }
}

fn build_slot(target: &Target, slot: Slot, ncalls: usize, choice_table: Option<&ChoiceTable>, verify: Verify) -> Program {
    let mut rand = RandSource::from_seed(slot.seed);
    let mut p = generate(target, &mut rand, ncalls, choice_table, verify);
    p.priority = Some(slot.priority);
    p
}

fn build_slots(
    target: &Target,
    slots: &[Slot],
    ncalls: usize,
    choice_table: Option<&ChoiceTable>,
    opt: &TaskOptions,
) -> Vec<Program> {
    let jobs = opt.jobs.clamp(1, slots.len().max(1));
    if jobs == 1 {
        return slots
            .iter()
            .map(|s| build_slot(target, *s, ncalls, choice_table, opt.verify))
            .collect();
    }

    let chunk = slots.len().div_ceil(jobs);
    std::thread::scope(|scope| {
        let handles: Vec<_> = slots
            .chunks(chunk)
            .map(|part| {
                scope.spawn(move || {
                    part.iter()
                        .map(|s| build_slot(target, *s, ncalls, choice_table, opt.verify))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut out = Vec::with_capacity(slots.len());
        for h in handles {
            match h.join() {
                Ok(part) => out.extend(part),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        out
    })
}
