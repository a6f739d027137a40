use crate::problem::{Problem, TrainId};
use log::*;
use std::fmt;

/// How many times a train can run its path in one operating day, and the
/// legs that the count was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPlan {
    pub loop_length: u64,
    pub return_leg: u64,
    pub depot_to_start: u64,
    pub depot_to_end: u64,
    pub max_loops: u64,
    /// Hour at which the train is back at its depot.
    pub max_hours: u64,
}

impl LoopPlan {
    pub fn overhead(&self) -> u64 {
        self.depot_to_start + self.depot_to_end
    }
}

/// Why a train/depot pairing has no valid operating day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateRoute {
    /// Driving out to the path and back alone takes longer than the budget.
    OverheadExceedsBudget { overhead: u64, budget: u64 },
}

impl fmt::Display for DegenerateRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegenerateRoute::OverheadExceedsBudget { overhead, budget } => write!(
                f,
                "depot legs take {} hours of a {} hour day",
                overhead, budget
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCapacity {
    Feasible(LoopPlan),
    /// `max_loops` is clamped to zero; the pairing has no valid duration.
    Degenerate(DegenerateRoute),
}

impl LoopCapacity {
    pub fn max_loops(&self) -> u64 {
        match self {
            LoopCapacity::Feasible(plan) => plan.max_loops,
            LoopCapacity::Degenerate(_) => 0,
        }
    }
}

/// Hours spent on the path itself when running `loops` repetitions. The
/// return leg is only driven between repetitions, never after the last one.
/// The occupancy builder advances its cursor by exactly these amounts.
/// Saturates instead of overflowing; a saturated value never fits a budget.
pub fn loop_hours(loops: u64, loop_length: u64, return_leg: u64) -> u64 {
    loops
        .saturating_mul(loop_length)
        .saturating_add(loops.saturating_sub(1).saturating_mul(return_leg))
}

pub fn loop_capacity(problem: &Problem, train: TrainId) -> LoopCapacity {
    let t = &problem.trains[train];
    let budget = problem.settings.daily_hour_budget;

    let loop_length = t
        .path
        .windows(2)
        .map(|w| problem.distance(w[0], w[1]))
        .fold(0u64, |sum, d| sum.saturating_add(d));
    let return_leg = problem.distance(t.last_node(), t.first_node());
    let depot_to_start = problem.depot_distance(t.depot, t.first_node());
    let depot_to_end = problem.depot_distance(t.depot, t.last_node());
    let overhead = depot_to_start.saturating_add(depot_to_end);

    let remaining = match budget.checked_sub(overhead) {
        Some(r) => r,
        None => {
            warn!(
                "Train {}: depot legs ({}h) exceed the daily budget ({}h)",
                t.name, overhead, budget
            );
            return LoopCapacity::Degenerate(DegenerateRoute::OverheadExceedsBudget {
                overhead,
                budget,
            });
        }
    };

    // The input check rejects zero-length loops, so this search terminates.
    debug_assert!(loop_length > 0);
    let mut k = 0;
    while loop_hours(k, loop_length, return_leg) <= remaining {
        k += 1;
    }
    let max_loops = k - 1;

    if max_loops == 0 {
        warn!(
            "Train {}: a {}h loop does not fit into the {}h left after depot legs, it only drives out and back",
            t.name, loop_length, remaining
        );
    }

    let max_hours = loop_hours(max_loops, loop_length, return_leg) + overhead;
    trace!(
        "Train {}: loop {}h return {}h overhead {}h -> {} loops, {}h",
        t.name,
        loop_length,
        return_leg,
        overhead,
        max_loops,
        max_hours
    );

    LoopCapacity::Feasible(LoopPlan {
        loop_length,
        return_leg,
        depot_to_start,
        depot_to_end,
        max_loops,
        max_hours,
    })
}
