use crate::lp::{ConstraintKind, LinExpr, LinearConstraint, LinearProgram, Sense, VarId};
#[allow(unused)]
use log::{debug, info, trace, warn};
use std::convert::TryFrom;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use z3::ast::{Ast, Bool, Int};

/// A backend that takes a fully specified program and minimises it.
pub trait MipSolver {
    fn name(&self) -> &'static str;
    fn solve(&mut self, lp: &LinearProgram, limits: &SolveLimits) -> SolveOutcome;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SolveLimits {
    pub time_limit: Option<Duration>,
}

/// A value for every variable of the program, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub values: Vec<i64>,
    pub objective: i64,
}

impl Solution {
    pub fn value(&self, var: VarId) -> i64 {
        self.values[var.index()]
    }

    pub fn is_set(&self, var: VarId) -> bool {
        self.value(var) == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    Optimal(Solution),
    /// The time limit was hit; this is the best incumbent found.
    TimeLimit(Solution),
    /// The limit was hit before any feasible point was found.
    NoSolution { reason: String },
    /// The program has no feasible point. `conflict` names a subset of the
    /// constraints that cannot hold together.
    Infeasible { conflict: Vec<String> },
}

/// Solves programs with the z3 optimizer. Integer variables become z3
/// integers, binaries become integers in `0..=1`, and indicator rows become
/// implications.
#[derive(Debug, Default)]
pub struct Z3Optimizer {
    /// Shrink the reported conflict until removing any member makes the
    /// rest satisfiable.
    pub minimize_conflicts: bool,
}

impl MipSolver for Z3Optimizer {
    fn name(&self) -> &'static str {
        "z3 optimize"
    }

    fn solve(&mut self, lp: &LinearProgram, limits: &SolveLimits) -> SolveOutcome {
        let _p = hprof::enter("z3 optimize");
        let ctx = context(limits);
        let vars = declare(&ctx, lp);

        let opt = z3::Optimize::new(&ctx);
        for bound in bounds(&ctx, lp, &vars) {
            opt.assert(&bound);
        }
        for c in lp.constraints.iter() {
            trace!("assert {}", c.name);
            opt.assert(&encode(&ctx, &vars, &c.kind));
        }
        opt.minimize(&linear(&ctx, &vars, &lp.objective));

        info!(
            "Solving {} variables, {} constraints with {}",
            lp.num_vars(),
            lp.constraints.len(),
            self.name()
        );

        match opt.check(&[]) {
            z3::SatResult::Sat => match opt.get_model() {
                Some(model) => SolveOutcome::Optimal(extract(lp, &vars, &model)),
                None => SolveOutcome::NoSolution {
                    reason: "solver reported sat without a model".to_string(),
                },
            },
            z3::SatResult::Unknown => {
                warn!("Optimization stopped before proving optimality.");
                match opt.get_model().map(|m| extract(lp, &vars, &m)) {
                    Some(incumbent) if lp.violations(&incumbent.values).is_empty() => {
                        SolveOutcome::TimeLimit(incumbent)
                    }
                    _ => SolveOutcome::NoSolution {
                        reason: "no feasible point found within the limit".to_string(),
                    },
                }
            }
            z3::SatResult::Unsat => {
                drop(_p);
                let conflict = self.conflicting_constraints(lp, limits);
                SolveOutcome::Infeasible { conflict }
            }
        }
    }
}

impl Z3Optimizer {
    pub fn new() -> Self {
        Z3Optimizer {
            minimize_conflicts: true,
        }
    }

    /// Re-checks the constraints (without the objective) under one
    /// assumption literal per named constraint and reads the unsat core.
    /// The whole analysis shares one deadline of `limits.time_limit`.
    fn conflicting_constraints(&self, lp: &LinearProgram, limits: &SolveLimits) -> Vec<String> {
        let _p = hprof::enter("unsat core");
        let deadline = limits
            .time_limit
            .and_then(|limit| Instant::now().checked_add(limit));
        let ctx = context(limits);
        let vars = declare(&ctx, lp);
        let solver = z3::Solver::new(&ctx);

        for bound in bounds(&ctx, lp, &vars) {
            solver.assert(&bound);
        }

        let mut names = HashMap::new();
        let mut assumptions = Vec::with_capacity(lp.constraints.len());
        for (idx, c) in lp.constraints.iter().enumerate() {
            let tracker = Bool::new_const(&ctx, format!("track_{}", idx));
            solver.assert(&tracker.implies(&encode(&ctx, &vars, &c.kind)));
            names.insert(tracker.to_string(), c.name.clone());
            assumptions.push(tracker);
        }

        if !matches!(solver.check_assumptions(&assumptions), z3::SatResult::Unsat) {
            warn!("Infeasibility could not be reproduced for the conflict analysis.");
            return Vec::new();
        }

        let mut core = solver.get_unsat_core();
        debug!("Unsat core has {} constraints", core.len());

        if self.minimize_conflicts {
            core = shrink_core(core, deadline, |subset| {
                matches!(solver.check_assumptions(subset), z3::SatResult::Unsat)
            });
        }

        let mut conflict = core
            .iter()
            .filter_map(|b| names.get(&b.to_string()).cloned())
            .collect::<Vec<_>>();
        conflict.sort();
        conflict
    }
}

/// Drops core members one at a time as long as the rest still conflicts.
/// Once `deadline` has passed, the current core is returned as it is.
fn shrink_core<T: Clone>(
    mut core: Vec<T>,
    deadline: Option<Instant>,
    mut still_conflicts: impl FnMut(&[T]) -> bool,
) -> Vec<T> {
    let mut idx = 0;
    while idx < core.len() {
        if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
            warn!(
                "Time limit reached while shrinking the conflict, keeping {} constraints",
                core.len()
            );
            break;
        }
        let without = core
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, b)| b.clone())
            .collect::<Vec<_>>();
        if still_conflicts(&without) {
            core = without;
        } else {
            idx += 1;
        }
    }
    core
}

fn timeout_millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

fn context(limits: &SolveLimits) -> z3::Context {
    let mut cfg = z3::Config::new();
    if let Some(limit) = limits.time_limit {
        cfg.set_timeout_msec(timeout_millis(limit));
    }
    z3::Context::new(&cfg)
}

fn declare<'ctx>(ctx: &'ctx z3::Context, lp: &LinearProgram) -> Vec<Int<'ctx>> {
    lp.variables
        .iter()
        .map(|v| Int::new_const(ctx, v.name.as_str()))
        .collect()
}

fn bounds<'ctx>(ctx: &'ctx z3::Context, lp: &LinearProgram, vars: &[Int<'ctx>]) -> Vec<Bool<'ctx>> {
    let mut out = Vec::new();
    for (v, x) in lp.variables.iter().zip(vars.iter()) {
        out.push(x.ge(&Int::from_i64(ctx, v.domain.lower())));
        if let Some(upper) = v.domain.upper() {
            out.push(x.le(&Int::from_i64(ctx, upper)));
        }
    }
    out
}

fn linear<'ctx>(ctx: &'ctx z3::Context, vars: &[Int<'ctx>], expr: &LinExpr) -> Int<'ctx> {
    let mut parts = expr
        .terms
        .iter()
        .map(|(var, coef)| {
            let x = &vars[var.index()];
            if *coef == 1 {
                x.clone()
            } else {
                Int::mul(ctx, &[&Int::from_i64(ctx, *coef), x])
            }
        })
        .collect::<Vec<_>>();
    parts.push(Int::from_i64(ctx, expr.constant));
    let refs = parts.iter().collect::<Vec<_>>();
    Int::add(ctx, &refs)
}

fn row<'ctx>(ctx: &'ctx z3::Context, vars: &[Int<'ctx>], c: &LinearConstraint) -> Bool<'ctx> {
    let lhs = linear(ctx, vars, &c.lhs);
    let rhs = Int::from_i64(ctx, c.rhs);
    match c.sense {
        Sense::Le => lhs.le(&rhs),
        Sense::Ge => lhs.ge(&rhs),
        Sense::Eq => lhs._eq(&rhs),
    }
}

fn encode<'ctx>(ctx: &'ctx z3::Context, vars: &[Int<'ctx>], kind: &ConstraintKind) -> Bool<'ctx> {
    match kind {
        ConstraintKind::Linear(c) => row(ctx, vars, c),
        ConstraintKind::Indicator {
            guard,
            active_when,
            then,
        } => {
            let guard_value = Int::from_i64(ctx, *active_when as i64);
            vars[guard.index()]
                ._eq(&guard_value)
                .implies(&row(ctx, vars, then))
        }
    }
}

fn extract<'ctx>(lp: &LinearProgram, vars: &[Int<'ctx>], model: &z3::Model<'ctx>) -> Solution {
    let values = vars
        .iter()
        .zip(lp.variables.iter())
        .map(|(x, v)| match model.eval(x, true).and_then(|value| value.as_i64()) {
            Some(value) => value,
            None => {
                warn!("No value for {} in the model, using its lower bound", v.name);
                v.domain.lower()
            }
        })
        .collect::<Vec<_>>();
    let objective = lp.objective.evaluate(&values);
    Solution { values, objective }
}
