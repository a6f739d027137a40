//! Solver-independent representation of a linear integer program: typed
//! variables, named constraints and a minimisation objective. Constraints
//! are either plain linear rows or indicator rows that only apply when a
//! binary variable takes a given value.

use std::fmt;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Binary,
    Integer { lower: i64, upper: Option<i64> },
}

impl Domain {
    pub fn non_negative() -> Self {
        Domain::Integer {
            lower: 0,
            upper: None,
        }
    }

    pub fn lower(&self) -> i64 {
        match self {
            Domain::Binary => 0,
            Domain::Integer { lower, .. } => *lower,
        }
    }

    pub fn upper(&self) -> Option<i64> {
        match self {
            Domain::Binary => Some(1),
            Domain::Integer { upper, .. } => *upper,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub domain: Domain,
}

/// `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, i64)>,
    pub constant: i64,
}

impl LinExpr {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn term(mut self, var: VarId, coef: i64) -> Self {
        self.add(var, coef);
        self
    }

    pub fn add(&mut self, var: VarId, coef: i64) {
        if coef != 0 {
            self.terms.push((var, coef));
        }
    }

    pub fn constant(mut self, constant: i64) -> Self {
        self.constant += constant;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, values: &[i64]) -> i64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(v, c)| c * values[v.0])
                .sum::<i64>()
    }

    pub fn le(self, rhs: i64) -> LinearConstraint {
        LinearConstraint::new(self, Sense::Le, rhs)
    }

    pub fn ge(self, rhs: i64) -> LinearConstraint {
        LinearConstraint::new(self, Sense::Ge, rhs)
    }

    pub fn equals(self, rhs: i64) -> LinearConstraint {
        LinearConstraint::new(self, Sense::Eq, rhs)
    }
}

impl std::iter::FromIterator<(VarId, i64)> for LinExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, i64)>>(iter: I) -> Self {
        let mut expr = LinExpr::new();
        for (var, coef) in iter {
            expr.add(var, coef);
        }
        expr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "=",
        })
    }
}

/// `lhs <sense> rhs`, where any constant of `lhs` is folded into `rhs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    pub lhs: LinExpr,
    pub sense: Sense,
    pub rhs: i64,
}

impl LinearConstraint {
    pub fn new(mut lhs: LinExpr, sense: Sense, rhs: i64) -> Self {
        let rhs = rhs - lhs.constant;
        lhs.constant = 0;
        LinearConstraint { lhs, sense, rhs }
    }

    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        let lhs = self.lhs.evaluate(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs,
            Sense::Ge => lhs >= self.rhs,
            Sense::Eq => lhs == self.rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    Linear(LinearConstraint),
    /// `guard = active_when  ⇒  then`. The guard must be a binary variable.
    Indicator {
        guard: VarId,
        active_when: bool,
        then: LinearConstraint,
    },
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        match &self.kind {
            ConstraintKind::Linear(c) => c.is_satisfied(values),
            ConstraintKind::Indicator {
                guard,
                active_when,
                then,
            } => (values[guard.0] == 1) != *active_when || then.is_satisfied(values),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    pub objective: LinExpr,
}

impl LinearProgram {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_var(&mut self, name: impl Into<String>, domain: Domain) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            domain,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, constraint: LinearConstraint) {
        self.constraints.push(Constraint {
            name: name.into(),
            kind: ConstraintKind::Linear(constraint),
        });
    }

    pub fn add_indicator(
        &mut self,
        name: impl Into<String>,
        guard: VarId,
        active_when: bool,
        then: LinearConstraint,
    ) {
        debug_assert_eq!(self.variables[guard.0].domain, Domain::Binary);
        self.constraints.push(Constraint {
            name: name.into(),
            kind: ConstraintKind::Indicator {
                guard,
                active_when,
                then,
            },
        });
    }

    pub fn minimize(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn count_vars_with_prefix(&self, prefix: &str) -> usize {
        self.variables
            .iter()
            .filter(|v| v.name.starts_with(prefix))
            .count()
    }

    /// Names of the constraints and bounds that `values` violate.
    pub fn violations(&self, values: &[i64]) -> Vec<String> {
        let bounds = self
            .variables
            .iter()
            .zip(values.iter())
            .filter(|(v, x)| {
                **x < v.domain.lower() || v.domain.upper().map(|u| **x > u).unwrap_or(false)
            })
            .map(|(v, _)| format!("bound({})", v.name));
        let rows = self
            .constraints
            .iter()
            .filter(|c| !c.is_satisfied(values))
            .map(|c| c.name.clone());
        bounds.chain(rows).collect()
    }

    /// Writes the program in CPLEX LP format.
    pub fn write_lp(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "Minimize")?;
        writeln!(w, " obj: {}", self.fmt_expr(&self.objective))?;
        if self.objective.constant != 0 {
            writeln!(w, "\\ objective constant {}", self.objective.constant)?;
        }

        writeln!(w, "Subject To")?;
        for c in self.constraints.iter() {
            match &c.kind {
                ConstraintKind::Linear(lc) => writeln!(w, " {}: {}", c.name, self.fmt_row(lc))?,
                ConstraintKind::Indicator {
                    guard,
                    active_when,
                    then,
                } => writeln!(
                    w,
                    " {}: {} = {} -> {}",
                    c.name,
                    self.var(*guard).name,
                    *active_when as u8,
                    self.fmt_row(then)
                )?,
            }
        }

        writeln!(w, "Bounds")?;
        for v in self.variables.iter() {
            if let Domain::Integer { lower, upper } = v.domain {
                match upper {
                    Some(upper) => writeln!(w, " {} <= {} <= {}", lower, v.name, upper)?,
                    None => writeln!(w, " {} >= {}", v.name, lower)?,
                }
            }
        }

        let names = |binary: bool| {
            self.variables
                .iter()
                .filter(move |v| (v.domain == Domain::Binary) == binary)
                .map(|v| v.name.as_str())
                .collect::<Vec<_>>()
        };
        writeln!(w, "General")?;
        for chunk in names(false).chunks(8) {
            writeln!(w, " {}", chunk.join(" "))?;
        }
        writeln!(w, "Binary")?;
        for chunk in names(true).chunks(8) {
            writeln!(w, " {}", chunk.join(" "))?;
        }
        writeln!(w, "End")
    }

    fn fmt_row(&self, c: &LinearConstraint) -> String {
        format!("{} {} {}", self.fmt_expr(&c.lhs), c.sense, c.rhs)
    }

    fn fmt_expr(&self, expr: &LinExpr) -> String {
        if expr.terms.is_empty() {
            return "0".to_string();
        }
        let mut s = String::new();
        for (idx, (var, coef)) in expr.terms.iter().enumerate() {
            let sign = if *coef < 0 { "-" } else { "+" };
            if idx > 0 || *coef < 0 {
                s.push_str(sign);
                s.push(' ');
            }
            if coef.abs() != 1 {
                s.push_str(&format!("{} ", coef.abs()));
            }
            s.push_str(&self.var(*var).name);
            s.push(' ');
        }
        s.pop();
        s
    }
}
