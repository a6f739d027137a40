use thiserror::Error;

use crate::loops::DegenerateRoute;

/// Problems with the problem file that are detected before any
/// derived computation starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("The network has no nodes.")]
    NoNodes,

    #[error("The network has no depots.")]
    NoDepots,

    #[error("Node name {name:?} is used more than once.")]
    DuplicateNode { name: String },

    #[error("Depot name {name:?} is used more than once.")]
    DuplicateDepot { name: String },

    #[error("Distance matrix has {rows} rows, expected {expected}.")]
    DistanceRows { rows: usize, expected: usize },

    #[error("Distance matrix row {row} has {len} entries, expected {expected}.")]
    DistanceColumns {
        row: usize,
        len: usize,
        expected: usize,
    },

    #[error("Depot {depot:?} has {len} node distances, expected {expected}.")]
    DepotDistances {
        depot: String,
        len: usize,
        expected: usize,
    },

    #[error("Path {path} references unknown node {node:?}.")]
    UnknownNode { path: usize, node: String },

    #[error("Path {path} has {len} nodes, but at least two are required.")]
    PathTooShort { path: usize, len: usize },

    #[error("Path {path} visits node {node:?} more than once.")]
    RepeatedNode { path: usize, node: String },

    #[error("Path {path} has a loop length of zero hours.")]
    ZeroLengthLoop { path: usize },

    #[error("{rows} depot assignment rows were given for {trains} paths.")]
    AssignmentCount { rows: usize, trains: usize },

    #[error("Depot assignment row {train} has {len} entries, expected one per depot ({expected}).")]
    AssignmentWidth {
        train: usize,
        len: usize,
        expected: usize,
    },

    #[error("Depot assignment row {train} contains {value}, only 0 and 1 are allowed.")]
    AssignmentValue { train: usize, value: u8 },

    #[error("Depot assignment row {train} selects {selected} depots, exactly one is required.")]
    AssignmentNotOneHot { train: usize, selected: usize },

    #[error("No depot assignment was given and none was computed.")]
    MissingAssignment,

    #[error("Train {train} is assigned to depot {depot}, but there are only {num_depots} depots.")]
    AssignedDepotOutOfRange {
        train: usize,
        depot: usize,
        num_depots: usize,
    },

    #[error("The daily hour budget must be positive.")]
    ZeroBudget,

    #[error("The daily hour budget of {budget} hours is longer than a day ({max} hours).")]
    BudgetTooLarge { budget: u64, max: u64 },

    #[error("Setting {name} is {value}, but it must be positive.")]
    NonPositiveRatio { name: &'static str, value: i64 },

    #[error("Cost {name} is {value}, but costs cannot be negative.")]
    NegativeCost { name: &'static str, value: i64 },

    #[error("Distance from {from:?} to {to:?} is {hours} hours, longer than the daily budget of {budget} hours.")]
    DistanceBeyondBudget {
        from: String,
        to: String,
        hours: u64,
        budget: u64,
    },

    #[error("Distance from depot {depot:?} to node {node:?} is {hours} hours, longer than the daily budget of {budget} hours.")]
    DepotDistanceBeyondBudget {
        depot: String,
        node: String,
        hours: u64,
        budget: u64,
    },
}

/// A train whose depot legs alone take longer than the daily budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfeasibleRoute {
    pub train: usize,
    pub depot: String,
    pub reason: DegenerateRoute,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("{} train(s) cannot reach their path and return within the daily budget: {}", .0.len(), describe_routes(.0))]
    InfeasibleRoutes(Vec<InfeasibleRoute>),

    #[error("Occupancy of train {train} reaches hour {hour}, beyond the daily budget of {budget} hours.")]
    GridOverflow { train: usize, hour: u64, budget: u64 },

    #[error("No depot assignment found: {reason}")]
    AssignmentNotFound { reason: String },

    #[error("No depot assignment satisfies the constraints {}", .conflict.join(", "))]
    AssignmentInfeasible { conflict: Vec<String> },
}

fn describe_routes(routes: &[InfeasibleRoute]) -> String {
    routes
        .iter()
        .map(|r| format!("train {} at depot {} ({})", r.train, r.depot, r.reason))
        .collect::<Vec<_>>()
        .join(", ")
}
