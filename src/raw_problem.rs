use serde::Deserialize;

use crate::settings::PlanSettings;

/// The problem file as it is stored on disk. Nodes and depots are referred
/// to by name; `problem::convert_network` validates it and resolves indices.
#[derive(Deserialize, Debug)]
pub struct Problem {
    pub nodes: Vec<String>,
    /// Travel hours between nodes, row = from, column = to.
    pub distances: Vec<Vec<u64>>,
    pub depots: Vec<Depot>,
    /// One path per train, as node names in travel order.
    pub paths: Vec<Vec<String>>,
    /// One-hot row over `depots` per path. When left out, the depots are
    /// chosen by the assignment model.
    #[serde(default)]
    pub assigned_depots: Option<Vec<Vec<u8>>>,
    #[serde(default)]
    pub settings: PlanSettings,
}

#[derive(Deserialize, Debug)]
pub struct Depot {
    pub name: String,
    /// Travel hours from the depot to each node, in `nodes` order.
    pub node_distances: Vec<u64>,
}
