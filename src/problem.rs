use crate::error::InputError;
use crate::raw_problem;
use crate::settings::PlanSettings;
use log::*;
use std::collections::{HashMap, HashSet};

pub type NodeId = usize;
pub type DepotId = usize;
pub type TrainId = usize;

/// Validated network, fleet and depot assignment. Immutable for the whole
/// planning run.
#[derive(Debug, Clone)]
pub struct Problem {
    pub nodes: Vec<String>,
    pub distances: Vec<Vec<u64>>,
    pub depots: Vec<Depot>,
    pub trains: Vec<Train>,
    pub settings: PlanSettings,
}

#[derive(Debug, Clone)]
pub struct Depot {
    pub name: String,
    pub node_distances: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct Train {
    pub name: String,
    /// Nodes of the looped route in travel order; the last node connects
    /// back to the first.
    pub path: Vec<NodeId>,
    pub depot: DepotId,
}

impl Problem {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_depots(&self) -> usize {
        self.depots.len()
    }

    pub fn distance(&self, from: NodeId, to: NodeId) -> u64 {
        self.distances[from][to]
    }

    pub fn depot_distance(&self, depot: DepotId, node: NodeId) -> u64 {
        self.depots[depot].node_distances[node]
    }

    /// Trains based at `depot`.
    pub fn trains_at(&self, depot: DepotId) -> impl Iterator<Item = TrainId> + '_ {
        self.trains
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.depot == depot)
            .map(|(i, _)| i)
    }

    pub fn path_string(&self, train: TrainId) -> String {
        self.trains[train]
            .path
            .iter()
            .map(|n| self.nodes[*n].as_str())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl Train {
    pub fn first_node(&self) -> NodeId {
        self.path[0]
    }

    pub fn last_node(&self) -> NodeId {
        self.path[self.path.len() - 1]
    }
}

/// Network, paths and settings of a problem file before trains are tied to
/// depots.
#[derive(Debug, Clone)]
pub struct Network {
    pub nodes: Vec<String>,
    pub distances: Vec<Vec<u64>>,
    pub depots: Vec<Depot>,
    pub paths: Vec<Vec<NodeId>>,
    pub settings: PlanSettings,
}

impl Network {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_depots(&self) -> usize {
        self.depots.len()
    }

    /// Bases path `i` at depot `assignment[i]`.
    pub fn into_problem(self, assignment: &[DepotId]) -> Result<Problem, InputError> {
        if assignment.len() != self.paths.len() {
            return Err(InputError::AssignmentCount {
                rows: assignment.len(),
                trains: self.paths.len(),
            });
        }
        if let Some((train, depot)) = assignment
            .iter()
            .enumerate()
            .find(|(_, d)| **d >= self.depots.len())
        {
            return Err(InputError::AssignedDepotOutOfRange {
                train,
                depot: *depot,
                num_depots: self.depots.len(),
            });
        }

        let trains = self
            .paths
            .into_iter()
            .zip(assignment.iter())
            .enumerate()
            .map(|(idx, (path, depot))| Train {
                name: format!("T{}", idx + 1),
                path,
                depot: *depot,
            })
            .collect();

        let problem = Problem {
            nodes: self.nodes,
            distances: self.distances,
            depots: self.depots,
            trains,
            settings: self.settings,
        };

        let mut summary = String::new();
        for (idx, train) in problem.trains.iter().enumerate() {
            summary.push_str(&format!(
                "{:<4} @{:<3} {}\n",
                train.name,
                problem.depots[train.depot].name,
                problem.path_string(idx)
            ));
        }
        debug!("Fleet:\n{}", summary);

        Ok(problem)
    }
}

/// Validates a problem file that carries its own depot assignment.
pub fn convert_raw(mut raw: raw_problem::Problem) -> Result<Problem, InputError> {
    let rows = raw
        .assigned_depots
        .take()
        .ok_or(InputError::MissingAssignment)?;
    let network = convert_network(raw)?;
    let assignment = assignment_from_rows(&rows, network.paths.len(), network.num_depots())?;
    network.into_problem(&assignment)
}

/// Validates everything in a problem file except the depot assignment.
pub fn convert_network(raw: raw_problem::Problem) -> Result<Network, InputError> {
    let raw_problem::Problem {
        nodes,
        distances,
        depots,
        paths,
        settings,
        ..
    } = raw;

    if nodes.is_empty() {
        return Err(InputError::NoNodes);
    }
    if depots.is_empty() {
        return Err(InputError::NoDepots);
    }
    settings.validate()?;
    let budget = settings.daily_hour_budget;

    let mut node_index: HashMap<&str, NodeId> = HashMap::new();
    for (idx, name) in nodes.iter().enumerate() {
        if node_index.insert(name.as_str(), idx).is_some() {
            return Err(InputError::DuplicateNode { name: name.clone() });
        }
    }

    let mut depot_names = HashSet::new();
    for depot in depots.iter() {
        if !depot_names.insert(depot.name.as_str()) {
            return Err(InputError::DuplicateDepot {
                name: depot.name.clone(),
            });
        }
        if depot.node_distances.len() != nodes.len() {
            return Err(InputError::DepotDistances {
                depot: depot.name.clone(),
                len: depot.node_distances.len(),
                expected: nodes.len(),
            });
        }
        if let Some((node, hours)) = depot
            .node_distances
            .iter()
            .enumerate()
            .find(|(_, h)| **h > budget)
        {
            return Err(InputError::DepotDistanceBeyondBudget {
                depot: depot.name.clone(),
                node: nodes[node].clone(),
                hours: *hours,
                budget,
            });
        }
    }

    if distances.len() != nodes.len() {
        return Err(InputError::DistanceRows {
            rows: distances.len(),
            expected: nodes.len(),
        });
    }
    for (row, values) in distances.iter().enumerate() {
        if values.len() != nodes.len() {
            return Err(InputError::DistanceColumns {
                row,
                len: values.len(),
                expected: nodes.len(),
            });
        }
        if let Some((col, hours)) = values.iter().enumerate().find(|(_, h)| **h > budget) {
            return Err(InputError::DistanceBeyondBudget {
                from: nodes[row].clone(),
                to: nodes[col].clone(),
                hours: *hours,
                budget,
            });
        }
    }

    let mut node_paths = Vec::with_capacity(paths.len());
    for (path_idx, path) in paths.iter().enumerate() {
        if path.len() < 2 {
            return Err(InputError::PathTooShort {
                path: path_idx,
                len: path.len(),
            });
        }

        let mut seen = HashSet::new();
        let mut node_path = Vec::with_capacity(path.len());
        for name in path.iter() {
            let node = *node_index
                .get(name.as_str())
                .ok_or_else(|| InputError::UnknownNode {
                    path: path_idx,
                    node: name.clone(),
                })?;
            if !seen.insert(node) {
                return Err(InputError::RepeatedNode {
                    path: path_idx,
                    node: name.clone(),
                });
            }
            node_path.push(node);
        }

        // Every leg is at most the budget, so this sum stays small.
        let loop_length: u64 = node_path
            .windows(2)
            .map(|w| distances[w[0]][w[1]])
            .sum();
        if loop_length == 0 {
            return Err(InputError::ZeroLengthLoop { path: path_idx });
        }

        node_paths.push(node_path);
    }

    let depots = depots
        .into_iter()
        .map(|d| Depot {
            name: d.name,
            node_distances: d.node_distances,
        })
        .collect::<Vec<_>>();

    Ok(Network {
        nodes,
        distances,
        depots,
        paths: node_paths,
        settings,
    })
}

fn assignment_from_rows(
    rows: &[Vec<u8>],
    num_paths: usize,
    num_depots: usize,
) -> Result<Vec<DepotId>, InputError> {
    if rows.len() != num_paths {
        return Err(InputError::AssignmentCount {
            rows: rows.len(),
            trains: num_paths,
        });
    }
    rows.iter()
        .enumerate()
        .map(|(train, row)| one_hot_depot(train, row, num_depots))
        .collect()
}

fn one_hot_depot(train: usize, row: &[u8], num_depots: usize) -> Result<DepotId, InputError> {
    if row.len() != num_depots {
        return Err(InputError::AssignmentWidth {
            train,
            len: row.len(),
            expected: num_depots,
        });
    }
    if let Some(value) = row.iter().copied().find(|v| *v > 1) {
        return Err(InputError::AssignmentValue { train, value });
    }
    let selected = row.iter().filter(|v| **v == 1).count();
    if selected != 1 {
        return Err(InputError::AssignmentNotOneHot { train, selected });
    }
    Ok(row.iter().position(|v| *v == 1).unwrap_or_default())
}
