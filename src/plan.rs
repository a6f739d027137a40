use crate::eligibility::ChargingSite;
use crate::error::PlanError;
use crate::formulation::{emit_depot_assignment, ChargingModel};
use crate::problem::{DepotId, Network, Problem};
use crate::solver::{MipSolver, Solution, SolveLimits, SolveOutcome};
use crate::timeline::TrainTimeline;
use log::*;
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};

#[derive(Debug)]
pub enum PlanningResult {
    Planned(FleetPlan),
    /// The solver stopped before it found any feasible assignment.
    NoSolution { reason: String },
    /// No assignment satisfies the model; `conflict` names constraints that
    /// cannot hold together.
    Infeasible { conflict: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanStatus {
    Optimal,
    /// Best solution found before the time limit.
    TimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerType {
    Diesel,
    Electric,
}

#[derive(Debug, Serialize)]
pub struct FleetPlan {
    pub status: PlanStatus,
    pub objective: i64,
    pub costs: CostBreakdown,
    pub trains: Vec<TrainPlan>,
    pub depots: Vec<DepotPlan>,
    pub nodes: Vec<NodePlan>,
    /// Every decision variable by name.
    pub variables: BTreeMap<String, i64>,
}

#[derive(Debug, Default, Serialize)]
pub struct CostBreakdown {
    pub trains: i64,
    pub operating_hours: i64,
    pub depot_stations: i64,
    pub node_stations: i64,
}

#[derive(Debug, Serialize)]
pub struct TrainPlan {
    pub name: String,
    pub depot: String,
    pub path: String,
    pub power: PowerType,
    pub max_loops: u64,
    pub max_hours: u64,
    pub charging: Vec<ChargeStop>,
    /// Longest run between charges over the day.
    pub longest_gap: i64,
}

#[derive(Debug, Serialize)]
pub struct ChargeStop {
    pub hour: usize,
    pub site: String,
}

#[derive(Debug, Serialize)]
pub struct DepotPlan {
    pub name: String,
    pub fuel_stations: i64,
    pub charging_stations: i64,
    pub diesel_trains: Vec<String>,
    pub electric_trains: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct NodePlan {
    pub name: String,
    pub charging_stations: i64,
}

/// Depot chosen for every path by the assignment model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotAssignment {
    pub status: PlanStatus,
    pub depots: Vec<DepotId>,
    /// Summed depot-to-start and depot-to-end hours.
    pub total_distance: i64,
}

pub fn assign_depots(
    network: &Network,
    solver: &mut impl MipSolver,
    limits: &SolveLimits,
) -> Result<DepotAssignment, PlanError> {
    let model = emit_depot_assignment(network);
    let (solution, status) = match solver.solve(&model.lp, limits) {
        SolveOutcome::Optimal(solution) => (solution, PlanStatus::Optimal),
        SolveOutcome::TimeLimit(solution) => {
            warn!("Time limit reached, using best depot assignment found");
            (solution, PlanStatus::TimeLimit)
        }
        SolveOutcome::NoSolution { reason } => {
            return Err(PlanError::AssignmentNotFound { reason })
        }
        SolveOutcome::Infeasible { conflict } => {
            return Err(PlanError::AssignmentInfeasible { conflict })
        }
    };

    let depots = model.depots(&solution.values);
    for (k, depot) in network.depots.iter().enumerate() {
        let based = depots
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == k)
            .map(|(i, _)| format!("T{}", i + 1))
            .collect::<Vec<_>>();
        info!("Depot {}: {}", depot.name, based.join(" "));
    }
    Ok(DepotAssignment {
        status,
        depots,
        total_distance: solution.objective,
    })
}

pub fn solve_fleet(
    problem: &Problem,
    timelines: &[TrainTimeline],
    model: &ChargingModel,
    solver: &mut impl MipSolver,
    limits: &SolveLimits,
) -> PlanningResult {
    match solver.solve(&model.lp, limits) {
        SolveOutcome::Optimal(solution) => {
            info!("Optimal plan found, cost {}", solution.objective);
            PlanningResult::Planned(fleet_plan(
                problem,
                timelines,
                model,
                &solution,
                PlanStatus::Optimal,
            ))
        }
        SolveOutcome::TimeLimit(solution) => {
            warn!(
                "Time limit reached, using best plan found (cost {})",
                solution.objective
            );
            PlanningResult::Planned(fleet_plan(
                problem,
                timelines,
                model,
                &solution,
                PlanStatus::TimeLimit,
            ))
        }
        SolveOutcome::NoSolution { reason } => {
            warn!("No plan found: {}", reason);
            PlanningResult::NoSolution { reason }
        }
        SolveOutcome::Infeasible { conflict } => {
            warn!("Model is infeasible, conflicting constraints: {:?}", conflict);
            PlanningResult::Infeasible { conflict }
        }
    }
}

pub fn fleet_plan(
    problem: &Problem,
    timelines: &[TrainTimeline],
    model: &ChargingModel,
    solution: &Solution,
    status: PlanStatus,
) -> FleetPlan {
    let v = &model.vars;
    let costs = &problem.settings.costs;
    let mut breakdown = CostBreakdown::default();

    let trains = timelines
        .iter()
        .map(|tl| {
            let i = tl.train;
            let t = &problem.trains[i];
            let power = if solution.is_set(v.electric[i]) {
                PowerType::Electric
            } else {
                PowerType::Diesel
            };
            let hours = tl.plan.max_hours as i64;
            let (fixed, hourly) = match power {
                PowerType::Diesel => (costs.diesel_train, costs.diesel_hour),
                PowerType::Electric => (costs.electric_train, costs.electric_hour),
            };
            breakdown.trains += fixed;
            breakdown.operating_hours += hourly * hours;

            let charging = (0..tl.grid.num_hours())
                .filter(|r| solution.is_set(v.charging[i][*r]))
                .map(|r| ChargeStop {
                    hour: r,
                    site: match tl.eligibility.site(&tl.grid, t.depot, r) {
                        Some(ChargingSite::Node(n)) => problem.nodes[n].clone(),
                        Some(ChargingSite::Depot(d)) => problem.depots[d].name.clone(),
                        None => "?".to_string(),
                    },
                })
                .collect();
            let longest_gap = v.gap[i]
                .iter()
                .map(|g| solution.value(*g))
                .max()
                .unwrap_or(0);

            TrainPlan {
                name: t.name.clone(),
                depot: problem.depots[t.depot].name.clone(),
                path: problem.path_string(i),
                power,
                max_loops: tl.plan.max_loops,
                max_hours: tl.plan.max_hours,
                charging,
                longest_gap,
            }
        })
        .collect::<Vec<_>>();

    let depots = problem
        .depots
        .iter()
        .enumerate()
        .map(|(k, depot)| {
            let fuel_stations = solution.value(v.fuel_stations[k]);
            let charging_stations = solution.value(v.depot_chargers[k]);
            breakdown.depot_stations += fuel_stations * costs.depot_fuel_station
                + charging_stations * costs.depot_charging_station;
            let names = |power: PowerType| {
                problem
                    .trains_at(k)
                    .filter(|i| trains[*i].power == power)
                    .map(|i| trains[i].name.clone())
                    .collect::<Vec<_>>()
            };
            DepotPlan {
                name: depot.name.clone(),
                fuel_stations,
                charging_stations,
                diesel_trains: names(PowerType::Diesel),
                electric_trains: names(PowerType::Electric),
            }
        })
        .collect::<Vec<_>>();

    let nodes = problem
        .nodes
        .iter()
        .zip(v.node_chargers.iter())
        .map(|(name, r)| {
            let charging_stations = solution.value(*r);
            breakdown.node_stations += charging_stations * costs.node_charging_station;
            NodePlan {
                name: name.clone(),
                charging_stations,
            }
        })
        .collect::<Vec<_>>();

    let variables = model
        .lp
        .variables
        .iter()
        .zip(solution.values.iter())
        .map(|(var, value)| (var.name.clone(), *value))
        .collect();

    FleetPlan {
        status,
        objective: solution.objective,
        costs: breakdown,
        trains,
        depots,
        nodes,
        variables,
    }
}

pub fn write_plan_json(filename: &Path, plan: &FleetPlan) -> std::io::Result<()> {
    std::fs::write(filename, serde_json::to_string_pretty(plan)?)?;
    Ok(())
}

pub fn print_plan(plan: &FleetPlan) -> String {
    let mut summary = String::new();
    summary.push_str(&format!(
        "Status {:?}, total cost {}\n",
        plan.status, plan.objective
    ));
    summary.push_str(&format!(
        "  trains {}  operating {}  depot stations {}  node stations {}\n",
        plan.costs.trains,
        plan.costs.operating_hours,
        plan.costs.depot_stations,
        plan.costs.node_stations
    ));

    for t in plan.trains.iter() {
        let charging = t
            .charging
            .iter()
            .map(|c| format!("{}@{}", c.site, c.hour))
            .collect::<Vec<_>>();
        summary.push_str(&format!(
            "{:<4} @{:<3} {:<9} {:>2}x {:<12} {:>2}h  {}\n",
            t.name,
            t.depot,
            format!("{:?}", t.power),
            t.max_loops,
            t.path,
            t.max_hours,
            if charging.is_empty() {
                "___".to_string()
            } else {
                charging.join(" ")
            }
        ));
    }

    for d in plan.depots.iter() {
        summary.push_str(&format!(
            "Depot {}: {} fuel, {} charging  diesel [{}]  electric [{}]\n",
            d.name,
            d.fuel_stations,
            d.charging_stations,
            d.diesel_trains.join(", "),
            d.electric_trains.join(", ")
        ));
    }

    let stations = plan
        .nodes
        .iter()
        .filter(|n| n.charging_stations > 0)
        .map(|n| format!("{}x{}", n.name, n.charging_stations))
        .collect::<Vec<_>>();
    summary.push_str(&format!("Node chargers: {}\n", stations.join(" ")));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulation::emit;
    use crate::problem::convert_network;
    use crate::problem::tests::{raw_reference, reference};
    use crate::solver::Z3Optimizer;
    use crate::timeline::build_timelines;
    use std::time::Duration;

    fn small_fleet(trains: usize) -> Problem {
        let mut problem = reference();
        problem.trains.truncate(trains);
        problem
    }

    fn planned(result: PlanningResult) -> FleetPlan {
        match result {
            PlanningResult::Planned(plan) => plan,
            other => panic!("no plan: {:?}", other),
        }
    }

    #[test]
    fn small_fleet_plan_is_consistent() {
        let problem = small_fleet(3);
        let timelines = build_timelines(&problem).unwrap();
        let model = emit(&problem, &timelines);
        let result = solve_fleet(
            &problem,
            &timelines,
            &model,
            &mut Z3Optimizer::new(),
            &SolveLimits::default(),
        );
        let plan = planned(result);

        assert_eq!(plan.status, PlanStatus::Optimal);
        assert_eq!(plan.trains.len(), 3);
        assert_eq!(
            plan.objective,
            plan.costs.trains
                + plan.costs.operating_hours
                + plan.costs.depot_stations
                + plan.costs.node_stations
        );
        let values = model
            .lp
            .variables
            .iter()
            .map(|v| plan.variables[&v.name])
            .collect::<Vec<_>>();
        assert!(model.lp.violations(&values).is_empty());

        for t in plan.trains.iter() {
            match t.power {
                PowerType::Electric => assert!(t.longest_gap <= 8, "{} gap {}", t.name, t.longest_gap),
                PowerType::Diesel => assert!(t.charging.is_empty()),
            }
        }
        let based: usize = plan
            .depots
            .iter()
            .map(|d| d.diesel_trains.len() + d.electric_trains.len())
            .sum();
        assert_eq!(based, 3);
    }

    #[test]
    fn expensive_electricity_means_diesel() {
        let mut problem = small_fleet(2);
        problem.settings.costs.electric_train = 50_000_000;
        let timelines = build_timelines(&problem).unwrap();
        let model = emit(&problem, &timelines);
        let plan = planned(solve_fleet(
            &problem,
            &timelines,
            &model,
            &mut Z3Optimizer::new(),
            &SolveLimits::default(),
        ));

        assert!(plan.trains.iter().all(|t| t.power == PowerType::Diesel));
        // Trains 0 (X) and 1 (Y) each need a fuel station at their depot.
        assert_eq!(plan.depots[0].fuel_stations, 1);
        assert_eq!(plan.depots[1].fuel_stations, 1);
        assert!(plan.nodes.iter().all(|n| n.charging_stations == 0));
        // 15 hours each
        let costs = &problem.settings.costs;
        assert_eq!(
            plan.objective,
            2 * (costs.diesel_train + 15 * costs.diesel_hour) + 2 * costs.depot_fuel_station
        );

        let summary = print_plan(&plan);
        assert!(summary.contains("Depot X: 1 fuel, 0 charging  diesel [T1]  electric []"));
    }

    #[test]
    fn too_short_battery_gap_forces_diesel() {
        // With a one hour gap, an electric train would have to charge at
        // every hour mark, including hours spent between stops.
        let mut problem = small_fleet(1);
        problem.settings.max_battery_gap = 1;
        problem.settings.costs.diesel_train = 10_000_000;
        let timelines = build_timelines(&problem).unwrap();
        let model = emit(&problem, &timelines);
        let plan = planned(solve_fleet(
            &problem,
            &timelines,
            &model,
            &mut Z3Optimizer::new(),
            &SolveLimits::default(),
        ));
        assert_eq!(plan.trains[0].power, PowerType::Diesel);
    }

    #[test]
    fn reference_paths_get_their_nearest_depot() {
        let network = convert_network(raw_reference()).unwrap();
        let assignment =
            assign_depots(&network, &mut Z3Optimizer::new(), &SolveLimits::default()).unwrap();

        assert_eq!(assignment.status, PlanStatus::Optimal);
        // Every path can take its nearer depot within the caps.
        assert_eq!(assignment.total_distance, 50);
        for (train, depot) in [
            (1, 1),
            (2, 0),
            (5, 0),
            (6, 1),
            (8, 1),
            (9, 0),
            (10, 1),
            (13, 0),
            (14, 1),
        ]
        .iter()
        {
            assert_eq!(assignment.depots[*train], *depot, "T{}", train + 1);
        }
        for k in 0..2 {
            assert!(assignment.depots.iter().filter(|d| **d == k).count() >= 5);
            for start in 0..8 {
                let starting = (0..15)
                    .filter(|i| network.paths[*i][0] == start && assignment.depots[*i] == k)
                    .count();
                assert!(starting <= 3);
            }
        }

        let problem = network.into_problem(&assignment.depots).unwrap();
        assert_eq!(build_timelines(&problem).unwrap().len(), 15);
    }

    #[test]
    fn start_cap_can_make_assignment_infeasible() {
        // Four paths start at A, but two depots may take only one each.
        let mut raw = raw_reference();
        raw.settings.max_starts_per_node = 1;
        let network = convert_network(raw).unwrap();
        match assign_depots(&network, &mut Z3Optimizer::new(), &SolveLimits::default()) {
            Err(PlanError::AssignmentInfeasible { conflict }) => {
                assert!(!conflict.is_empty());
                assert!(conflict
                    .iter()
                    .all(|c| c.starts_with("assign_") || c.starts_with("start_cap_")));
                assert_eq!(
                    conflict.iter().filter(|c| c.starts_with("start_cap_")).count(),
                    2
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reference_fleet_solves_within_limit() {
        let problem = reference();
        let timelines = build_timelines(&problem).unwrap();
        let model = emit(&problem, &timelines);
        let limits = SolveLimits {
            time_limit: Some(Duration::from_secs(120)),
        };
        let plan = planned(solve_fleet(
            &problem,
            &timelines,
            &model,
            &mut Z3Optimizer::new(),
            &limits,
        ));

        assert!(matches!(
            plan.status,
            PlanStatus::Optimal | PlanStatus::TimeLimit
        ));
        assert_eq!(plan.trains.len(), 15);
        let values = model
            .lp
            .variables
            .iter()
            .map(|v| plan.variables[&v.name])
            .collect::<Vec<_>>();
        assert!(model.lp.violations(&values).is_empty());
        assert_eq!(plan.objective, model.lp.objective.evaluate(&values));
    }
}
