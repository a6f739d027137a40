use crate::eligibility::ChargingSite;
use crate::lp::{Domain, LinExpr, LinearProgram, VarId};
use crate::problem::{DepotId, Network, Problem};
use crate::timeline::TrainTimeline;
use log::*;
use velcro::iter;

/// Decision variables of the charging model, indexed by depot, train,
/// node and hour as in `Problem`.
#[derive(Debug, Clone)]
pub struct ModelVars {
    /// `s_k`: fuel stations at depot k.
    pub fuel_stations: Vec<VarId>,
    /// `t_k`: charging stations at depot k.
    pub depot_chargers: Vec<VarId>,
    /// `d_i`: train i runs on diesel.
    pub diesel: Vec<VarId>,
    /// `e_i`: train i runs on electricity.
    pub electric: Vec<VarId>,
    /// `r_j`: charging stations at node j.
    pub node_chargers: Vec<VarId>,
    /// `c_ir`: train i charges at hour r.
    pub charging: Vec<Vec<VarId>>,
    /// `g_ir`: hours since train i last charged, at hour r.
    pub gap: Vec<Vec<VarId>>,
}

#[derive(Debug, Clone)]
pub struct ChargingModel {
    pub lp: LinearProgram,
    pub vars: ModelVars,
}

/// Emits the power-type, station-sizing and charging program for a fleet
/// whose depots are already assigned. `timelines[i]` must belong to train i.
pub fn emit(problem: &Problem, timelines: &[TrainTimeline]) -> ChargingModel {
    let _p = hprof::enter("emit model");
    assert_eq!(timelines.len(), problem.trains.len());

    let settings = &problem.settings;
    let costs = &settings.costs;
    let hours = settings.num_hours();
    let ceiling = settings.gap_ceiling();
    let max_gap = (settings.max_battery_gap as i64).min(ceiling);

    let mut lp = LinearProgram::new();

    let fuel_stations = (0..problem.num_depots())
        .map(|k| lp.add_var(format!("s_{}", k), Domain::non_negative()))
        .collect::<Vec<_>>();
    let depot_chargers = (0..problem.num_depots())
        .map(|k| lp.add_var(format!("t_{}", k), Domain::non_negative()))
        .collect::<Vec<_>>();
    let diesel = (0..problem.trains.len())
        .map(|i| lp.add_var(format!("d_{}", i), Domain::Binary))
        .collect::<Vec<_>>();
    let electric = (0..problem.trains.len())
        .map(|i| lp.add_var(format!("e_{}", i), Domain::Binary))
        .collect::<Vec<_>>();
    let node_chargers = (0..problem.num_nodes())
        .map(|j| lp.add_var(format!("r_{}", j), Domain::non_negative()))
        .collect::<Vec<_>>();
    let charging = (0..problem.trains.len())
        .map(|i| {
            (0..hours)
                .map(|r| lp.add_var(format!("c_{}_{}", i, r), Domain::Binary))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let gap_domain = Domain::Integer {
        lower: 0,
        upper: Some(ceiling),
    };
    let gap = (0..problem.trains.len())
        .map(|i| {
            (0..hours)
                .map(|r| lp.add_var(format!("g_{}_{}", i, r), gap_domain))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    // POWER TYPE
    for i in 0..problem.trains.len() {
        lp.add_constraint(
            format!("power_{}", i),
            LinExpr::new().term(diesel[i], 1).term(electric[i], 1).equals(1),
        );
    }

    // DEPOT FACILITIES
    for k in 0..problem.num_depots() {
        let based = problem.trains_at(k).collect::<Vec<_>>();

        let fuel = iter![
            ..based.iter().map(|i| (diesel[*i], 1)),
            (fuel_stations[k], -settings.diesel_trains_per_fuel_station),
        ]
        .collect::<LinExpr>();
        lp.add_constraint(format!("fuel_cover_{}", k), fuel.le(0));

        let chargers = iter![
            ..based.iter().map(|i| (electric[*i], 1)),
            (
                depot_chargers[k],
                -settings.electric_trains_per_charging_station
            ),
        ]
        .collect::<LinExpr>();
        lp.add_constraint(format!("charger_cover_{}", k), chargers.le(0));
    }

    // NODE CHARGING STATIONS
    // Trains charging at the same node in the same hour each need a station.
    let mut num_peak_rows = 0;
    for j in 0..problem.num_nodes() {
        for r in 0..hours {
            let present = timelines
                .iter()
                .filter(|tl| {
                    let depot = problem.trains[tl.train].depot;
                    tl.eligibility.site(&tl.grid, depot, r) == Some(ChargingSite::Node(j))
                })
                .map(|tl| (charging[tl.train][r], 1))
                .collect::<LinExpr>();
            if present.is_empty() {
                continue;
            }
            trace!("node {} hour {}: {} trains present", j, r, present.terms.len());
            lp.add_constraint(
                format!("node_peak_{}_{}", j, r),
                present.term(node_chargers[j], -1).le(0),
            );
            num_peak_rows += 1;
        }
    }
    debug!("{} node peak rows", num_peak_rows);

    // CHARGING LEGALITY
    for tl in timelines.iter() {
        let i = tl.train;
        for r in 0..hours {
            if tl.eligibility.can_charge(r) {
                lp.add_constraint(
                    format!("electric_only_{}_{}", i, r),
                    LinExpr::new().term(charging[i][r], 1).term(electric[i], -1).le(0),
                );
            } else {
                lp.add_constraint(
                    format!("not_eligible_{}_{}", i, r),
                    LinExpr::new().term(charging[i][r], 1).le(0),
                );
            }
        }
    }

    // BATTERY GAP
    // Reset on a charging hour, otherwise one more than the hour before.
    for i in 0..problem.trains.len() {
        lp.add_constraint(
            format!("gap_start_{}", i),
            LinExpr::new().term(gap[i][0], 1).equals(0),
        );
        for r in 1..hours {
            lp.add_indicator(
                format!("gap_reset_{}_{}", i, r),
                charging[i][r],
                true,
                LinExpr::new().term(gap[i][r], 1).le(0),
            );
            lp.add_indicator(
                format!("gap_step_{}_{}", i, r),
                charging[i][r],
                false,
                LinExpr::new()
                    .term(gap[i][r], 1)
                    .term(gap[i][r - 1], -1)
                    .equals(1),
            );
        }
        // Electric: g <= max_gap. Diesel: g <= ceiling, which always holds.
        for r in 0..hours {
            lp.add_constraint(
                format!("gap_limit_{}_{}", i, r),
                LinExpr::new()
                    .term(gap[i][r], 1)
                    .term(diesel[i], -(ceiling - max_gap))
                    .le(max_gap),
            );
        }
    }

    // OBJECTIVE
    let mut objective = LinExpr::new();
    for tl in timelines.iter() {
        let i = tl.train;
        let h = tl.plan.max_hours as i64;
        objective.add(diesel[i], costs.diesel_hour * h + costs.diesel_train);
        objective.add(electric[i], costs.electric_hour * h + costs.electric_train);
    }
    for k in 0..problem.num_depots() {
        objective.add(fuel_stations[k], costs.depot_fuel_station);
        objective.add(depot_chargers[k], costs.depot_charging_station);
    }
    for r in node_chargers.iter() {
        objective.add(*r, costs.node_charging_station);
    }
    lp.minimize(objective);

    info!(
        "Emitted model with {} variables and {} constraints",
        lp.num_vars(),
        lp.constraints.len()
    );

    ChargingModel {
        lp,
        vars: ModelVars {
            fuel_stations,
            depot_chargers,
            diesel,
            electric,
            node_chargers,
            charging,
            gap,
        },
    }
}

/// Depot assignment program and its `x_i_k` variables.
#[derive(Debug, Clone)]
pub struct AssignmentModel {
    pub lp: LinearProgram,
    /// `x_ik`: path i is based at depot k.
    pub assign: Vec<Vec<VarId>>,
}

impl AssignmentModel {
    /// Depot of each path in `values`.
    pub fn depots(&self, values: &[i64]) -> Vec<DepotId> {
        self.assign
            .iter()
            .map(|row| {
                row.iter()
                    .position(|x| values[x.index()] == 1)
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Emits the covering program that bases every path at one depot. Each
/// depot receives at least `min_trains_per_depot` paths, no depot has more
/// than `max_starts_per_node` paths starting at the same node, and the
/// total depot-to-start plus depot-to-end distance is minimised.
pub fn emit_depot_assignment(network: &Network) -> AssignmentModel {
    let _p = hprof::enter("emit assignment");
    let settings = &network.settings;
    let mut lp = LinearProgram::new();

    let assign = (0..network.paths.len())
        .map(|i| {
            (0..network.num_depots())
                .map(|k| lp.add_var(format!("x_{}_{}", i, k), Domain::Binary))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    for (i, row) in assign.iter().enumerate() {
        lp.add_constraint(
            format!("assign_{}", i),
            row.iter().map(|x| (*x, 1)).collect::<LinExpr>().equals(1),
        );
    }

    for k in 0..network.num_depots() {
        lp.add_constraint(
            format!("depot_min_{}", k),
            assign
                .iter()
                .map(|row| (row[k], 1))
                .collect::<LinExpr>()
                .ge(settings.min_trains_per_depot as i64),
        );
    }

    for j in 0..network.num_nodes() {
        let starting = (0..network.paths.len())
            .filter(|i| network.paths[*i][0] == j)
            .collect::<Vec<_>>();
        if starting.is_empty() {
            continue;
        }
        for k in 0..network.num_depots() {
            lp.add_constraint(
                format!("start_cap_{}_{}", j, k),
                starting
                    .iter()
                    .map(|i| (assign[*i][k], 1))
                    .collect::<LinExpr>()
                    .le(settings.max_starts_per_node as i64),
            );
        }
    }

    let mut objective = LinExpr::new();
    for (path, row) in network.paths.iter().zip(assign.iter()) {
        let (first, last) = (path[0], path[path.len() - 1]);
        for (depot, x) in network.depots.iter().zip(row.iter()) {
            let legs = depot.node_distances[first] + depot.node_distances[last];
            objective.add(*x, legs as i64);
        }
    }
    lp.minimize(objective);

    info!(
        "Emitted depot assignment with {} variables and {} constraints",
        lp.num_vars(),
        lp.constraints.len()
    );
    AssignmentModel { lp, assign }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::lp::ConstraintKind;
    use crate::problem::convert_network;
    use crate::problem::tests::{raw_reference, reference};
    use crate::timeline::build_timelines;

    pub fn reference_model() -> (Problem, Vec<TrainTimeline>, ChargingModel) {
        let problem = reference();
        let timelines = build_timelines(&problem).unwrap();
        let model = emit(&problem, &timelines);
        (problem, timelines, model)
    }

    #[test]
    fn variable_counts_follow_the_network() {
        let (_, _, model) = reference_model();
        let lp = &model.lp;
        assert_eq!(lp.count_vars_with_prefix("c_"), 15 * 21);
        assert_eq!(lp.count_vars_with_prefix("g_"), 15 * 21);
        assert_eq!(lp.count_vars_with_prefix("s_"), 2);
        assert_eq!(lp.count_vars_with_prefix("t_"), 2);
        assert_eq!(lp.count_vars_with_prefix("r_"), 8);
        assert_eq!(lp.count_vars_with_prefix("d_"), 15);
        assert_eq!(lp.count_vars_with_prefix("e_"), 15);
        assert_eq!(lp.num_vars(), 2 + 2 + 15 + 15 + 8 + 2 * 15 * 21);

        assert_eq!(model.vars.charging.len(), 15);
        assert!(model.vars.charging.iter().all(|c| c.len() == 21));
        assert!(model.vars.gap.iter().all(|g| g.len() == 21));
    }

    #[test]
    fn every_term_refers_to_a_declared_variable() {
        let (_, _, model) = reference_model();
        let lp = &model.lp;
        let n = lp.num_vars();
        for c in lp.constraints.iter() {
            let (terms, guard) = match &c.kind {
                ConstraintKind::Linear(l) => (&l.lhs.terms, None),
                ConstraintKind::Indicator { guard, then, .. } => (&then.lhs.terms, Some(*guard)),
            };
            assert!(terms.iter().all(|(v, _)| v.index() < n), "{}", c.name);
            assert!(guard.map(|g| g.index() < n).unwrap_or(true));
        }
        assert!(lp.objective.terms.iter().all(|(v, _)| v.index() < n));
    }

    #[test]
    fn constraint_families() {
        let (_, timelines, model) = reference_model();
        let count = |prefix: &str| {
            model
                .lp
                .constraints
                .iter()
                .filter(|c| c.name.starts_with(prefix))
                .count()
        };
        assert_eq!(count("power_"), 15);
        assert_eq!(count("fuel_cover_"), 2);
        assert_eq!(count("charger_cover_"), 2);
        assert_eq!(count("gap_start_"), 15);
        assert_eq!(count("gap_reset_"), 15 * 20);
        assert_eq!(count("gap_step_"), 15 * 20);
        assert_eq!(count("gap_limit_"), 15 * 21);
        assert_eq!(count("electric_only_") + count("not_eligible_"), 15 * 21);

        let eligible: usize = timelines.iter().map(|t| t.eligibility.num_eligible()).sum();
        assert_eq!(count("electric_only_"), eligible);
    }

    #[test]
    fn node_peak_rows_group_trains_by_hour() {
        let (_, _, model) = reference_model();
        // Node A (0) at hour 1: trains 0, 5, 9 (depot X, one hour out)
        // and train 13.
        let row = model
            .lp
            .constraints
            .iter()
            .find(|c| c.name == "node_peak_0_1")
            .unwrap();
        match &row.kind {
            ConstraintKind::Linear(l) => {
                let trains = l
                    .lhs
                    .terms
                    .iter()
                    .filter(|(_, coef)| *coef == 1)
                    .count();
                assert_eq!(trains, 4);
                assert!(l.lhs.terms.contains(&(model.vars.node_chargers[0], -1)));
                assert!(l.lhs.terms.contains(&(model.vars.charging[0][1], 1)));
                assert!(l.lhs.terms.contains(&(model.vars.charging[13][1], 1)));
                assert_eq!(l.rhs, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn all_diesel_is_feasible_and_priced() {
        let (problem, timelines, model) = reference_model();
        let v = &model.vars;
        let mut values = vec![0; model.lp.num_vars()];
        for i in 0..15 {
            values[v.diesel[i].index()] = 1;
            for r in 0..21 {
                values[v.gap[i][r].index()] = r as i64;
            }
        }
        // 7 diesel trains at X need 4 fuel stations, 8 at Y need 4.
        values[v.fuel_stations[0].index()] = 4;
        values[v.fuel_stations[1].index()] = 4;
        assert!(model.lp.violations(&values).is_empty());

        values[v.fuel_stations[0].index()] = 3;
        assert_eq!(model.lp.violations(&values), vec!["fuel_cover_0".to_string()]);
        values[v.fuel_stations[0].index()] = 4;

        let hours: i64 = timelines.iter().map(|t| t.plan.max_hours as i64).sum();
        let costs = &problem.settings.costs;
        assert_eq!(
            model.lp.objective.evaluate(&values),
            hours * costs.diesel_hour + 15 * costs.diesel_train + 8 * costs.depot_fuel_station
        );
    }

    #[test]
    fn electric_gap_must_stay_below_limit() {
        let (_, _, model) = reference_model();
        let v = &model.vars;
        let mut values = vec![0; model.lp.num_vars()];
        for i in 0..15 {
            values[v.diesel[i].index()] = 1;
            for r in 0..21 {
                values[v.gap[i][r].index()] = r as i64;
            }
        }
        values[v.fuel_stations[0].index()] = 4;
        values[v.fuel_stations[1].index()] = 4;

        // Switch train 0 to electric without charging: the counter passes 8.
        values[v.diesel[0].index()] = 0;
        values[v.electric[0].index()] = 1;
        values[v.depot_chargers[0].index()] = 1;
        let violations = model.lp.violations(&values);
        assert_eq!(violations.len(), 12);
        assert!(violations.iter().all(|name| name.starts_with("gap_limit_0_")));
        assert!(violations.contains(&"gap_limit_0_9".to_string()));
        assert!(!violations.contains(&"gap_limit_0_8".to_string()));

        // Charging at node B at hour 3 and node C at hour 12, with a
        // station at each node.
        for (r, g) in (0..21).map(|r| {
            let g = if r < 3 {
                r
            } else if r < 12 {
                r - 3
            } else {
                r - 12
            };
            (r, g)
        }) {
            values[v.gap[0][r].index()] = g as i64;
        }
        values[v.charging[0][3].index()] = 1;
        values[v.charging[0][12].index()] = 1;
        values[v.node_chargers[1].index()] = 1;
        values[v.node_chargers[2].index()] = 1;
        assert!(model.lp.violations(&values).is_empty());

        // Charging while in transit is not allowed.
        values[v.charging[0][4].index()] = 1;
        values[v.gap[0][4].index()] = 0;
        assert!(model
            .lp
            .violations(&values)
            .contains(&"not_eligible_0_4".to_string()));
    }

    #[test]
    fn depot_assignment_rows() {
        let network = convert_network(raw_reference()).unwrap();
        let model = emit_depot_assignment(&network);
        let lp = &model.lp;
        let count = |prefix: &str| {
            lp.constraints
                .iter()
                .filter(|c| c.name.starts_with(prefix))
                .count()
        };
        assert_eq!(lp.num_vars(), 15 * 2);
        assert_eq!(count("assign_"), 15);
        assert_eq!(count("depot_min_"), 2);
        // Every node starts some path.
        assert_eq!(count("start_cap_"), 8 * 2);

        // The reference file's own assignment puts four trains starting
        // at A at depot X.
        let reference = reference();
        let mut values = vec![0; lp.num_vars()];
        for (i, t) in reference.trains.iter().enumerate() {
            values[model.assign[i][t.depot].index()] = 1;
        }
        assert_eq!(lp.violations(&values), vec!["start_cap_0_0".to_string()]);
        assert_eq!(lp.objective.evaluate(&values), 52);
        assert_eq!(
            model.depots(&values),
            reference.trains.iter().map(|t| t.depot).collect::<Vec<_>>()
        );
    }
}
