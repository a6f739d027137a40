use crate::eligibility::Eligibility;
use crate::error::{InfeasibleRoute, PlanError};
use crate::loops::{loop_capacity, LoopCapacity, LoopPlan};
use crate::occupancy::{build_occupancy, OccupancyGrid, Stop};
use crate::problem::{Problem, TrainId};
use log::*;
use serde::Serialize;
use std::path::Path;
use velcro::iter;

/// Everything derived for one train before the model is emitted.
#[derive(Debug, Clone)]
pub struct TrainTimeline {
    pub train: TrainId,
    pub plan: LoopPlan,
    pub grid: OccupancyGrid,
    pub eligibility: Eligibility,
}

/// Timelines of the trains that can operate, and the trains that cannot.
#[derive(Debug, Clone)]
pub struct FleetTimelines {
    pub timelines: Vec<TrainTimeline>,
    pub degenerate: Vec<InfeasibleRoute>,
}

impl FleetTimelines {
    /// All timelines, in train order, or an error listing every train whose
    /// depot legs do not fit into the day.
    pub fn into_complete(self) -> Result<Vec<TrainTimeline>, PlanError> {
        if self.degenerate.is_empty() {
            Ok(self.timelines)
        } else {
            Err(PlanError::InfeasibleRoutes(self.degenerate))
        }
    }
}

/// Loop plan, occupancy grid and eligibility for each train that can
/// operate at its depot. Degenerate trains are collected, not returned as
/// an error.
pub fn derive_timelines(problem: &Problem) -> Result<FleetTimelines, PlanError> {
    let _p = hprof::enter("timelines");

    let mut degenerate = Vec::new();
    let mut timelines = Vec::new();
    for (train, t) in problem.trains.iter().enumerate() {
        let plan = match loop_capacity(problem, train) {
            LoopCapacity::Feasible(plan) => plan,
            LoopCapacity::Degenerate(reason) => {
                degenerate.push(InfeasibleRoute {
                    train,
                    depot: problem.depots[t.depot].name.clone(),
                    reason,
                });
                continue;
            }
        };

        let grid = build_occupancy(problem, train, &plan)?;
        let eligibility = Eligibility::derive(&grid);
        debug!(
            "{}: {} loops, back at {}h, {} hours eligible for charging",
            t.name,
            plan.max_loops,
            plan.max_hours,
            eligibility.num_eligible()
        );
        timelines.push(TrainTimeline {
            train,
            plan,
            grid,
            eligibility,
        });
    }

    info!(
        "Built timelines for {} trains over {} hour marks",
        timelines.len(),
        problem.settings.num_hours()
    );
    if !degenerate.is_empty() {
        warn!("{} trains cannot operate at their depot", degenerate.len());
    }
    Ok(FleetTimelines {
        timelines,
        degenerate,
    })
}

/// Loop plan, occupancy grid and eligibility for every train. Fails if any
/// train cannot reach its path and return within the day; all such trains
/// are listed.
pub fn build_timelines(problem: &Problem) -> Result<Vec<TrainTimeline>, PlanError> {
    derive_timelines(problem)?.into_complete()
}

#[derive(Serialize)]
struct TimelinesJson<'a> {
    columns: Vec<&'a str>,
    trains: Vec<TrainJson<'a>>,
    infeasible: Vec<InfeasibleJson<'a>>,
}

#[derive(Serialize)]
struct TrainJson<'a> {
    train: &'a str,
    depot: &'a str,
    path: String,
    max_loops: u64,
    max_hours: u64,
    stops: &'a [Stop],
    grid: Vec<Vec<u8>>,
    on_network: &'a [bool],
    ever_parked_by: &'a [bool],
}

#[derive(Serialize)]
struct InfeasibleJson<'a> {
    train: &'a str,
    depot: &'a str,
    path: String,
    reason: String,
}

pub fn write_timelines_json(
    filename: &Path,
    problem: &Problem,
    fleet: &FleetTimelines,
) -> std::io::Result<()> {
    let columns = iter![
        ..problem.nodes.iter().map(|n| n.as_str()),
        ..problem.depots.iter().map(|d| d.name.as_str()),
    ]
    .collect::<Vec<_>>();
    let trains = fleet
        .timelines
        .iter()
        .map(|tl| {
            let t = &problem.trains[tl.train];
            TrainJson {
                train: &t.name,
                depot: &problem.depots[t.depot].name,
                path: problem.path_string(tl.train),
                max_loops: tl.plan.max_loops,
                max_hours: tl.plan.max_hours,
                stops: tl.grid.stops(),
                grid: tl.grid.one_hot(problem.num_nodes(), problem.num_depots()),
                on_network: &tl.eligibility.on_network,
                ever_parked_by: &tl.eligibility.ever_parked_by,
            }
        })
        .collect();
    let infeasible = fleet
        .degenerate
        .iter()
        .map(|route| InfeasibleJson {
            train: &problem.trains[route.train].name,
            depot: &route.depot,
            path: problem.path_string(route.train),
            reason: route.reason.to_string(),
        })
        .collect();
    let json = TimelinesJson {
        columns,
        trains,
        infeasible,
    };
    std::fs::write(filename, serde_json::to_string_pretty(&json)?)?;
    Ok(())
}
