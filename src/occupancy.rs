use crate::error::PlanError;
use crate::loops::LoopPlan;
use crate::problem::{DepotId, NodeId, Problem, TrainId};
use serde::Serialize;

/// Where a train is at an hour mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Location {
    Node(NodeId),
    Depot(DepotId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopKind {
    Departure,
    Arrival,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stop {
    pub hour: u64,
    pub location: Location,
    pub kind: StopKind,
}

/// Hour-by-location table of one train's day. Row `r` holds the location
/// the train is at on hour mark `r`, or nothing while it is between stops.
/// When two stops fall on the same hour, the later one holds the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyGrid {
    rows: Vec<Option<Location>>,
    stops: Vec<Stop>,
}

impl OccupancyGrid {
    pub fn rows(&self) -> &[Option<Location>] {
        &self.rows
    }

    pub fn at(&self, hour: usize) -> Option<Location> {
        self.rows[hour]
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn num_hours(&self) -> usize {
        self.rows.len()
    }

    /// Last hour with a location set.
    pub fn last_hour(&self) -> Option<usize> {
        self.rows.iter().rposition(|r| r.is_some())
    }

    /// The grid as one-hot rows over nodes followed by depots.
    pub fn one_hot(&self, num_nodes: usize, num_depots: usize) -> Vec<Vec<u8>> {
        self.rows
            .iter()
            .map(|row| {
                let mut cols = vec![0; num_nodes + num_depots];
                match row {
                    Some(Location::Node(n)) => cols[*n] = 1,
                    Some(Location::Depot(d)) => cols[num_nodes + *d] = 1,
                    None => {}
                }
                cols
            })
            .collect()
    }
}

struct GridWriter {
    rows: Vec<Option<Location>>,
    stops: Vec<Stop>,
    hour: u64,
    train: TrainId,
}

impl GridWriter {
    fn advance(&mut self, hours: u64) {
        self.hour += hours;
    }

    fn mark(&mut self, location: Location, kind: StopKind) -> Result<(), PlanError> {
        let budget = self.rows.len() as u64 - 1;
        let row = self
            .rows
            .get_mut(self.hour as usize)
            .ok_or(PlanError::GridOverflow {
                train: self.train,
                hour: self.hour,
                budget,
            })?;
        *row = Some(location);
        self.stops.push(Stop {
            hour: self.hour,
            location,
            kind,
        });
        Ok(())
    }
}

/// Walks the train's day: out from the depot, `max_loops` traversals of the
/// path with the return leg between them, and back to the depot.
pub fn build_occupancy(
    problem: &Problem,
    train: TrainId,
    plan: &LoopPlan,
) -> Result<OccupancyGrid, PlanError> {
    let t = &problem.trains[train];
    let depot = Location::Depot(t.depot);
    let mut w = GridWriter {
        rows: vec![None; problem.settings.num_hours()],
        stops: Vec::new(),
        hour: 0,
        train,
    };

    w.mark(depot, StopKind::Departure)?;
    w.advance(plan.depot_to_start);
    w.mark(Location::Node(t.first_node()), StopKind::Arrival)?;

    for repetition in 0..plan.max_loops {
        for leg in t.path.windows(2) {
            w.advance(problem.distance(leg[0], leg[1]));
            w.mark(Location::Node(leg[1]), StopKind::Arrival)?;
        }
        if repetition + 1 < plan.max_loops {
            w.advance(plan.return_leg);
            w.mark(Location::Node(t.first_node()), StopKind::Arrival)?;
        }
    }

    w.advance(plan.depot_to_end);
    w.mark(depot, StopKind::Return)?;

    Ok(OccupancyGrid {
        rows: w.rows,
        stops: w.stops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::{loop_capacity, tests::shuttle, LoopCapacity};
    use crate::problem::tests::reference;

    fn plan_for(problem: &Problem, train: TrainId) -> LoopPlan {
        match loop_capacity(problem, train) {
            LoopCapacity::Feasible(plan) => plan,
            other => panic!("train {} is {:?}", train, other),
        }
    }

    #[test]
    fn first_reference_train() {
        let problem = reference();
        let grid = build_occupancy(&problem, 0, &plan_for(&problem, 0)).unwrap();
        let (a, b, c) = (Location::Node(0), Location::Node(1), Location::Node(2));
        let x = Location::Depot(0);

        let expected = [
            (0, x),
            (1, a),
            (3, b),
            (5, c),
            (8, a),
            (10, b),
            (12, c),
            (15, x),
        ];
        for hour in 0..grid.num_hours() {
            let want = expected.iter().find(|(h, _)| *h == hour).map(|(_, l)| *l);
            assert_eq!(grid.at(hour), want, "hour {}", hour);
        }
        assert_eq!(grid.num_hours(), 21);
        assert_eq!(grid.stops().len(), 8);
    }

    #[test]
    fn grid_ends_at_max_hours_with_one_departure_and_return() {
        let problem = reference();
        for train in 0..problem.trains.len() {
            let plan = plan_for(&problem, train);
            let grid = build_occupancy(&problem, train, &plan).unwrap();

            assert_eq!(grid.last_hour(), Some(plan.max_hours as usize));
            let departures = grid
                .stops()
                .iter()
                .filter(|s| s.kind == StopKind::Departure)
                .collect::<Vec<_>>();
            let returns = grid
                .stops()
                .iter()
                .filter(|s| s.kind == StopKind::Return)
                .collect::<Vec<_>>();
            assert_eq!(departures.len(), 1);
            assert_eq!(returns.len(), 1);
            assert_eq!(departures[0].hour, 0);
            assert_eq!(returns[0].hour, plan.max_hours);

            let arrivals = grid
                .stops()
                .iter()
                .filter(|s| s.kind == StopKind::Arrival)
                .count() as u64;
            let path_len = problem.trains[train].path.len() as u64;
            assert_eq!(arrivals, plan.max_loops * path_len);
        }
    }

    #[test]
    fn one_more_loop_would_overflow() {
        let problem = reference();
        for train in 0..problem.trains.len() {
            let plan = plan_for(&problem, train);
            let longer = LoopPlan {
                max_loops: plan.max_loops + 1,
                ..plan
            };
            match build_occupancy(&problem, train, &longer) {
                Err(PlanError::GridOverflow { train: t, budget, .. }) => {
                    assert_eq!(t, train);
                    assert_eq!(budget, 20);
                }
                other => panic!("train {} did not overflow: {:?}", train, other),
            }
        }
    }

    #[test]
    fn zero_depot_legs_share_hours() {
        let problem = shuttle(4, 0, 20);
        let plan = plan_for(&problem, 0);
        let grid = build_occupancy(&problem, 0, &plan).unwrap();

        assert_eq!(grid.at(0), Some(Location::Node(0)));
        assert_eq!(grid.at(4), Some(Location::Node(1)));
        assert_eq!(grid.at(8), Some(Location::Node(0)));
        assert_eq!(grid.at(20), Some(Location::Depot(0)));
        assert_eq!(grid.stops()[0].kind, StopKind::Departure);
        assert_eq!(grid.stops().last().map(|s| s.kind), Some(StopKind::Return));
        assert_eq!(grid.last_hour(), Some(20));
    }

    #[test]
    fn zero_loops_drive_out_and_back() {
        let problem = shuttle(9, 6, 20);
        let plan = plan_for(&problem, 0);
        assert_eq!(plan.max_loops, 0);
        let grid = build_occupancy(&problem, 0, &plan).unwrap();

        assert_eq!(grid.at(0), Some(Location::Depot(0)));
        assert_eq!(grid.at(6), Some(Location::Node(0)));
        assert_eq!(grid.at(12), Some(Location::Depot(0)));
        assert_eq!(grid.last_hour(), Some(12));
        assert_eq!(grid.stops().len(), 3);
    }

    #[test]
    fn one_hot_rows_have_at_most_one_column() {
        let problem = reference();
        let grid = build_occupancy(&problem, 3, &plan_for(&problem, 3)).unwrap();
        let table = grid.one_hot(8, 2);
        assert_eq!(table.len(), 21);
        assert!(table.iter().all(|row| row.len() == 10));
        assert!(table.iter().all(|row| row.iter().sum::<u8>() <= 1));
        // Depot Y is the second depot column.
        assert_eq!(table[0][9], 1);
        assert_eq!(table[2][1], 1);
        assert_eq!(table[13][9], 1);
    }

    #[test]
    fn building_twice_is_identical() {
        let problem = reference();
        let plan = plan_for(&problem, 7);
        let first = build_occupancy(&problem, 7, &plan).unwrap();
        let second = build_occupancy(&problem, 7, &plan).unwrap();
        assert_eq!(first, second);
    }
}
