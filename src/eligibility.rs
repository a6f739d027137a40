use crate::occupancy::{Location, OccupancyGrid};
use crate::problem::{DepotId, NodeId};

/// Per-hour flags telling when a train stands somewhere it could charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// The train is at a network node on this hour mark.
    pub on_network: Vec<bool>,
    /// The train has come back to its depot at or before this hour mark.
    /// Once set it stays set for the rest of the day.
    pub ever_parked_by: Vec<bool>,
}

/// Charging site of an eligible hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingSite {
    Node(NodeId),
    Depot(DepotId),
}

impl Eligibility {
    pub fn derive(grid: &OccupancyGrid) -> Self {
        let on_network = grid
            .rows()
            .iter()
            .map(|row| matches!(row, Some(Location::Node(_))))
            .collect();

        // The hour-0 departure does not count as parking; only a depot
        // visit after the train has been out on the network does.
        let ever_parked_by = grid
            .rows()
            .iter()
            .scan((false, false), |(left, parked), row| {
                match row {
                    Some(Location::Node(_)) => *left = true,
                    Some(Location::Depot(_)) if *left => *parked = true,
                    _ => {}
                }
                Some(*parked)
            })
            .collect();

        Eligibility {
            on_network,
            ever_parked_by,
        }
    }

    pub fn can_charge(&self, hour: usize) -> bool {
        self.on_network[hour] || self.ever_parked_by[hour]
    }

    pub fn num_eligible(&self) -> usize {
        (0..self.on_network.len())
            .filter(|h| self.can_charge(*h))
            .count()
    }

    /// Where the train would charge at `hour`, if it can charge at all.
    pub fn site(&self, grid: &OccupancyGrid, depot: DepotId, hour: usize) -> Option<ChargingSite> {
        match grid.at(hour) {
            Some(Location::Node(n)) => Some(ChargingSite::Node(n)),
            _ if self.ever_parked_by[hour] => Some(ChargingSite::Depot(depot)),
            _ => None,
        }
    }
}
