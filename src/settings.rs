use crate::error::InputError;
use serde::{Deserialize, Serialize};

/// Hour marks in a calendar day; the operating budget cannot exceed it.
pub const HOURS_PER_DAY: u64 = 24;

/// Planning parameters read from the `settings` section of the problem file.
/// Every field has a default, so the section may be left out entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    /// Hours a train may operate per day, depot legs included.
    pub daily_hour_budget: u64,
    /// Longest stretch (in hours) an electric train may go without charging.
    pub max_battery_gap: u64,
    /// One depot fuel station serves this many diesel trains.
    pub diesel_trains_per_fuel_station: i64,
    /// One depot charging station serves this many electric trains.
    pub electric_trains_per_charging_station: i64,
    /// Depot assignment: every depot gets at least this many trains.
    pub min_trains_per_depot: u64,
    /// Depot assignment: at most this many trains based at one depot may
    /// start their path at the same node.
    pub max_starts_per_node: u64,
    pub costs: Costs,
}

impl Default for PlanSettings {
    fn default() -> Self {
        PlanSettings {
            daily_hour_budget: 20,
            max_battery_gap: 8,
            diesel_trains_per_fuel_station: 2,
            electric_trains_per_charging_station: 3,
            min_trains_per_depot: 5,
            max_starts_per_node: 3,
            costs: Costs::default(),
        }
    }
}

impl PlanSettings {
    /// Number of hour marks in a day, `0..=daily_hour_budget`.
    pub fn num_hours(&self) -> usize {
        self.daily_hour_budget as usize + 1
    }

    /// Upper bound of the hours-since-last-charge counter. The counter
    /// starts at zero and grows by at most one per hour, so it can never
    /// exceed the budget; one more than that is a safe ceiling for the
    /// diesel branch of the gap constraint.
    pub fn gap_ceiling(&self) -> i64 {
        self.daily_hour_budget as i64 + 1
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.daily_hour_budget == 0 {
            return Err(InputError::ZeroBudget);
        }
        if self.daily_hour_budget > HOURS_PER_DAY {
            return Err(InputError::BudgetTooLarge {
                budget: self.daily_hour_budget,
                max: HOURS_PER_DAY,
            });
        }

        let ratios = [
            (
                "diesel_trains_per_fuel_station",
                self.diesel_trains_per_fuel_station,
            ),
            (
                "electric_trains_per_charging_station",
                self.electric_trains_per_charging_station,
            ),
        ];
        if let Some((name, value)) = ratios.iter().find(|(_, v)| *v <= 0) {
            return Err(InputError::NonPositiveRatio {
                name: *name,
                value: *value,
            });
        }

        if let Some((name, value)) = self.costs.entries().iter().find(|(_, v)| *v < 0) {
            return Err(InputError::NegativeCost {
                name: *name,
                value: *value,
            });
        }
        Ok(())
    }
}

/// Fixed and per-hour costs, in whole currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Costs {
    pub electric_train: i64,
    pub diesel_train: i64,
    pub depot_charging_station: i64,
    pub depot_fuel_station: i64,
    pub node_charging_station: i64,
    pub electric_hour: i64,
    pub diesel_hour: i64,
}

impl Costs {
    fn entries(&self) -> [(&'static str, i64); 7] {
        [
            ("electric_train", self.electric_train),
            ("diesel_train", self.diesel_train),
            ("depot_charging_station", self.depot_charging_station),
            ("depot_fuel_station", self.depot_fuel_station),
            ("node_charging_station", self.node_charging_station),
            ("electric_hour", self.electric_hour),
            ("diesel_hour", self.diesel_hour),
        ]
    }
}

impl Default for Costs {
    fn default() -> Self {
        Costs {
            electric_train: 750_000,
            diesel_train: 250_000,
            depot_charging_station: 1_000_000,
            depot_fuel_station: 800_000,
            node_charging_station: 350_000,
            electric_hour: 20_000,
            diesel_hour: 100_000,
        }
    }
}
