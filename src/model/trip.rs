//! Trip-level types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered run of stop ids one way trips traverse a route in a direction.
pub type Routing = Vec<String>;

/// Travel direction of a trip. Feeds only distinguish two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::North, Direction::South];

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed pair of consecutive stops, the unit travel times are kept for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StopPair {
    pub from: String,
    pub to: String,
}

impl StopPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// All consecutive pairs along a routing.
    pub fn along(routing: &[String]) -> impl Iterator<Item = StopPair> + '_ {
        routing.windows(2).map(|w| StopPair::new(&w[0], &w[1]))
    }
}

impl fmt::Display for StopPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// An active vehicle trip as handed over by the feed processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripObservation {
    pub id: String,
    pub route_id: String,
    pub direction: Direction,
    /// Stops still to be visited, the first being the upcoming stop.
    pub upcoming_stops: Vec<String>,
    /// Estimated arrival at the upcoming stop, in unix seconds.
    pub upcoming_stop_arrival_time: i64,
    #[serde(default)]
    pub previous_stop: Option<String>,
    #[serde(default)]
    pub previous_stop_arrival_time: Option<i64>,
    /// Accumulated time the trip has spent stuck, in seconds.
    #[serde(default)]
    pub delayed_time: i64,
    /// Whether a real vehicle is assigned, as opposed to an inferred trip.
    #[serde(default = "default_assigned")]
    pub assigned: bool,
    /// Signed seconds behind (positive) or ahead of the timetable.
    #[serde(default)]
    pub schedule_discrepancy: i64,
}

fn default_assigned() -> bool {
    true
}

impl TripObservation {
    pub fn upcoming_stop(&self) -> Option<&str> {
        self.upcoming_stops.first().map(String::as_str)
    }

    pub fn destination(&self) -> Option<&str> {
        self.upcoming_stops.last().map(String::as_str)
    }

    /// Seconds until the trip reaches its upcoming stop, never negative.
    pub fn time_until_upcoming_stop(&self, timestamp: i64) -> f64 {
        (self.upcoming_stop_arrival_time - timestamp).max(0) as f64
    }
}

/// A trip enriched with headway and delay metrics for one routing group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTrip {
    pub id: String,
    pub previous_stop: Option<String>,
    pub previous_stop_arrival_time: Option<i64>,
    pub upcoming_stop: String,
    pub upcoming_stop_arrival_time: i64,
    pub estimated_upcoming_stop_arrival_time: i64,
    pub destination: String,
    /// Gap to the train ahead at scheduled pace.
    pub time_behind_next_train: Option<i64>,
    /// Gap to the train ahead at the recently observed pace.
    pub estimated_time_behind_next_train: Option<i64>,
    pub delayed_time: i64,
    pub delayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_pairs_along_routing() {
        let routing: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let pairs: Vec<_> = StopPair::along(&routing).map(|p| p.to_string()).collect();
        assert_eq!(pairs, vec!["a-b", "b-c"]);
    }

    #[test]
    fn test_time_until_upcoming_stop_clamps_at_zero() {
        let trip = TripObservation {
            id: "t".into(),
            route_id: "A".into(),
            direction: Direction::North,
            upcoming_stops: vec!["a".into()],
            upcoming_stop_arrival_time: 100,
            previous_stop: None,
            previous_stop_arrival_time: None,
            delayed_time: 0,
            assigned: true,
            schedule_discrepancy: 0,
        };
        assert_eq!(trip.time_until_upcoming_stop(40), 60.0);
        assert_eq!(trip.time_until_upcoming_stop(160), 0.0);
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::South).unwrap(), "\"south\"");
        assert_eq!(Direction::North.opposite(), Direction::South);
    }
}
