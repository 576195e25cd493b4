//! Service change records produced by the external service change classifier.
//!
//! The engine never classifies changes itself. It only checks whether any are
//! present for a direction and narrates them.

use serde::{Deserialize, Serialize};

use crate::model::Direction;

/// Which side of a route a service change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionScope {
    North,
    South,
    Both,
}

impl DirectionScope {
    /// Whether a change with this scope applies to trains heading `direction`.
    pub fn covers(self, direction: Direction) -> bool {
        self == DirectionScope::Both || self == DirectionScope::from(direction)
    }
}

impl From<Direction> for DirectionScope {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::North => DirectionScope::North,
            Direction::South => DirectionScope::South,
        }
    }
}

/// End of a route a truncation cuts off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteEnd {
    Begin,
    End,
}

/// Stretch of stations a change affects, with the trip endpoints it was
/// observed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub origin: String,
    pub destination: String,
    pub stations_affected: Vec<String>,
    #[serde(default)]
    pub affects_some_trains: bool,
}

impl Span {
    pub fn first_station(&self) -> &str {
        self.stations_affected.first().map_or(self.origin.as_str(), String::as_str)
    }

    pub fn last_station(&self) -> &str {
        self.stations_affected
            .last()
            .map_or(self.destination.as_str(), String::as_str)
    }

    /// Affected stations strictly between the first and last.
    pub fn intermediate_stations(&self) -> &[String] {
        if self.stations_affected.len() < 3 {
            &[]
        } else {
            &self.stations_affected[1..self.stations_affected.len() - 1]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceChange {
    NoTrainService {
        #[serde(default)]
        affects_some_trains: bool,
    },
    Truncated {
        span: Span,
        cut: RouteEnd,
    },
    Rerouting {
        span: Span,
        #[serde(default)]
        related_routes: Vec<String>,
        #[serde(default)]
        begin_of_route: bool,
        #[serde(default)]
        end_of_route: bool,
    },
    SplitRouting {
        first: Span,
        second: Span,
    },
    LocalToExpress {
        span: Span,
    },
    ExpressToLocal {
        span: Span,
    },
    NotScheduled,
}

impl ServiceChange {
    pub fn affects_some_trains(&self) -> bool {
        match self {
            ServiceChange::NoTrainService {
                affects_some_trains,
            } => *affects_some_trains,
            ServiceChange::Truncated { span, .. }
            | ServiceChange::Rerouting { span, .. }
            | ServiceChange::LocalToExpress { span }
            | ServiceChange::ExpressToLocal { span } => span.affects_some_trains,
            ServiceChange::SplitRouting { first, second } => {
                first.affects_some_trains || second.affects_some_trains
            }
            ServiceChange::NotScheduled => false,
        }
    }

    pub fn begin_of_route(&self) -> bool {
        match self {
            ServiceChange::Truncated { cut, .. } => *cut == RouteEnd::Begin,
            ServiceChange::Rerouting { begin_of_route, .. } => *begin_of_route,
            _ => false,
        }
    }

    pub fn end_of_route(&self) -> bool {
        match self {
            ServiceChange::Truncated { cut, .. } => *cut == RouteEnd::End,
            ServiceChange::Rerouting { end_of_route, .. } => *end_of_route,
            _ => false,
        }
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            ServiceChange::Truncated { span, .. }
            | ServiceChange::Rerouting { span, .. }
            | ServiceChange::LocalToExpress { span }
            | ServiceChange::ExpressToLocal { span } => Some(span),
            ServiceChange::SplitRouting { first, .. } => Some(first),
            ServiceChange::NoTrainService { .. } | ServiceChange::NotScheduled => None,
        }
    }

    pub fn related_routes(&self) -> &[String] {
        match self {
            ServiceChange::Rerouting { related_routes, .. } => related_routes,
            _ => &[],
        }
    }

    /// Whether the change is narrated in a service change summary.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, ServiceChange::NotScheduled)
    }
}

/// A service change tagged with the direction it was observed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceChangeRecord {
    pub scope: DirectionScope,
    pub change: ServiceChange,
}
