//! Narration of service change records.
//!
//! Records come from an external classifier and are only rendered here.

use std::collections::BTreeMap;

use crate::config::StopNames;
use crate::model::{Direction, DirectionScope, ServiceChange, ServiceChangeRecord, Span};

struct Narrator<'a> {
    route_id: &'a str,
    scope: DirectionScope,
    intro: String,
    names: &'a StopNames,
}

fn some_prefix(affects_some_trains: bool) -> &'static str {
    if affects_some_trains { "Some " } else { "" }
}

fn route_badges(routes: &[String]) -> String {
    routes
        .iter()
        .map(|r| format!("<{r}>"))
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Lists read "A, B, and C".
fn list_with_and(items: &[&str]) -> Option<String> {
    match items {
        [] => None,
        [only] => Some(only.to_string()),
        [init @ .., last] => Some(format!("{}, and {last}", init.join(", "))),
    }
}

impl<'a> Narrator<'a> {
    fn new(
        route_id: &'a str,
        scope: DirectionScope,
        destination: Option<&str>,
        names: &'a StopNames,
    ) -> Self {
        let intro = match (scope, destination) {
            (DirectionScope::Both, _) | (_, None) => format!("<{route_id}> trains are"),
            (_, Some(dest)) => format!("{dest}-bound trains are"),
        };
        Self {
            route_id,
            scope,
            intro,
            names,
        }
    }

    fn name<'s>(&'s self, stop_id: &'s str) -> &'s str {
        self.names.name(stop_id)
    }

    fn prepositions(&self) -> (&'static str, &'static str) {
        match self.scope {
            DirectionScope::Both => ("to/from", "to/from"),
            _ => ("from", "to"),
        }
    }

    /// Reroutes via other routes, unless the route is one of them.
    fn detours_via_other_routes(&self, change: &ServiceChange) -> bool {
        let related = change.related_routes();
        !related.is_empty() && !related.iter().any(|r| r == self.route_id)
    }

    fn narrate(&self, changes: &[&ServiceChange]) -> Vec<String> {
        if let Some(suspension) = changes
            .iter()
            .find(|c| matches!(c, ServiceChange::NoTrainService { .. }))
        {
            return vec![format!(
                "{}{} not running.",
                some_prefix(suspension.affects_some_trains()),
                self.intro
            )];
        }

        let mut notices = Vec::new();
        notices.extend(self.route_ends(changes));
        notices.extend(self.split_routing(changes));
        notices.extend(self.mid_route_reroutes(changes));
        notices.extend(self.skipped_stops(changes));
        notices.extend(self.local_stops(changes));
        notices
    }

    /// Truncations and reroutes touching either end of the route, told as a
    /// single "running between X and Y" sentence.
    fn route_ends(&self, changes: &[&ServiceChange]) -> Option<String> {
        let at = |pick: fn(&ServiceChange) -> bool| {
            changes
                .iter()
                .copied()
                .find(|c| pick(c))
                .and_then(|c| c.span().map(|s| (c, s)))
        };
        let begin = at(ServiceChange::begin_of_route);
        let end = at(ServiceChange::end_of_route);
        if begin.is_none() && end.is_none() {
            return None;
        }

        let prefix = some_prefix(changes.iter().any(|c| c.affects_some_trains()));
        let subject = match (self.scope, begin, end) {
            (DirectionScope::Both, _, _) => self.intro.clone(),
            (_, _, Some((_, span))) | (_, Some((_, span)), None) => {
                format!("{}-bound trains are", self.name(&span.destination))
            }
            (_, None, None) => self.intro.clone(),
        };
        let mut sentence = format!("{prefix}{subject} running");

        if let (Some((b, bs)), Some((e, es))) = (begin, end) {
            if let Some(two) = self.two_sections(b, bs, e, es) {
                return Some(format!("{sentence}{two}"));
            }
        }

        let same_change = matches!((begin, end), (Some((b, _)), Some((e, _))) if std::ptr::eq(b, e));
        let (begin_prep, end_prep) = self.prepositions();

        match (begin, end) {
            (Some((change @ ServiceChange::Rerouting { .. }, span)), _) => {
                if self.detours_via_other_routes(change) {
                    let via = route_badges(change.related_routes());
                    if same_change && span.first_station() == span.last_station() {
                        sentence += &format!(" via {via} to");
                    } else if same_change {
                        sentence += &format!(" via {via} between {} and", self.name(span.first_station()));
                    } else {
                        sentence += &format!(
                            " {begin_prep} {} via {via}, and between {} and",
                            self.name(span.first_station()),
                            self.name(span.last_station())
                        );
                    }
                } else {
                    sentence += &format!(" between {} and", self.name(span.first_station()));
                }
            }
            (Some((_, span)), _) => {
                sentence += &format!(" between {} and", self.name(span.last_station()));
            }
            (None, Some((_, span))) => {
                sentence += &format!(" between {} and", self.name(&span.origin));
            }
            (None, None) => return None,
        }

        match (end, begin) {
            (Some((change @ ServiceChange::Rerouting { .. }, span)), _) => {
                if !same_change && self.detours_via_other_routes(change) {
                    sentence += &format!(
                        " {}, via {} {end_prep} {}.",
                        self.name(span.first_station()),
                        route_badges(change.related_routes()),
                        self.name(span.last_station())
                    );
                } else {
                    sentence += &format!(" {}.", self.name(span.last_station()));
                }
            }
            (Some((_, span)), _) => {
                sentence += &format!(" {}.", self.name(span.first_station()));
            }
            (None, Some((_, span))) => {
                sentence += &format!(" {}.", self.name(&span.destination));
            }
            (None, None) => return None,
        }

        Some(sentence)
    }

    /// Both ends truncated around a shared middle: the route runs as two
    /// pieces.
    fn two_sections(
        &self,
        begin: &ServiceChange,
        begin_span: &Span,
        end: &ServiceChange,
        end_span: &Span,
    ) -> Option<String> {
        let both_truncated = matches!(begin, ServiceChange::Truncated { .. })
            && matches!(end, ServiceChange::Truncated { .. });
        if std::ptr::eq(begin, end) || !both_truncated {
            return None;
        }
        let overlap = begin_span
            .intermediate_stations()
            .iter()
            .any(|s| end_span.intermediate_stations().contains(s));
        if !overlap {
            return None;
        }
        Some(format!(
            " in two sections: between {} and {}, and {} and {}.",
            self.name(&end_span.origin),
            self.name(end_span.first_station()),
            self.name(begin_span.last_station()),
            self.name(&begin_span.destination)
        ))
    }

    fn split_routing(&self, changes: &[&ServiceChange]) -> Option<String> {
        changes.iter().find_map(|c| match c {
            ServiceChange::SplitRouting { first, second } => Some(format!(
                "{}{} running in two sections: between {} and {}, and between {} and {}.",
                some_prefix(c.affects_some_trains()),
                self.intro,
                self.name(first.first_station()),
                self.name(first.last_station()),
                self.name(second.first_station()),
                self.name(second.last_station())
            )),
            _ => None,
        })
    }

    fn mid_route_reroutes(&self, changes: &[&ServiceChange]) -> Vec<String> {
        changes
            .iter()
            .filter(|c| {
                matches!(c, ServiceChange::Rerouting { .. }) && !c.begin_of_route() && !c.end_of_route()
            })
            .filter_map(|c| {
                let span = c.span()?;
                let via = if self.detours_via_other_routes(c) {
                    format!(" via {}", route_badges(c.related_routes()))
                } else if c.related_routes().is_empty() {
                    let stops: Vec<&str> = span
                        .intermediate_stations()
                        .iter()
                        .map(|s| self.name(s))
                        .collect();
                    if stops.is_empty() {
                        String::new()
                    } else {
                        format!(" via {}", stops.join(", "))
                    }
                } else {
                    String::new()
                };
                Some(format!(
                    "{}{} running{via} between {} and {}.",
                    some_prefix(c.affects_some_trains()),
                    self.intro,
                    self.name(span.first_station()),
                    self.name(span.last_station())
                ))
            })
            .collect()
    }

    fn skipped_stops(&self, changes: &[&ServiceChange]) -> Option<String> {
        let express: Vec<&ServiceChange> = changes
            .iter()
            .copied()
            .filter(|c| matches!(c, ServiceChange::LocalToExpress { .. }))
            .collect();
        let skipped: Vec<&str> = express
            .iter()
            .filter_map(|c| c.span())
            .flat_map(|s| s.intermediate_stations())
            .map(|s| self.name(s))
            .collect();
        let text = list_with_and(&skipped)?;
        Some(format!(
            "{}{} skipping {text}.",
            some_prefix(express.iter().any(|c| c.affects_some_trains())),
            self.intro
        ))
    }

    fn local_stops(&self, changes: &[&ServiceChange]) -> Vec<String> {
        changes
            .iter()
            .filter_map(|c| match c {
                ServiceChange::ExpressToLocal { span } => Some(format!(
                    "{}{} making local stops between {} and {}.",
                    some_prefix(span.affects_some_trains),
                    self.intro,
                    self.name(span.first_station()),
                    self.name(span.last_station())
                )),
                _ => None,
            })
            .collect()
    }
}

/// Narrates a route's service changes, grouped by the scope they were
/// recorded under. `destinations` holds display names per direction.
/// Scopes with nothing to say are left out.
pub fn service_change_summaries(
    route_id: &str,
    records: &[ServiceChangeRecord],
    destinations: &BTreeMap<Direction, String>,
    names: &StopNames,
) -> BTreeMap<DirectionScope, Vec<String>> {
    let scopes = [DirectionScope::North, DirectionScope::South, DirectionScope::Both];
    scopes
        .into_iter()
        .filter_map(|scope| {
            let changes: Vec<&ServiceChange> = records
                .iter()
                .filter(|r| r.scope == scope && r.change.is_reportable())
                .map(|r| &r.change)
                .collect();
            if changes.is_empty() {
                return None;
            }
            let destination = match scope {
                DirectionScope::North => destinations.get(&Direction::North),
                DirectionScope::South => destinations.get(&Direction::South),
                DirectionScope::Both => None,
            };
            let notices =
                Narrator::new(route_id, scope, destination.map(String::as_str), names).narrate(&changes);
            (!notices.is_empty()).then_some((scope, notices))
        })
        .collect()
}
