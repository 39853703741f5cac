use crate::models::{EcosystemType, Location};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    /// Sustainability-ranked routes that need no trained model
    Traditional,
    /// Routes ranked by predicted rating for a specific profile
    Personalized,
}

impl RouteMode {
    /// Prefix of the display name given to routes of this mode.
    pub fn route_label(&self) -> &'static str {
        match self {
            RouteMode::Traditional => "Sustainable Route",
            RouteMode::Personalized => "Personalized Route",
        }
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMode::Traditional => write!(f, "traditional"),
            RouteMode::Personalized => write!(f, "personalized"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteStop {
    #[serde(flatten)]
    pub location: Location,
    /// 1-based position in visiting order
    pub order_in_route: u32,
    /// Distance from the previous stop (0 for the first stop)
    pub leg_distance_km: f64,
    pub distance_from_start_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_rating: Option<f64>,
}

/// An ordered tour. Built once by the route optimizer and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub name: String,
    pub mode: RouteMode,
    pub stops: Vec<RouteStop>,
    pub total_distance_km: f64,
    pub total_cost: f64,
    pub mean_fragility: f64,
    /// Weighted fragility/distance/cost score, lower is better
    pub sustainability_score: f64,
    /// Mean clamped predicted rating of the stops (personalized mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_predicted_rating: Option<f64>,
    /// Distinct provinces, sorted
    pub provinces: Vec<String>,
    /// Distinct ecosystems, sorted
    pub ecosystems: Vec<EcosystemType>,
}

impl Route {
    /// Deterministic identifier derived from mode and visiting order, so
    /// identical tours always share an id.
    pub fn stable_id(mode: RouteMode, stop_ids: &[u32]) -> Uuid {
        let key = format!(
            "{}:{}",
            mode,
            stop_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("-")
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    pub fn location_ids(&self) -> Vec<u32> {
        self.stops.iter().map(|s| s.location.id).collect()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Score reported to consumers: sustainability score for traditional
    /// routes, mean predicted rating for personalized ones.
    pub fn headline_score(&self) -> f64 {
        match self.mode {
            RouteMode::Traditional => self.sustainability_score,
            RouteMode::Personalized => self
                .mean_predicted_rating
                .unwrap_or(self.sustainability_score),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn metrics(&self) -> RouteMetrics {
        RouteMetrics::compute(self)
    }

    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            id: self.id,
            name: self.name.clone(),
            mode: self.mode,
            location_count: self.stops.len(),
            total_distance_km: round2(self.total_distance_km),
            total_cost: self.total_cost,
            mean_fragility: round2(self.mean_fragility),
            score: (self.headline_score() * 1000.0).round() / 1000.0,
            provinces: self.provinces.clone(),
            ecosystems: self.ecosystems.clone(),
        }
    }

    pub fn detail(&self) -> RouteDetail {
        RouteDetail {
            summary: self.summary(),
            metrics: self.metrics(),
            stops: self.stops.clone(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derived figures used by reports to compare routes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteMetrics {
    pub avg_cost_per_location: f64,
    pub avg_distance_per_location_km: f64,
    /// 0.4 per province plus 0.6 per ecosystem visited
    pub diversity_score: f64,
    /// 5 minus mean fragility, higher is gentler on the environment
    pub sustainability_index: f64,
}

impl RouteMetrics {
    pub fn compute(route: &Route) -> Self {
        let count = route.stops.len().max(1) as f64;
        RouteMetrics {
            avg_cost_per_location: route.total_cost / count,
            avg_distance_per_location_km: route.total_distance_km / count,
            diversity_score: round2(
                route.provinces.len() as f64 * 0.4 + route.ecosystems.len() as f64 * 0.6,
            ),
            sustainability_index: round2(5.0 - route.mean_fragility),
        }
    }
}

/// Flat record consumed by tabular reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSummary {
    pub id: Uuid,
    pub name: String,
    pub mode: RouteMode,
    pub location_count: usize,
    pub total_distance_km: f64,
    pub total_cost: f64,
    pub mean_fragility: f64,
    pub score: f64,
    pub provinces: Vec<String>,
    pub ecosystems: Vec<EcosystemType>,
}

/// Full record: summary fields plus every stop with all location fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteDetail {
    #[serde(flatten)]
    pub summary: RouteSummary,
    pub metrics: RouteMetrics,
    pub stops: Vec<RouteStop>,
}

/// Result of a multi-route request. Shortfalls are reported here rather than
/// by silently returning fewer routes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteBatch {
    pub routes: Vec<Route>,
    pub requested: usize,
    /// Fewer routes than requested could be built
    pub partial: bool,
    /// At least one route revisits a location used by an earlier route
    pub reused_locations: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<String>,
}

impl RouteBatch {
    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.routes.iter().map(Route::summary).collect()
    }

    pub fn details(&self) -> Vec<RouteDetail> {
        self.routes.iter().map(Route::detail).collect()
    }
}
