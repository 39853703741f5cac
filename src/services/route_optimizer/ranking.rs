use crate::constants::{ANCHOR_CLUSTER_BONUS, MAX_FRAGILITY, NEUTRAL_RATING, REUSE_PENALTY};
use crate::models::{Coordinates, Route, RouteMode};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::Candidate;

/// Capability that distinguishes the two generation modes. The optimizer
/// asks it how to prioritise candidates, where to start the tour and which
/// of several finished routes is preferable.
pub trait RankingStrategy: Send + Sync {
    fn mode(&self) -> RouteMode;

    /// Selection priority, higher is picked first
    fn priority(&self, candidate: &Candidate) -> f64;

    /// Index into `selected` of the stop that opens the tour
    fn tour_start(&self, selected: &[Candidate], reference: &Coordinates) -> usize;

    /// `Less` when `a` should be preferred over `b`
    fn compare_routes(&self, a: &Route, b: &Route) -> Ordering;
}

/// Traditional mode: robust, attractive locations first; tours start near the
/// reference city; the sustainability score decides between routes.
pub struct SustainabilityRanking;

impl RankingStrategy for SustainabilityRanking {
    fn mode(&self) -> RouteMode {
        RouteMode::Traditional
    }

    fn priority(&self, candidate: &Candidate) -> f64 {
        (MAX_FRAGILITY - candidate.location.fragility) as f64
            + candidate.features.composite_attractiveness
    }

    fn tour_start(&self, selected: &[Candidate], reference: &Coordinates) -> usize {
        closest_to(selected, reference)
    }

    fn compare_routes(&self, a: &Route, b: &Route) -> Ordering {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.sustainability_score.total_cmp(&b.sustainability_score))
            .then_with(|| a.location_ids().cmp(&b.location_ids()))
    }
}

/// Personalized mode: predicted rating plus collaborative bonus first; tours
/// start at the best-rated pick.
pub struct PredictedRatingRanking;

impl RankingStrategy for PredictedRatingRanking {
    fn mode(&self) -> RouteMode {
        RouteMode::Personalized
    }

    fn priority(&self, candidate: &Candidate) -> f64 {
        candidate.predicted_rating.unwrap_or(NEUTRAL_RATING) + candidate.collaborative_bonus
    }

    fn tour_start(&self, selected: &[Candidate], _reference: &Coordinates) -> usize {
        highest_priority(self, selected)
    }

    fn compare_routes(&self, a: &Route, b: &Route) -> Ordering {
        let rating = |r: &Route| r.mean_predicted_rating.unwrap_or(NEUTRAL_RATING);
        b.len()
            .cmp(&a.len())
            .then_with(|| rating(b).total_cmp(&rating(a)))
            .then_with(|| a.sustainability_score.total_cmp(&b.sustainability_score))
            .then_with(|| a.location_ids().cmp(&b.location_ids()))
    }
}

/// Wraps another strategy so that members of one cluster are drawn first.
/// Used to build distinct variants of a route for the orchestrator to choose from.
pub struct AnchoredRanking<'a> {
    inner: &'a dyn RankingStrategy,
    cluster: usize,
}

impl<'a> AnchoredRanking<'a> {
    pub fn new(inner: &'a dyn RankingStrategy, cluster: usize) -> Self {
        Self { inner, cluster }
    }
}

impl RankingStrategy for AnchoredRanking<'_> {
    fn mode(&self) -> RouteMode {
        self.inner.mode()
    }

    fn priority(&self, candidate: &Candidate) -> f64 {
        let bonus = if candidate.cluster == self.cluster {
            ANCHOR_CLUSTER_BONUS
        } else {
            0.0
        };
        self.inner.priority(candidate) + bonus
    }

    fn tour_start(&self, selected: &[Candidate], reference: &Coordinates) -> usize {
        self.inner.tour_start(selected, reference)
    }

    fn compare_routes(&self, a: &Route, b: &Route) -> Ordering {
        self.inner.compare_routes(a, b)
    }
}

/// Wraps another strategy so that locations already used by earlier routes
/// of a batch lose `REUSE_PENALTY` priority per use. Less-used locations are
/// drawn first, which spreads repeated visits across the catalog.
pub struct ReusePenaltyRanking<'a> {
    inner: &'a dyn RankingStrategy,
    uses: &'a HashMap<u32, usize>,
}

impl<'a> ReusePenaltyRanking<'a> {
    pub fn new(inner: &'a dyn RankingStrategy, uses: &'a HashMap<u32, usize>) -> Self {
        Self { inner, uses }
    }
}

impl RankingStrategy for ReusePenaltyRanking<'_> {
    fn mode(&self) -> RouteMode {
        self.inner.mode()
    }

    fn priority(&self, candidate: &Candidate) -> f64 {
        let uses = self.uses.get(&candidate.location.id).copied().unwrap_or(0);
        self.inner.priority(candidate) - REUSE_PENALTY * uses as f64
    }

    fn tour_start(&self, selected: &[Candidate], reference: &Coordinates) -> usize {
        self.inner.tour_start(selected, reference)
    }

    fn compare_routes(&self, a: &Route, b: &Route) -> Ordering {
        self.inner.compare_routes(a, b)
    }
}

fn closest_to(selected: &[Candidate], reference: &Coordinates) -> usize {
    selected
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = a.location.coordinates.distance_to(reference);
            let db = b.location.coordinates.distance_to(reference);
            da.total_cmp(&db).then(a.location.id.cmp(&b.location.id))
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn highest_priority(ranking: &dyn RankingStrategy, selected: &[Candidate]) -> usize {
    selected
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            ranking
                .priority(b)
                .total_cmp(&ranking.priority(a))
                .then(a.location.id.cmp(&b.location.id))
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}
