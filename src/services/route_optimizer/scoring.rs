use crate::config::ScoreWeights;
use crate::constants::{MAX_RATING, MIN_RATING, SCORE_COST_NORMALISER, SCORE_DISTANCE_NORMALISER_KM};
use crate::models::{Route, RouteMode, RouteStop};
use std::collections::BTreeSet;

use super::Candidate;

/// Weighted sustainability score, lower is better:
/// `w_f * mean_fragility + w_d * distance / 1000 + w_c * cost / 100000`.
pub fn sustainability_score(
    weights: &ScoreWeights,
    mean_fragility: f64,
    total_distance_km: f64,
    total_cost: f64,
) -> f64 {
    weights.fragility * mean_fragility
        + weights.distance * (total_distance_km / SCORE_DISTANCE_NORMALISER_KM)
        + weights.cost * (total_cost / SCORE_COST_NORMALISER)
}

/// Build the immutable [`Route`] for candidates already in visiting order.
pub fn assemble_route(mode: RouteMode, ordered: &[Candidate], weights: &ScoreWeights) -> Route {
    let mut stops = Vec::with_capacity(ordered.len());
    let mut cumulative = 0.0;
    for (i, candidate) in ordered.iter().enumerate() {
        let leg = if i == 0 {
            0.0
        } else {
            ordered[i - 1]
                .location
                .coordinates
                .distance_to(&candidate.location.coordinates)
        };
        cumulative += leg;
        stops.push(RouteStop {
            location: candidate.location.clone(),
            order_in_route: i as u32 + 1,
            leg_distance_km: leg,
            distance_from_start_km: cumulative,
            predicted_rating: candidate
                .predicted_rating
                .map(|r| r.clamp(MIN_RATING, MAX_RATING)),
        });
    }

    let count = ordered.len().max(1) as f64;
    let total_distance_km = cumulative;
    let total_cost: f64 = ordered.iter().map(|c| c.location.entry_fee).sum();
    let mean_fragility = ordered
        .iter()
        .map(|c| c.location.fragility as f64)
        .sum::<f64>()
        / count;

    let ratings: Option<Vec<f64>> = stops.iter().map(|s| s.predicted_rating).collect();
    let mean_predicted_rating = match (mode, ratings) {
        (RouteMode::Personalized, Some(r)) if !r.is_empty() => {
            Some(r.iter().sum::<f64>() / r.len() as f64)
        }
        _ => None,
    };

    let provinces: Vec<String> = ordered
        .iter()
        .map(|c| c.location.province.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let ecosystems = ordered
        .iter()
        .map(|c| c.location.ecosystem)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let ids: Vec<u32> = ordered.iter().map(|c| c.location.id).collect();

    Route {
        id: Route::stable_id(mode, &ids),
        name: format!("{} route", mode),
        mode,
        stops,
        total_distance_km,
        total_cost,
        mean_fragility,
        sustainability_score: sustainability_score(
            weights,
            mean_fragility,
            total_distance_km,
            total_cost,
        ),
        mean_predicted_rating,
        provinces,
        ecosystems,
    }
}
