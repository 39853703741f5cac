use crate::constants::MAX_FRAGILITY;
use crate::models::{Route, RouteBatch, UserProfile};

const SUSTAINABILITY_WEIGHT: f64 = 0.3;
const BUDGET_WEIGHT: f64 = 0.2;
const DIVERSITY_WEIGHT: f64 = 0.2;
const SCORE_WEIGHT: f64 = 0.3;
/// Sustainability scores at or above this count as zero relevance.
const SCORE_CEILING: f64 = 10.0;

/// How well a finished route suits `profile`, in [0, 1].
///
/// Combines the profile's sustainability preference applied to the route's
/// mean fragility, how comfortably the route fits the budget, the number of
/// provinces and ecosystems visited, and the route's sustainability score.
pub fn relevance_score(route: &Route, profile: &UserProfile) -> f64 {
    let max_fragility = MAX_FRAGILITY as f64;
    let gentleness = ((max_fragility - route.mean_fragility) / max_fragility).max(0.0);
    let sustainability = profile.sustainability * gentleness;

    let budget_fit = if route.total_cost > 0.0 {
        (profile.max_budget / route.total_cost).min(1.0)
    } else {
        1.0
    };

    let diversity =
        (route.provinces.len() as f64 * 0.1 + route.ecosystems.len() as f64 * 0.1) / 5.0;

    let score = (1.0 - route.sustainability_score / SCORE_CEILING).max(0.0);

    (SUSTAINABILITY_WEIGHT * sustainability
        + BUDGET_WEIGHT * budget_fit
        + DIVERSITY_WEIGHT * diversity.min(1.0)
        + SCORE_WEIGHT * score)
        .min(1.0)
}

/// Routes of `batch` paired with their relevance for `profile`, most
/// relevant first. Equal relevance keeps batch order.
pub fn rank_routes(batch: &RouteBatch, profile: &UserProfile) -> Vec<(Route, f64)> {
    let mut ranked: Vec<(Route, f64)> = batch
        .routes
        .iter()
        .map(|route| (route.clone(), relevance_score(route, profile)))
        .collect();
    ranked.sort_by(|(_, a), (_, b)| b.total_cmp(a));

    tracing::debug!(routes = ranked.len(), "Ranked routes by relevance");
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EcosystemType, RouteMode};
    use uuid::Uuid;

    fn route(mean_fragility: f64, total_cost: f64, score: f64, provinces: usize) -> Route {
        Route {
            id: Uuid::nil(),
            name: format!("route {}", mean_fragility),
            mode: RouteMode::Traditional,
            stops: Vec::new(),
            total_distance_km: 0.0,
            total_cost,
            mean_fragility,
            sustainability_score: score,
            mean_predicted_rating: None,
            provinces: (0..provinces).map(|i| format!("Province {}", i)).collect(),
            ecosystems: vec![EcosystemType::Savanna, EcosystemType::River],
        }
    }

    fn batch(routes: Vec<Route>) -> RouteBatch {
        RouteBatch {
            requested: routes.len(),
            routes,
            partial: false,
            reused_locations: false,
            shortfall: None,
        }
    }

    #[test]
    fn test_relevance_components() {
        let profile = UserProfile::new(30, 20_000.0, 0.8, 0.6, 0.7);
        let r = route(2.0, 10_000.0, 1.0, 3);
        // 0.3 * 0.8 * 0.6 + 0.2 * 1.0 + 0.2 * (0.5 / 5) + 0.3 * 0.9
        let expected = 0.144 + 0.2 + 0.02 + 0.27;
        assert!((relevance_score(&r, &profile) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_over_budget_routes_lose_relevance() {
        let profile = UserProfile::new(30, 10_000.0, 0.5, 0.5, 0.5);
        let affordable = route(2.0, 10_000.0, 1.0, 1);
        let expensive = route(2.0, 40_000.0, 1.0, 1);
        let diff = relevance_score(&affordable, &profile) - relevance_score(&expensive, &profile);
        // budget fit drops from 1.0 to 0.25
        assert!((diff - 0.2 * 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_free_route_fits_any_budget() {
        let profile = UserProfile::new(30, 1.0, 0.0, 0.0, 0.0);
        let free = route(1.0, 0.0, 0.5, 1);
        let value = relevance_score(&free, &profile);
        assert!(value.is_finite());
        assert!(value >= BUDGET_WEIGHT);
    }

    #[test]
    fn test_rank_routes_orders_by_relevance() {
        let profile = UserProfile::new(30, 20_000.0, 1.0, 0.5, 0.5);
        let fragile = route(4.5, 15_000.0, 2.5, 1);
        let gentle = route(1.5, 5_000.0, 0.8, 3);
        let middle = route(3.0, 8_000.0, 1.5, 2);

        let ranked = rank_routes(&batch(vec![fragile, gentle, middle]), &profile);
        let order: Vec<f64> = ranked.iter().map(|(r, _)| r.mean_fragility).collect();
        assert_eq!(order, vec![1.5, 3.0, 4.5]);
        assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(ranked.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_rank_routes_empty_batch() {
        let profile = UserProfile::new(30, 20_000.0, 0.8, 0.6, 0.7);
        assert!(rank_routes(&batch(Vec::new()), &profile).is_empty());
    }
}
