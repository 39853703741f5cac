use ecoroute::config::{EngineConfig, Hyperparameters};
use ecoroute::models::{Coordinates, EcosystemType, Location, Route, UserProfile};
use ecoroute::RecommendationEngine;

/// The bundled 25-location Angolan catalog
#[allow(dead_code)]
pub fn catalog() -> Vec<Location> {
    serde_json::from_str(include_str!("../../data/angola_catalog.json"))
        .expect("Bundled catalog should parse")
}

/// Create a test location with sensible defaults
#[allow(dead_code)]
pub fn create_test_location(
    id: u32,
    lat: f64,
    lng: f64,
    fragility: u8,
    entry_fee: f64,
) -> Location {
    Location::new(
        id,
        format!("Test Site {}", id),
        "Luanda",
        Coordinates::new(lat, lng).unwrap(),
        fragility,
        250,
        entry_fee,
        EcosystemType::Savanna,
    )
}

/// Engine with the bundled catalog loaded and no model
#[allow(dead_code)]
pub fn loaded_engine() -> RecommendationEngine {
    let engine = RecommendationEngine::new(EngineConfig::default());
    engine.load(&catalog()).expect("Catalog should load");
    engine
}

/// Small, fast model settings for tests
#[allow(dead_code)]
pub fn test_hyperparameters() -> Hyperparameters {
    Hyperparameters {
        n_trees: 40,
        max_depth: 4,
        ..Hyperparameters::default()
    }
}

#[allow(dead_code)]
pub const TEST_CORPUS_SIZE: usize = 300;

/// Engine with the bundled catalog loaded and a model trained on it
#[allow(dead_code)]
pub fn trained_engine() -> RecommendationEngine {
    let engine = loaded_engine();
    engine
        .train_ml(TEST_CORPUS_SIZE, &test_hyperparameters())
        .expect("Training should succeed");
    engine
}

/// Profile from the reference personalization scenario
#[allow(dead_code)]
pub fn reference_profile() -> UserProfile {
    UserProfile::new(30, 20_000.0, 0.8, 0.6, 0.7)
}

/// Assert the invariants every returned route must satisfy
#[allow(dead_code)]
pub fn assert_route_invariants(
    route: &Route,
    max_locations: usize,
    max_budget: f64,
    max_fragility: u8,
) {
    assert!(
        route.len() >= 2 && route.len() <= max_locations,
        "Route {} has {} stops (max {})",
        route.name,
        route.len(),
        max_locations
    );
    assert!(
        route.total_cost <= max_budget + 1e-9,
        "Route {} costs {} over budget {}",
        route.name,
        route.total_cost,
        max_budget
    );
    for stop in &route.stops {
        assert!(
            stop.location.fragility <= max_fragility,
            "{} has fragility {} above {}",
            stop.location.name,
            stop.location.fragility,
            max_fragility
        );
    }

    let mut ids = route.location_ids();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), route.len(), "Route {} repeats a stop", route.name);

    let path: Vec<Coordinates> = route.stops.iter().map(|s| s.location.coordinates).collect();
    let expected = ecoroute::models::path_distance_km(&path);
    assert!(
        (route.total_distance_km - expected).abs() < 1e-6,
        "Route {} distance {} != path distance {}",
        route.name,
        route.total_distance_km,
        expected
    );

    let cost: f64 = route.stops.iter().map(|s| s.location.entry_fee).sum();
    assert!((route.total_cost - cost).abs() < 1e-9);

    for (i, stop) in route.stops.iter().enumerate() {
        assert_eq!(stop.order_in_route as usize, i + 1);
    }
}
