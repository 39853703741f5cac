use ecoroute::models::{RouteMode, UserProfile};
use ecoroute::{AppError, EngineStatus, ErrorKind, RecommendationEngine};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

mod common;

#[test]
fn test_model_not_ready_before_training() {
    let uninitialized = RecommendationEngine::default();
    let err = uninitialized
        .generate_ml_routes(&common::reference_profile(), 5, 3)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelNotReady);

    let untrained = common::loaded_engine();
    assert_eq!(untrained.status().unwrap(), EngineStatus::Untrained);
    let err = untrained
        .generate_ml_routes(&common::reference_profile(), 5, 3)
        .unwrap_err();
    assert!(matches!(err, AppError::ModelNotReady(_)));
    assert_eq!(err.status_code(), 503);
    assert!(untrained.rank_ml_candidates(&common::reference_profile()).is_err());
    assert!(untrained.diagnostics().unwrap().is_none());

    // Traditional routes stay available without a model
    assert!(untrained.generate_traditional_routes(20_000.0, 5, 4, 3).is_ok());
}

#[test]
fn test_train_requires_catalog() {
    let engine = RecommendationEngine::default();
    let err = engine
        .train_ml(common::TEST_CORPUS_SIZE, &common::test_hyperparameters())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
}

#[test]
fn test_train_rejects_bad_hyperparameters() {
    let engine = common::loaded_engine();

    let mut params = common::test_hyperparameters();
    params.learning_rate = 0.0;
    assert!(matches!(
        engine.train_ml(common::TEST_CORPUS_SIZE, &params),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        engine.train_ml(0, &common::test_hyperparameters()),
        Err(AppError::Validation(_))
    ));
    assert_eq!(engine.status().unwrap(), EngineStatus::Untrained);
}

#[test]
fn test_training_diagnostics() {
    let engine = common::loaded_engine();
    let diagnostics = engine
        .train_ml(common::TEST_CORPUS_SIZE, &common::test_hyperparameters())
        .unwrap();

    assert_eq!(engine.status().unwrap(), EngineStatus::Trained);
    assert_eq!(engine.diagnostics().unwrap(), Some(diagnostics.clone()));
    assert!(diagnostics.training_rows > diagnostics.validation_rows);
    assert!(diagnostics.validation_rows > 0);
    assert!(diagnostics.explained_variance > 0.3, "{:?}", diagnostics);
    assert!(diagnostics.rmse.is_finite() && diagnostics.rmse < 1.0);
    assert_eq!(diagnostics.n_trees, common::test_hyperparameters().n_trees);
}

#[test]
fn test_training_is_deterministic() {
    let a = common::loaded_engine();
    let b = common::loaded_engine();
    let da = a
        .train_ml(common::TEST_CORPUS_SIZE, &common::test_hyperparameters())
        .unwrap();
    let db = b
        .train_ml(common::TEST_CORPUS_SIZE, &common::test_hyperparameters())
        .unwrap();
    assert_eq!(da, db);

    let profile = common::reference_profile();
    assert_eq!(
        a.rank_ml_candidates(&profile).unwrap(),
        b.rank_ml_candidates(&profile).unwrap()
    );
}

#[test]
fn test_reference_profile_is_deterministic() {
    let engine = common::trained_engine();
    let profile = common::reference_profile();

    let first_ranking = engine.rank_ml_candidates(&profile).unwrap();
    let second_ranking = engine.rank_ml_candidates(&profile).unwrap();
    assert_eq!(first_ranking, second_ranking);
    assert_eq!(first_ranking.len(), 25);
    assert!(first_ranking
        .windows(2)
        .all(|w| w[0].priority >= w[1].priority));

    let first = engine.generate_ml_routes(&profile, 5, 3).unwrap();
    let second = engine.generate_ml_routes(&profile, 5, 3).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.routes[0].id, second.routes[0].id);
}

#[test]
fn test_personalized_routes_respect_constraints() {
    let engine = common::trained_engine();
    let profile = common::reference_profile();
    let max_fragility = engine.config().route.default_max_fragility;
    let fee_ceiling = profile.max_budget * engine.config().route.max_fee_share_per_location;

    let batch = engine.generate_ml_routes(&profile, 5, 3).unwrap();
    assert!(!batch.routes.is_empty());
    assert_eq!(batch.partial, batch.routes.len() < 3);

    for (i, route) in batch.routes.iter().enumerate() {
        assert_eq!(route.mode, RouteMode::Personalized);
        assert_eq!(route.name, format!("Personalized Route {}", i + 1));
        common::assert_route_invariants(route, 5, profile.max_budget, max_fragility);

        let mean = route.mean_predicted_rating.expect("Personalized routes carry a rating");
        assert!((1.0..=5.0).contains(&mean));
        for stop in &route.stops {
            assert!(stop.location.entry_fee <= fee_ceiling);
            let rating = stop.predicted_rating.expect("Every stop has a prediction");
            assert!((1.0..=5.0).contains(&rating));
        }
    }
}

#[test]
fn test_fragility_ceiling_applies_to_every_profile() {
    let engine = common::trained_engine();
    let profiles = [
        UserProfile::new(18, 50_000.0, 0.0, 1.0, 0.0),
        UserProfile::new(100, 50_000.0, 0.0, 0.0, 1.0),
        UserProfile::new(45, 30_000.0, 0.1, 0.9, 0.3),
    ];
    for profile in profiles {
        let batch = engine.generate_ml_routes(&profile, 6, 2).unwrap();
        for route in &batch.routes {
            for stop in &route.stops {
                assert!(stop.location.fragility <= engine.config().route.default_max_fragility);
            }
        }
    }
}

#[test]
fn test_invalid_profile_rejected() {
    let engine = common::trained_engine();
    let profiles = [
        UserProfile::new(10, 20_000.0, 0.5, 0.5, 0.5),
        UserProfile::new(30, 0.0, 0.5, 0.5, 0.5),
        UserProfile::new(30, 20_000.0, 1.5, 0.5, 0.5),
        UserProfile::new(30, 20_000.0, 0.5, -0.1, 0.5),
    ];
    for profile in profiles {
        let err = engine.generate_ml_routes(&profile, 5, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", profile);
    }
    assert!(matches!(
        engine.generate_ml_routes(&common::reference_profile(), 1, 3),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn test_tight_budget_has_no_feasible_route() {
    let engine = common::trained_engine();
    // Fee ceiling of 400 leaves only the free site
    let profile = UserProfile::new(30, 1_000.0, 0.8, 0.6, 0.7);
    let err = engine.generate_ml_routes(&profile, 5, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoFeasibleRoute);
}

#[test]
fn test_reload_drops_model() {
    let engine = common::trained_engine();
    assert_eq!(engine.status().unwrap(), EngineStatus::Trained);

    engine.load(&common::catalog()).unwrap();
    assert_eq!(engine.status().unwrap(), EngineStatus::Untrained);
    assert!(matches!(
        engine.generate_ml_routes(&common::reference_profile(), 5, 3),
        Err(AppError::ModelNotReady(_))
    ));
}

#[test]
fn test_retrain_swaps_model_atomically() {
    let engine = Arc::new(common::trained_engine());
    let profile = common::reference_profile();

    thread::scope(|scope| {
        let trainer = Arc::clone(&engine);
        scope.spawn(move || {
            let mut params = common::test_hyperparameters();
            params.seed = 7;
            trainer
                .train_ml(common::TEST_CORPUS_SIZE, &params)
                .expect("Retraining should succeed");
        });

        for _ in 0..3 {
            let reader = Arc::clone(&engine);
            scope.spawn(move || {
                for _ in 0..5 {
                    // Either the old or the new model answers; never neither
                    let batch = reader
                        .generate_ml_routes(&profile, 5, 2)
                        .expect("A trained model is always visible");
                    assert!(!batch.routes.is_empty());
                }
            });
        }
    });

    assert_eq!(engine.status().unwrap(), EngineStatus::Trained);
    assert_eq!(
        engine.diagnostics().unwrap().map(|d| d.n_trees),
        Some(common::test_hyperparameters().n_trees)
    );
}

#[test]
fn test_default_request_fills_batch() {
    let engine = common::trained_engine();
    let profile = common::reference_profile();
    let max_fragility = engine.config().route.default_max_fragility;

    let batch = engine.generate_ml_routes(&profile, 6, 5).unwrap();
    assert_eq!(batch.routes.len(), 5);
    assert!(!batch.partial);
    assert!(batch.shortfall.is_none());

    let stop_sets: HashSet<Vec<u32>> = batch
        .routes
        .iter()
        .map(|r| {
            let mut ids = r.location_ids();
            ids.sort_unstable();
            ids
        })
        .collect();
    assert_eq!(stop_sets.len(), 5);
    for route in &batch.routes {
        common::assert_route_invariants(route, 6, profile.max_budget, max_fragility);
    }
}

#[test]
fn test_saved_model_reproduces_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let profile = common::reference_profile();

    let trained = common::trained_engine();
    trained.save_model(&path).unwrap();

    let restored = common::loaded_engine();
    let diagnostics = restored.load_model(&path).unwrap();
    assert_eq!(restored.status().unwrap(), EngineStatus::Trained);
    assert_eq!(Some(diagnostics), trained.diagnostics().unwrap());

    assert_eq!(
        restored.rank_ml_candidates(&profile).unwrap(),
        trained.rank_ml_candidates(&profile).unwrap()
    );
    assert_eq!(
        restored.generate_ml_routes(&profile, 5, 3).unwrap(),
        trained.generate_ml_routes(&profile, 5, 3).unwrap()
    );
}

#[test]
fn test_model_for_other_catalog_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    common::trained_engine().save_model(&path).unwrap();

    let mut smaller = common::catalog();
    smaller.pop();
    let engine = RecommendationEngine::default();
    engine.load(&smaller).unwrap();

    let err = engine.load_model(&path).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
    assert_eq!(engine.status().unwrap(), EngineStatus::Untrained);
}

#[test]
fn test_model_persistence_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let untrained = common::loaded_engine();
    let err = untrained.save_model(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelNotReady);
    assert!(!path.exists());

    // No catalog to pair the model with
    let err = RecommendationEngine::default().load_model(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);

    let err = untrained.load_model(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, AppError::Io(_)));

    std::fs::write(&path, "{\"catalog_ids\": [1, 2]}").unwrap();
    let err = untrained.load_model(&path).unwrap_err();
    assert!(matches!(err, AppError::Serialization(_)));
    assert_eq!(untrained.status().unwrap(), EngineStatus::Untrained);
}

#[test]
fn test_rank_routes_prefers_suitable_routes() {
    let engine = common::trained_engine();
    let profile = common::reference_profile();
    let batch = engine.generate_ml_routes(&profile, 5, 3).unwrap();

    let ranked = engine.rank_routes(&batch, &profile).unwrap();
    assert_eq!(ranked.len(), batch.routes.len());
    assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
    for (route, relevance) in &ranked {
        assert!((0.0..=1.0).contains(relevance), "{} scored {}", route.name, relevance);
        assert!(batch.routes.contains(route));
    }

    let invalid = UserProfile::new(30, 20_000.0, 1.5, 0.6, 0.7);
    let err = engine.rank_routes(&batch, &invalid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
