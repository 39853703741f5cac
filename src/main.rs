use ecoroute::config::Config;
use ecoroute::models::Location;
use ecoroute::{AppError, RecommendationEngine};
use serde_json::json;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn read_catalog(path: &Path) -> Result<Vec<Location>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let catalog: Vec<Location> = serde_json::from_str(&raw)?;
    tracing::info!(path = %path.display(), count = catalog.len(), "Read catalog file");
    Ok(catalog)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecoroute=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::from_env()
        .map_err(|e| AppError::Config(format!("Failed to load configuration: {}", e)))?;
    tracing::info!("Configuration loaded successfully");

    let catalog = read_catalog(&config.catalog_path)?;
    let engine = RecommendationEngine::new(config.engine.clone());
    let statistics = engine.load(&catalog)?;

    let route_defaults = &config.engine.route;
    let traditional = engine.generate_traditional_routes(
        route_defaults.default_max_budget,
        route_defaults.default_max_locations,
        route_defaults.default_max_fragility,
        route_defaults.default_num_routes,
    )?;

    let mut report = json!({
        "statistics": statistics,
        "clusters": engine.clusters()?.summaries,
        "traditional": {
            "requested": traditional.requested,
            "partial": traditional.partial,
            "reused_locations": traditional.reused_locations,
            "shortfall": traditional.shortfall,
            "routes": traditional.summaries(),
        },
    });

    if config.train_on_startup {
        let diagnostics = match config.model_path.as_deref() {
            Some(path) if path.exists() => engine.load_model(path)?,
            model_path => {
                let diagnostics = engine
                    .train_ml(config.engine.ml.corpus_size, &config.engine.ml.hyperparameters)?;
                if let Some(path) = model_path {
                    engine.save_model(path)?;
                }
                diagnostics
            }
        };

        match engine.generate_ml_routes(
            &config.profile,
            route_defaults.default_max_locations,
            route_defaults.default_num_routes,
        ) {
            Ok(personalized) => {
                report["personalized"] = json!({
                    "profile": config.profile,
                    "diagnostics": diagnostics,
                    "requested": personalized.requested,
                    "partial": personalized.partial,
                    "reused_locations": personalized.reused_locations,
                    "shortfall": personalized.shortfall,
                    "ranking": engine
                        .rank_routes(&personalized, &config.profile)?
                        .iter()
                        .map(|(route, relevance)| json!({ "id": route.id, "relevance": relevance }))
                        .collect::<Vec<_>>(),
                    "routes": personalized.details(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, status = e.status_code(), "No personalized routes");
                report["personalized"] = json!({
                    "profile": config.profile,
                    "diagnostics": diagnostics,
                    "error": e.to_string(),
                    "kind": e.kind(),
                });
            }
        }
    } else {
        tracing::info!("Skipping model training (ECOROUTE_TRAIN_ON_STARTUP=false)");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
