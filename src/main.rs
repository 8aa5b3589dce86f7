use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use lostfound::auth::JwtKeys;
use lostfound::config::Settings;
use lostfound::openapi::ApiDoc;
use lostfound::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use lostfound::repo::Repo;
use lostfound::storage::build_image_store;
use lostfound::{config, AppState, EnginePolicy, SecurityHeaders};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };
    lostfound::error::set_dev_mode(settings.dev_mode);

    info!("Bootstrapping lost & found server");
    info!("Frontend URL: {}", settings.frontend_url);

    let repo = match build_repo(&settings).await {
        Ok(r) => r,
        Err(e) => {
            error!("repository init failed: {e:#}");
            std::process::exit(1);
        }
    };
    info!("Using {} repository backend", repo.backend_name());

    let image_store = match build_image_store(&settings).await {
        Ok(s) => s,
        Err(e) => {
            error!("image store init failed: {e:#}");
            std::process::exit(1);
        }
    };

    let mut state = AppState::new(repo, image_store, EnginePolicy::from_settings(&settings));
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("metrics recorder not installed: {e}"),
    }
    if settings.rate_limit_enabled {
        state = state.with_rate_limiter(RateLimiterFacade::new(
            InMemoryRateLimiter::new(true),
            RateLimitConfig::from_settings(&settings),
        ));
    }
    let state = web::Data::new(state);
    let jwt_keys = web::Data::new(JwtKeys::from_settings(&settings));

    let openapi = ApiDoc::openapi();
    let security = SecurityHeaders::from_settings(&settings);
    let frontend = settings.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(security.clone())
            .wrap(cors)
            .app_data(state.clone())
            .app_data(jwt_keys.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((settings.host.as_str(), settings.port))?;

    info!("Listening on http://{}:{}", settings.host, settings.port);

    server.run().await
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(settings: &Settings) -> anyhow::Result<Arc<dyn Repo>> {
    use lostfound::repo::inmem::InMemRepo;
    Ok(match &settings.data_dir {
        Some(dir) => {
            info!("Snapshotting items under '{}'", dir.display());
            Arc::new(InMemRepo::with_snapshot_dir(dir))
        }
        None => Arc::new(InMemRepo::new()),
    })
}

#[cfg(feature = "postgres-store")]
async fn build_repo(settings: &Settings) -> anyhow::Result<Arc<dyn Repo>> {
    use anyhow::Context;
    use lostfound::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let db_url = settings.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(settings.storage_timeout)
        .connect(db_url)
        .await
        .context("connecting to Postgres")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.context("running migrations")?;
    Ok(Arc::new(repo))
}
