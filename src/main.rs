use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, info_span, warn};

use food_order_service::api::{self, AppState};
use food_order_service::catalog::CatalogSeeder;
use food_order_service::config::AppConfig;
use food_order_service::corpus::CouponCorpusLoader;
use food_order_service::coupons::CouponPolicy;
use food_order_service::{db, telemetry, PgUnitOfWork};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init(&config.observability);
    info!(environment = %config.environment, "starting food-order-service");

    let pool = db::connect(&config.database)
        .await
        .context("failed to set up database")?;
    db::migrate(&pool)
        .await
        .context("failed to create database schema")?;
    let uow = PgUnitOfWork::new(pool.clone());

    let startup = info_span!("startup", environment = %config.environment);

    let products = CatalogSeeder::new(uow.clone())
        .with_span(info_span!(parent: &startup, "catalog_seed"))
        .seed()
        .await
        .context("failed to seed product catalog")?;
    info!(products = products.len(), "catalog ready");

    // Coupon validation depends on the corpus, so no request is served before it loads.
    CouponCorpusLoader::new(uow.clone())
        .with_span(info_span!(
            parent: &startup,
            "coupon_corpus",
            directory = %config.coupons.directory.display()
        ))
        .load(&config.coupons.directory)
        .await
        .context("failed to seed coupons")?;

    let policy = CouponPolicy::new(config.coupons.min_sources);
    info!(min_sources = policy.min_sources, "coupon policy configured");

    let app = api::router(AppState::new(uow, policy));
    let listener = TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr()))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    pool.close().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
