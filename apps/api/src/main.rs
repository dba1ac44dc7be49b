use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use incident_cell::{FailureTrackerService, IncidentLifecycleService};
use monitor_cell::{MonitorSchedulerService, ProberService};
use realtime_cell::{run_fanout_listener, ConnectionFanout, EventBus, RedisEventBus};
use shared_config::AppConfig;
use shared_database::supabase::{
    SupabaseClient, SupabaseIncidentRepository, SupabaseMonitorRepository,
    SupabaseMonitoringResultStore,
};
use shared_database::{IncidentRepository, MonitorRepository, MonitoringResultStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Status Deck monitoring server");

    // Load configuration
    let config = AppConfig::from_env();

    // Persistence seams
    let supabase = Arc::new(SupabaseClient::new(&config));
    let monitors: Arc<dyn MonitorRepository> =
        Arc::new(SupabaseMonitorRepository::new(supabase.clone()));
    let results: Arc<dyn MonitoringResultStore> =
        Arc::new(SupabaseMonitoringResultStore::new(supabase.clone()));
    let incidents: Arc<dyn IncidentRepository> =
        Arc::new(SupabaseIncidentRepository::new(supabase));

    // Event bus shared by the probe pipeline and the realtime fanout
    let bus: Arc<dyn EventBus> = Arc::new(RedisEventBus::new(&config).await?);

    // Probe pipeline
    let failures = Arc::new(FailureTrackerService::new());
    let lifecycle = Arc::new(IncidentLifecycleService::new(
        incidents,
        monitors.clone(),
        failures.clone(),
        bus.clone(),
    ));
    let prober = Arc::new(ProberService::new(
        monitors.clone(),
        results,
        failures.clone(),
        lifecycle,
        bus.clone(),
    ));
    let scheduler = Arc::new(MonitorSchedulerService::new(
        monitors,
        prober,
        failures,
        bus.clone(),
    ));

    tokio::spawn(async move {
        if let Err(e) = scheduler.run().await {
            error!(error = %e, "scheduler stopped");
        }
    });

    // Realtime fanout
    let fanout = Arc::new(ConnectionFanout::new());
    {
        let bus = bus.clone();
        let fanout = Arc::clone(&fanout);
        tokio::spawn(async move {
            if let Err(e) = run_fanout_listener(bus, fanout).await {
                error!(error = %e, "fanout listener stopped");
            }
        });
    }

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(fanout)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
