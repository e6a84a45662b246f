//! fenceguard service entry point

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fenceguard::{
    actuator::{Actuator, CoilMonitor, CoilStateRegistry, PlcCoilController},
    backend_client::{EventSink, HttpEventSink},
    camera_worker::CameraWorker,
    config_store::{self, RosterClient},
    event_dispatcher::{DispatcherConfig, EventDispatcher},
    frame_source::{FrameSource, FrameSourceConfig},
    media_store::FsMediaStore,
    state::{AppConfig, AppState, SessionHandle},
    web_api,
    zone_detector::{NullObjectDetector, ZoneDetector},
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fenceguard=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fenceguard v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Arc::new(AppConfig::default());
    tracing::info!(
        backend_url = ?config.backend_url,
        stream_url = %config.stream_url,
        media_root = %config.media_root.display(),
        zones_path = %config.zones_path.display(),
        module_id = %config.module_id,
        plc = ?config.plc,
        "Configuration loaded"
    );

    let site = config_store::load_site_config(&config.zones_path).await?;
    tracing::info!(
        cameras_configured = site.cameras.len(),
        clear_frame_threshold = site.clear_frame_threshold,
        "Zone configuration loaded"
    );

    // Resolve the camera roster: explicit list, or the backend directory.
    // A missing roster is an unrecoverable startup error.
    let camera_ids: Vec<String> = match (&config.camera_ids, &config.backend_url) {
        (Some(ids), _) => ids.clone(),
        (None, Some(backend)) => {
            let roster = RosterClient::new(backend.clone());
            roster.camera_ids(&config.server_name).await?
        }
        (None, None) => anyhow::bail!("no camera roster: set BACKEND_URL or CAMERA_IDS"),
    };
    if camera_ids.is_empty() {
        anyhow::bail!("camera roster for {} is empty", config.server_name);
    }
    tracing::info!(cameras = ?camera_ids, "Camera roster resolved");

    // Cooperative shutdown signal for every long-lived task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Outbound sink: no backend configured means evidence is persisted
    // locally but never posted.
    let sink = Arc::new(match &config.backend_url {
        Some(backend) => EventSink::Http(HttpEventSink::new(
            format!("{backend}/event"),
            config.stream_url.clone(),
            config.module_id.clone(),
        )),
        None => {
            tracing::info!("No BACKEND_URL set, event notifications disabled");
            EventSink::Noop
        }
    });

    // Evidence pipeline
    let store = Arc::new(FsMediaStore::new(&config.media_root, &config.temp_dir));
    let dispatcher = EventDispatcher::new(DispatcherConfig {
        capacity: site.queue_capacity,
        module_id: config.module_id.clone(),
        msg_type: config.msg_type,
        host_dns: config.server_name.clone(),
        ..DispatcherConfig::default()
    });
    let dispatcher_worker =
        dispatcher.spawn_worker(store.clone(), sink.clone(), shutdown_rx.clone());
    tracing::info!(capacity = site.queue_capacity, "Event dispatcher started");

    // Hardware actuation: one shared controller per configured PLC
    let registry = CoilStateRegistry::new();
    let (actuator, coil_monitor) = match &config.plc {
        Some(plc) => {
            let controller = PlcCoilController::new(plc, &registry).await;
            let monitor = Arc::new(CoilMonitor::new(plc));
            monitor.clone().spawn(shutdown_rx.clone());
            tracing::info!(host = %plc.host, coil = plc.coil_address, "PLC actuator configured");
            (Arc::new(Actuator::Coil(controller)), Some(monitor))
        }
        None => {
            tracing::info!("No PLC_HOST set, actuator disabled");
            (Arc::new(Actuator::Noop), None)
        }
    };

    // Frame acquisition
    let frame_source = FrameSource::new(FrameSourceConfig {
        stream_base: config.stream_url.clone(),
        refresh_interval: Duration::from_millis(config.refresh_interval_ms),
        working_size: (site.detector.working_width, site.detector.working_height),
    });

    // Per-camera sessions and detection loops
    let mut sessions = HashMap::new();
    let mut workers = Vec::new();
    for camera_id in &camera_ids {
        let Some(zones) = site.zones_for(camera_id) else {
            tracing::warn!(camera_id = %camera_id, "No zones configured, camera skipped");
            continue;
        };

        let session = Arc::new(SessionHandle::new(camera_id.clone()));
        sessions.insert(camera_id.clone(), session.clone());

        let detector = Arc::new(ZoneDetector::new(
            site.detector.clone(),
            zones.trigger_zone.clone(),
        ));
        let frames = frame_source.subscribe(camera_id, shutdown_rx.clone());

        let worker = CameraWorker::new(
            session,
            zones.clone(),
            detector,
            Arc::new(NullObjectDetector),
            site.clear_frame_threshold,
            actuator.clone(),
            dispatcher.clone(),
            sink.clone(),
            frames,
        );
        workers.push(worker.spawn(shutdown_rx.clone()));
        tracing::info!(camera_id = %camera_id, "Camera session started");
    }
    if sessions.is_empty() {
        anyhow::bail!("no camera has zone configuration, nothing to monitor");
    }

    // Control plane
    let state = AppState {
        config: config.clone(),
        sessions: Arc::new(sessions),
        dispatcher: dispatcher.clone(),
        coil_monitor,
    };

    let app = web_api::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        let mut shutdown = server_shutdown;
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Control plane server failed");
        }
    });

    // Run until ctrl-c, then stop intake, drain evidence, release hardware.
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    for worker in workers {
        let _ = worker.await;
    }
    let _ = dispatcher_worker.await;

    // Leave the coil de-energized; best-effort, the cache may already match.
    if let Err(e) = actuator.set_state(false).await {
        tracing::warn!(error = %e, "Could not release coil on shutdown");
    }

    let _ = server.await;
    tracing::info!("fenceguard stopped");

    Ok(())
}
