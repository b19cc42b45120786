//! Axum server bootstrap - the composition root.
//!
//! This module is the only place where the runtime pieces are wired together
//! for the web adapter. Everything handlers touch is constructed here and
//! shared through [`AxumContext`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use mhos_core::{AuditSink, DataLayout, TelemetrySettings};
use mhos_runtime::pidfile::sweep_stale_markers;
use mhos_runtime::{
    FanoutAuditSink, JsonlAuditSink, ManagedServer, ProcessRegistry, ProcessSupervisor,
    ServerController, StreamBroadcaster, SupervisorConfig, TracingAuditSink,
    load_server_definitions,
};
use tracing::{info, warn};

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins (production mode).
    AllowOrigins(Vec<String>),
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the HTTP server.
    pub port: u16,
    /// Root of the data directory (logs, run markers, templates).
    pub data_root: PathBuf,
    /// Optional JSON file describing singleton servers.
    pub servers_file: Option<PathBuf>,
    pub settings: TelemetrySettings,
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Create config with default paths and environment-tuned settings.
    pub fn with_defaults() -> Result<Self> {
        let settings = TelemetrySettings::from_env()?;
        settings.validate()?;
        Ok(Self {
            port: 4400,
            data_root: mhos_core::data_root()?,
            servers_file: None,
            settings,
            cors: CorsConfig::default(),
        })
    }

    /// Config rooted at `data_root` with default settings.
    pub fn for_data_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            port: 4400,
            data_root: data_root.into(),
            servers_file: None,
            settings: TelemetrySettings::with_defaults(),
            cors: CorsConfig::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: TelemetrySettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_servers_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.servers_file = Some(path.into());
        self
    }

    /// Set CORS to allow specific origins.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors = CorsConfig::AllowOrigins(origins);
        self
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_root)
    }
}

/// Application context for the Axum adapter.
pub struct AxumContext {
    pub supervisor: Arc<ProcessSupervisor>,
    pub registry: Arc<ProcessRegistry>,
    /// Singleton back-ends controlled through pid markers.
    pub servers: Arc<ServerController>,
    /// Open streaming sessions.
    pub streams: Arc<StreamBroadcaster>,
    pub audit: Arc<dyn AuditSink>,
    pub layout: DataLayout,
    pub settings: TelemetrySettings,
}

/// Bootstrap the runtime services.
///
/// Creates the data directories, removes stale pid markers left by a previous
/// run and loads the singleton server definitions.
pub async fn bootstrap(config: ServerConfig) -> Result<AxumContext> {
    let layout = config.layout();

    info!(
        target: "mhos.paths",
        data_root = %layout.root().display(),
        run_dir = %layout.run_dir().display(),
        audit_dir = %layout.audit_dir().display(),
        templates_dir = %layout.templates_dir().display(),
        process_logs_dir = %layout.process_logs_dir().display(),
        "Axum bootstrap resolved paths"
    );

    // 1. Data directories
    for dir in [
        layout.run_dir(),
        layout.audit_dir(),
        layout.process_logs_dir(),
    ] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    // 2. Clear markers whose servers died while we were down
    let report = sweep_stale_markers(&layout.run_dir())?;
    if !report.removed.is_empty() {
        info!(removed = report.removed.len(), alive = report.alive.len(), "Swept stale pid markers");
    }

    // 3. Audit trail: structured log plus the daily NDJSON the feeds tail
    let mut sinks: Vec<Arc<dyn AuditSink>> = Vec::new();
    sinks.push(Arc::new(TracingAuditSink));
    sinks.push(Arc::new(JsonlAuditSink::new(layout.audit_dir())));
    let audit: Arc<dyn AuditSink> = Arc::new(FanoutAuditSink::new(sinks));

    // 4. Supervision
    let registry = Arc::new(ProcessRegistry::new());
    let supervisor = Arc::new(ProcessSupervisor::new(
        Arc::clone(&registry),
        Arc::clone(&audit),
        SupervisorConfig::from_settings(&config.settings)
            .with_capture_dir(layout.process_logs_dir()),
    ));

    // 5. Singleton servers
    let definitions = match &config.servers_file {
        Some(path) => load_server_definitions(path)?,
        None => Vec::new(),
    };
    let run_dir = layout.run_dir();
    let managed: Vec<ManagedServer> = definitions
        .into_iter()
        .map(|definition| ManagedServer::new(definition, &run_dir))
        .collect();
    if managed.is_empty() {
        warn!("No singleton servers configured");
    } else {
        info!(count = managed.len(), "Loaded singleton server definitions");
    }
    let servers = Arc::new(ServerController::new(Arc::clone(&supervisor), managed));

    // 6. Streaming
    let streams = Arc::new(StreamBroadcaster::new(&config.settings));

    Ok(AxumContext {
        supervisor,
        registry,
        servers,
        streams,
        audit,
        layout,
        settings: config.settings,
    })
}

/// Start the web server on the configured port and serve until Ctrl-C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    use tokio::net::TcpListener;

    let cors = config.cors.clone();
    let port = config.port;
    let ctx = Arc::new(bootstrap(config).await?);
    let app = crate::routes::create_router(Arc::clone(&ctx), &cors);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("MetaHuman control plane listening on http://{}", addr);

    let streams = Arc::clone(&ctx.streams);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutting down, closing stream sessions");
            streams.close_all();
        })
        .await?;

    Ok(())
}
