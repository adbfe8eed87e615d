use std::sync::OnceLock;
use std::time::{Duration, Instant};

use warehouse::clients::WarehouseConnector;
use warehouse::operations::AppContext;

/// Shared state of the HTTP server.
///
/// The server starts accepting requests before the gateway is initialized; the context is
/// installed once initialization succeeds and stays in place until the process exits.
pub struct AppState<P, C>
where
    C: WarehouseConnector,
{
    started_at: Instant,
    configured_project: Option<String>,
    context: OnceLock<AppContext<P, C>>,
}

impl<P, C> AppState<P, C>
where
    C: WarehouseConnector,
{
    pub fn new(configured_project: Option<String>) -> Self {
        Self {
            started_at: Instant::now(),
            configured_project,
            context: OnceLock::new(),
        }
    }

    /// Installs the context. Returns `false` if one was already installed.
    pub fn install(&self, context: AppContext<P, C>) -> bool {
        self.context.set(context).is_ok()
    }

    pub fn context(&self) -> Option<&AppContext<P, C>> {
        self.context.get()
    }

    pub fn configured_project(&self) -> Option<&str> {
        self.configured_project.as_deref()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
