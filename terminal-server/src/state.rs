//! Shared application state for the terminal server.

use std::sync::Arc;

use sandbox_engine::terminal::TerminalService;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine calls are blocking; handlers move a clone into `spawn_blocking`.
    pub service: Arc<TerminalService>,
}

impl AppState {
    pub fn new(service: TerminalService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
