//! Application context shared by all route handlers.

use std::sync::Arc;

use af_av::ToolRegistry;
use af_core::config::Config;
use af_engine::ConversionService;

/// Shared state handed to every handler through Axum state.
///
/// Cheaply cloneable: everything inside is an `Arc` or already `Clone`-cheap.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable configuration snapshot.
    pub config: Arc<Config>,
    /// Discovered external tools.
    pub tools: Arc<ToolRegistry>,
    /// The conversion engine.
    pub conversions: ConversionService,
}

impl AppContext {
    pub fn new(config: Config, tools: Arc<ToolRegistry>, conversions: ConversionService) -> Self {
        Self {
            config: Arc::new(config),
            tools,
            conversions,
        }
    }
}
