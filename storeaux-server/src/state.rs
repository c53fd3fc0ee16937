//! Application state shared across all request handlers.

use crate::config::PagesConfig;
use std::sync::Arc;
use storeaux_core::backend::GraphqlClient;
use storeaux_core::settlement::SettlementService;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (the clients are behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// The payment settlement orchestrator.
    pub settlement: SettlementService,
    /// Backend GraphQL client, used directly by the account handlers.
    pub backend: Arc<GraphqlClient>,
    /// URLs served by the landing endpoint.
    pub pages: PagesConfig,
}
