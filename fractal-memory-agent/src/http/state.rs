//! Shared axum state: the facade plus the single active user it serves.

use std::sync::Arc;

use crate::AgentFacade;

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<AgentFacade>,
    pub user: String,
}
