// src/state.rs

use crate::{config::Config, services::Services};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Config,
}

impl FromRef<AppState> for Services {
    fn from_ref(state: &AppState) -> Self {
        state.services.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
