//! `GET /` — landing info.
//!
//! The original storefront rendered an HTML page with these two links;
//! this service serves the values and leaves rendering to the frontend.

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub storefront_url: String,
    pub dashboard_url: String,
}

pub(super) async fn home(state: State<AppState>) -> impl IntoResponse {
    Json(HomeResponse {
        storefront_url: state.pages.storefront_url.clone(),
        dashboard_url: state.pages.dashboard_url.clone(),
    })
}
