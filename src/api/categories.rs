use axum::{extract::State, Json};

use super::AppState;
use crate::domain::aggregates::Category;
use crate::Result;

pub async fn list(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.catalog.categories().await?))
}
