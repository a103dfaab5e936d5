use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::AppError;
use crate::query::{SearchPage, SearchRequest};
use crate::AppState;

/// Largest page the API hands out.
const MAX_LIMIT: usize = 1_000;

#[derive(Debug, Clone, Deserialize)]
pub struct SampleParams {
    /// Required; checked in `into_request` so a missing value gets the JSON error body.
    #[serde(default)]
    pub creator: Option<String>,

    #[serde(default)]
    pub offset: usize,

    #[serde(default = "default_limit")]
    pub limit: usize,

    /// "asc" (default) or "desc", by creation time
    #[serde(default)]
    pub order: Option<String>,
}

fn default_limit() -> usize {
    SearchRequest::DEFAULT_LIMIT
}

impl SampleParams {
    fn into_request(self) -> Result<SearchRequest, AppError> {
        let creator = match self.creator {
            Some(c) if !c.trim().is_empty() => c,
            Some(_) => {
                return Err(AppError::BadRequest("creator must not be empty".into()));
            }
            None => {
                return Err(AppError::BadRequest(
                    "missing query parameter 'creator'".into(),
                ));
            }
        };
        if self.limit > MAX_LIMIT {
            return Err(AppError::BadRequest(format!(
                "limit must be at most {MAX_LIMIT}"
            )));
        }

        let request = SearchRequest::by_creator(creator).page(self.offset, self.limit);
        match self.order.as_deref() {
            None | Some("asc") => Ok(request),
            Some("desc") => Ok(request.descending()),
            Some(other) => Err(AppError::BadRequest(format!(
                "order must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

// ─── GET /api/samples ────────────────────────────────────────────

pub async fn search_samples(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SampleParams>,
) -> Result<Json<SearchPage>, AppError> {
    let request = params.into_request()?;
    let page = state.queries.search(&request).await?;
    Ok(Json(page))
}
