use axum::routing::post;
use axum::Router;

use crate::handlers::proposals;
use crate::state::AppState;

/// Routes mounted at `/proposals`.
///
/// ```text
/// POST   /{proposal_id}/accept    -> accept_proposal
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{proposal_id}/accept", post(proposals::accept_proposal))
}
