//! Role-based access control extractors.
//!
//! Each extractor wraps [`AuthUser`] and rejects requests whose role does not
//! match. Party-level checks (client vs. freelancer) live in the engine,
//! since they depend on the contract being acted on.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use contractflow_core::error::CoreError;
use contractflow_core::roles::ROLE_PAYMENT_SERVICE;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the `payment_service` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn confirm(RequirePaymentService(caller): RequirePaymentService) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequirePaymentService(pub AuthUser);

impl FromRequestParts<AppState> for RequirePaymentService {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != ROLE_PAYMENT_SERVICE {
            return Err(AppError::Core(CoreError::Forbidden(
                "Payment service role required".into(),
            )));
        }
        Ok(RequirePaymentService(user))
    }
}
