use axum::Json;
use serde_json::json;

use crate::gate::{GateError, TenantScope};

/// Describes the admitted request: who the caller is and which tenant store
/// the request is bound to. Exercises the whole gate.
///
/// # Errors
///
/// Fails with [`GateError::InternalFailure`] if the data context was already
/// released.
pub async fn whoami_handler(scope: TenantScope) -> Result<Json<serde_json::Value>, GateError> {
    let data = scope.data_context().await?;
    let identity = scope.identity();

    Ok(Json(json!({
        "request_id": scope.request_id(),
        "principal": identity.principal,
        "scheme": identity.scheme,
        "claims": identity.claims,
        "tenant": scope.tenant(),
        "backend": data.backend(),
    })))
}
