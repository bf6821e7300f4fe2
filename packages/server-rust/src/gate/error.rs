//! Pipeline error taxonomy and its HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::{AuthError, MalformedReason};
use crate::provision::ConnectError;
use crate::tenant::TenantRejection;

/// Why the gate refused a request.
///
/// Component errors fold into these five outcomes. The client only ever sees
/// the [`GateErrorKind`]; the details stay in the logs.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("malformed credentials: {0}")]
    Malformed(MalformedReason),
    #[error("credentials were not accepted")]
    Unauthorized,
    #[error("no usable tenant key: {0}")]
    MissingTenant(TenantRejection),
    #[error("{0}")]
    ConnectionUnavailable(ConnectError),
    #[error("internal failure: {0}")]
    InternalFailure(String),
}

/// Client-visible rejection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateErrorKind {
    MalformedCredentials,
    Unauthorized,
    MissingTenant,
    ConnectionUnavailable,
    InternalFailure,
}

impl GateErrorKind {
    /// Wire name used in rejection bodies and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedCredentials => "malformed_credentials",
            Self::Unauthorized => "unauthorized",
            Self::MissingTenant => "missing_tenant",
            Self::ConnectionUnavailable => "connection_unavailable",
            Self::InternalFailure => "internal_failure",
        }
    }

    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::MalformedCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MissingTenant => StatusCode::BAD_REQUEST,
            Self::ConnectionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the response must carry a `WWW-Authenticate` challenge.
    #[must_use]
    pub fn is_auth_failure(self) -> bool {
        matches!(self, Self::MalformedCredentials | Self::Unauthorized)
    }
}

impl GateError {
    #[must_use]
    pub fn kind(&self) -> GateErrorKind {
        match self {
            Self::Malformed(_) => GateErrorKind::MalformedCredentials,
            Self::Unauthorized => GateErrorKind::Unauthorized,
            Self::MissingTenant(_) => GateErrorKind::MissingTenant,
            Self::ConnectionUnavailable(_) => GateErrorKind::ConnectionUnavailable,
            Self::InternalFailure(_) => GateErrorKind::InternalFailure,
        }
    }
}

impl From<AuthError> for GateError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Malformed(reason) => Self::Malformed(reason),
            AuthError::Unauthorized => Self::Unauthorized,
            AuthError::Store(source) => Self::InternalFailure(format!("identity store: {source:#}")),
        }
    }
}

impl From<TenantRejection> for GateError {
    fn from(rejection: TenantRejection) -> Self {
        Self::MissingTenant(rejection)
    }
}

impl From<ConnectError> for GateError {
    fn from(err: ConnectError) -> Self {
        Self::ConnectionUnavailable(err)
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let mut response = (kind.status(), Json(json!({ "error": kind.as_str() }))).into_response();
        response.extensions_mut().insert(kind);
        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (GateError::Malformed(MalformedReason::Missing), StatusCode::UNAUTHORIZED),
            (GateError::Unauthorized, StatusCode::UNAUTHORIZED),
            (GateError::MissingTenant(TenantRejection::Absent), StatusCode::BAD_REQUEST),
            (
                GateError::ConnectionUnavailable(ConnectError::TimedOut(Duration::from_secs(1))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (GateError::InternalFailure("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.kind().status(), status, "{err}");
        }
    }

    #[test]
    fn store_faults_are_internal() {
        let err = GateError::from(AuthError::Store(anyhow::anyhow!("db down")));
        assert_eq!(err.kind(), GateErrorKind::InternalFailure);
    }

    #[test]
    fn only_auth_kinds_challenge() {
        assert!(GateErrorKind::MalformedCredentials.is_auth_failure());
        assert!(GateErrorKind::Unauthorized.is_auth_failure());
        assert!(!GateErrorKind::MissingTenant.is_auth_failure());
        assert!(!GateErrorKind::ConnectionUnavailable.is_auth_failure());
    }

    #[test]
    fn response_carries_kind_extension() {
        let response = GateError::MissingTenant(TenantRejection::Absent).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.extensions().get::<GateErrorKind>(),
            Some(&GateErrorKind::MissingTenant)
        );
    }
}
