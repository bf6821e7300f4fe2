//! The credential verification contract.

use async_trait::async_trait;
use http::HeaderValue;
use tentia_core::Identity;

/// Why a credential header could not be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("no authorization header")]
    Missing,
    #[error("authorization header is not visible ASCII")]
    NotVisibleAscii,
    #[error("unexpected authorization scheme")]
    WrongScheme,
    #[error("credentials are not valid base64 UTF-8")]
    BadEncoding,
    #[error("credentials have no ':' separator")]
    MissingSeparator,
    #[error("token could not be decoded")]
    BadToken,
}

/// Rejections produced by a [`CredentialVerifier`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed credentials: {0}")]
    Malformed(MalformedReason),
    /// Unknown principal and wrong secret deliberately share this variant.
    #[error("credentials were not accepted")]
    Unauthorized,
    #[error("identity store failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl From<MalformedReason> for AuthError {
    fn from(reason: MalformedReason) -> Self {
        Self::Malformed(reason)
    }
}

/// Pluggable credential scheme.
///
/// Implementations turn the raw `Authorization` header into an [`Identity`].
/// The gate calls [`verify`](CredentialVerifier::verify) before anything
/// tenant-related runs and answers rejections with
/// [`challenge`](CredentialVerifier::challenge) in `WWW-Authenticate`.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Scheme tag this verifier accepts, e.g. `"Basic"`.
    fn scheme(&self) -> &'static str;

    /// `WWW-Authenticate` value sent with authentication rejections.
    fn challenge(&self) -> HeaderValue;

    /// Verifies the raw header value. `None` means the header was absent,
    /// which is rejected exactly like a malformed header.
    async fn verify(&self, authorization: Option<&HeaderValue>) -> Result<Identity, AuthError>;
}

/// Splits `<scheme> <credentials>` and returns the credentials part.
///
/// The scheme tag is matched ASCII case-insensitively.
pub(crate) fn credentials_for<'a>(
    authorization: Option<&'a HeaderValue>,
    scheme: &str,
) -> Result<&'a str, MalformedReason> {
    let raw = authorization.ok_or(MalformedReason::Missing)?;
    let raw = raw.to_str().map_err(|_| MalformedReason::NotVisibleAscii)?;
    let (tag, credentials) = raw.trim().split_once(' ').ok_or(MalformedReason::WrongScheme)?;
    if !tag.eq_ignore_ascii_case(scheme) {
        return Err(MalformedReason::WrongScheme);
    }
    let credentials = credentials.trim();
    if credentials.is_empty() {
        return Err(MalformedReason::BadEncoding);
    }
    Ok(credentials)
}

/// Builds a `WWW-Authenticate` challenge, falling back to the bare scheme
/// when the realm cannot be represented in a header value.
pub(crate) fn build_challenge(scheme: &'static str, realm: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{scheme} realm=\"{realm}\", charset=\"UTF-8\""))
        .unwrap_or_else(|_| HeaderValue::from_static(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_for_strips_scheme() {
        let header = HeaderValue::from_static("Basic YWxpY2U6cHc=");
        assert_eq!(credentials_for(Some(&header), "Basic"), Ok("YWxpY2U6cHc="));
    }

    #[test]
    fn scheme_match_is_case_insensitive() {
        let header = HeaderValue::from_static("bAsIc YWxpY2U6cHc=");
        assert_eq!(credentials_for(Some(&header), "Basic"), Ok("YWxpY2U6cHc="));
    }

    #[test]
    fn missing_header_is_malformed() {
        assert_eq!(credentials_for(None, "Basic"), Err(MalformedReason::Missing));
    }

    #[test]
    fn other_scheme_is_malformed() {
        let header = HeaderValue::from_static("Bearer abc");
        assert_eq!(
            credentials_for(Some(&header), "Basic"),
            Err(MalformedReason::WrongScheme)
        );
    }

    #[test]
    fn bare_scheme_is_malformed() {
        let header = HeaderValue::from_static("Basic");
        assert_eq!(
            credentials_for(Some(&header), "Basic"),
            Err(MalformedReason::WrongScheme)
        );
        let header = HeaderValue::from_static("Basic    ");
        assert!(credentials_for(Some(&header), "Basic").is_err());
    }

    #[test]
    fn non_ascii_header_is_malformed() {
        let header = HeaderValue::from_bytes(b"Basic \xff\xfe").unwrap();
        assert_eq!(
            credentials_for(Some(&header), "Basic"),
            Err(MalformedReason::NotVisibleAscii)
        );
    }

    #[test]
    fn challenge_names_scheme_and_realm() {
        let challenge = build_challenge("Basic", "tentia");
        assert_eq!(challenge, "Basic realm=\"tentia\", charset=\"UTF-8\"");
    }

    #[test]
    fn challenge_falls_back_on_unrepresentable_realm() {
        let challenge = build_challenge("Basic", "bad\nrealm");
        assert_eq!(challenge, "Basic");
    }
}
