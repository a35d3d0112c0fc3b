//! Identity from a proxy-injected client principal.
//!
//! An authentication proxy in front of the app signs users in and forwards
//! the result in the `X-MS-CLIENT-PRINCIPAL` header: base64url-encoded JSON
//! of the shape `{"claims": [{"typ": "...", "val": "..."}, ...]}`.
//! [`PrincipalDecoder`] turns that header into an [`Identity`].
//!
//! # Security Warning
//!
//! The header is trusted as-is. There is no signature check, so the app must
//! only be reachable through a proxy that strips client-supplied copies.
//!
//! # Failure policy
//!
//! Decoding never fails from the caller's point of view. A missing header,
//! bad base64, bad UTF-8, bad JSON or an empty claim set all produce
//! [`Identity::anonymous`]. Every failure is logged at debug level and handed
//! to the diagnostic hook, if one is installed.

use std::fmt;
use std::string::FromUtf8Error;
use std::sync::Arc;

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const PRINCIPAL_HEADER: &str = "x-ms-client-principal";
pub const PRINCIPAL_ID_HEADER: &str = "x-ms-client-principal-id";
pub const PRINCIPAL_NAME_HEADER: &str = "x-ms-client-principal-name";

/// Scheme label carried by identities built from the principal header.
pub const AUTHENTICATION_SCHEME: &str = "AppServiceEasyAuth";

/// Claim types tried, in order, by [`Identity::name`].
pub const NAME_CLAIM_TYPES: [&str; 3] = [
    "name",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name",
    "preferred_username",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub typ: String,
    pub val: String,
}

impl Claim {
    pub fn new(typ: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            typ: typ.into(),
            val: val.into(),
        }
    }
}

/// The principal of one request: either anonymous, or authenticated with a
/// non-empty set of claims.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    authentication_type: Option<String>,
    claims: Vec<Claim>,
    header_name: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds an authenticated identity. Falls back to anonymous when
    /// `claims` is empty.
    pub fn authenticated(scheme: impl Into<String>, claims: Vec<Claim>) -> Self {
        if claims.is_empty() {
            return Self::anonymous();
        }
        Self {
            authentication_type: Some(scheme.into()),
            claims,
            header_name: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authentication_type.is_some()
    }

    pub fn authentication_type(&self) -> Option<&str> {
        self.authentication_type.as_deref()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn find_first(&self, typ: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.typ == typ)
            .map(|c| c.val.as_str())
    }

    /// Display name: the first name-like claim, else `X-MS-CLIENT-PRINCIPAL-NAME`.
    pub fn name(&self) -> Option<&str> {
        if !self.is_authenticated() {
            return None;
        }
        NAME_CLAIM_TYPES
            .iter()
            .find_map(|typ| self.find_first(typ))
            .or(self.header_name.as_deref())
    }
}

/// Reasons a principal header could not be turned into an identity.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("principal header is not visible ASCII")]
    HeaderNotText,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("principal payload is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("principal payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("principal carries no usable claims")]
    NoClaims,
}

type DecodeHook = Arc<dyn Fn(&DecodeError) + Send + Sync>;

/// Stateless header-to-identity transform.
///
/// ```rust
/// use axum::http::HeaderMap;
/// use todo_app_core::principal::PrincipalDecoder;
///
/// let decoder = PrincipalDecoder::new();
/// let identity = decoder.decode(&HeaderMap::new());
/// assert!(!identity.is_authenticated());
/// ```
#[derive(Clone)]
pub struct PrincipalDecoder {
    require_principal_id: bool,
    on_failure: Option<DecodeHook>,
}

impl fmt::Debug for PrincipalDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalDecoder")
            .field("require_principal_id", &self.require_principal_id)
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

impl Default for PrincipalDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PrincipalDecoder {
    pub fn new() -> Self {
        Self {
            require_principal_id: true,
            on_failure: None,
        }
    }

    /// When set (the default), the principal is only decoded if
    /// `X-MS-CLIENT-PRINCIPAL-ID` is present and not blank.
    pub fn require_principal_id(mut self, required: bool) -> Self {
        self.require_principal_id = required;
        self
    }

    /// Installs a hook that observes every swallowed decode failure.
    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DecodeError) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    pub fn decode(&self, headers: &HeaderMap) -> Identity {
        let Some(encoded) = headers.get(PRINCIPAL_HEADER) else {
            return Identity::anonymous();
        };

        if self.require_principal_id && !has_text(headers, PRINCIPAL_ID_HEADER) {
            debug!("Principal header present without a principal id, treating as anonymous");
            return Identity::anonymous();
        }

        let result = encoded
            .to_str()
            .map_err(|_| DecodeError::HeaderNotText)
            .and_then(decode_claims);

        match result {
            Ok(claims) => {
                let mut identity = Identity::authenticated(AUTHENTICATION_SCHEME, claims);
                identity.header_name = headers
                    .get(PRINCIPAL_NAME_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.trim().is_empty())
                    .map(str::to_string);
                identity
            }
            Err(e) => {
                debug!("Discarding client principal: {e}");
                if let Some(hook) = &self.on_failure {
                    hook(&e);
                }
                Identity::anonymous()
            }
        }
    }
}

fn has_text(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty())
}

/// base64url (unpadded or padded) to standard base64 with padding.
fn normalize_base64(encoded: &str) -> String {
    let mut normalized: String = encoded
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let padding = (4 - normalized.len() % 4) % 4;
    normalized.extend(std::iter::repeat('=').take(padding));
    normalized
}

fn decode_claims(encoded: &str) -> Result<Vec<Claim>, DecodeError> {
    let bytes = STANDARD.decode(normalize_base64(encoded))?;
    let json = String::from_utf8(bytes)?;
    let document: JsonValue = serde_json::from_str(&json)?;

    let claims: Vec<Claim> = document
        .get("claims")
        .and_then(JsonValue::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let typ = entry.get("typ")?.as_str()?;
                    let val = entry.get("val")?.as_str()?;
                    (!typ.trim().is_empty()).then(|| Claim::new(typ, val))
                })
                .collect()
        })
        .unwrap_or_default();

    if claims.is_empty() {
        return Err(DecodeError::NoClaims);
    }
    Ok(claims)
}
