//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Builds the signature base string from the HTTP method, the normalized URL
//! and the sorted, percent-encoded parameter set, signs it with
//! `consumer_secret&token_secret`, and renders the `Authorization` header.
//! Given a fixed nonce and timestamp the output is deterministic.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use tracing::debug;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

/// Random bytes drawn per nonce before non-alphanumerics are stripped.
const NONCE_BYTES: usize = 32;

/// Application (consumer) credentials.
#[derive(Clone)]
pub struct ConsumerCredentials {
    pub key: String,
    pub secret: String,
}

impl ConsumerCredentials {
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key_len", &self.key.len())
            .field("secret_len", &self.secret.len())
            .finish()
    }
}

/// A token/secret pair used as the second half of the signing key.
///
/// Request tokens and access tokens both sign this way.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenCredentials {
    pub token: String,
    pub secret: String,
}

impl TokenCredentials {
    #[must_use]
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for TokenCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredentials")
            .field("token_len", &self.token.len())
            .field("secret_len", &self.secret.len())
            .finish()
    }
}

/// Everything that goes into one signature.
#[derive(Debug, Clone, Default)]
pub struct OAuthRequest<'a> {
    /// HTTP method (any case).
    pub method: &'a str,
    /// Full request URL; query parameters are folded into the signature.
    pub url: &'a str,
    /// Form-encoded body parameters. JSON bodies are not signed.
    pub body_params: &'a [(&'a str, &'a str)],
    /// Extra protocol parameters such as `oauth_callback` or `oauth_verifier`.
    pub oauth_params: &'a [(&'a str, &'a str)],
    /// Token credentials, absent for the request-token step.
    pub token: Option<&'a TokenCredentials>,
}

/// Signs requests on behalf of one consumer.
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    consumer: ConsumerCredentials,
}

impl OAuthSigner {
    #[must_use]
    pub fn new(consumer: ConsumerCredentials) -> Self {
        Self { consumer }
    }

    /// The consumer key this signer presents.
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer.key
    }

    /// Produce an `Authorization` header value with a fresh nonce and timestamp.
    ///
    /// # Errors
    /// Returns an error if `request.url` is not an absolute URL.
    pub fn authorize(&self, request: &OAuthRequest<'_>) -> Result<String, url::ParseError> {
        let nonce = generate_nonce();
        let timestamp = Utc::now().timestamp().to_string();

        debug!(
            method = request.method,
            url = request.url,
            oauth_nonce = %nonce,
            oauth_timestamp = %timestamp,
            has_consumer_key = !self.consumer.key.is_empty(),
            has_consumer_secret = !self.consumer.secret.is_empty(),
            has_token = request.token.is_some(),
            "Signing OAuth request"
        );

        self.authorize_with(request, &nonce, &timestamp)
    }

    /// Produce an `Authorization` header value for a fixed nonce and timestamp.
    ///
    /// # Errors
    /// Returns an error if `request.url` is not an absolute URL.
    pub fn authorize_with(
        &self,
        request: &OAuthRequest<'_>,
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, url::ParseError> {
        let mut oauth = self.protocol_params(request, nonce, timestamp);
        let signature = self.signature(request, &oauth)?;
        oauth.push(("oauth_signature".to_string(), signature));
        oauth.sort();

        let fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();

        Ok(format!("OAuth {}", fields.join(", ")))
    }

    /// Compute the base64 HMAC-SHA1 signature for a fixed nonce and timestamp.
    ///
    /// # Errors
    /// Returns an error if `request.url` is not an absolute URL.
    pub fn sign(
        &self,
        request: &OAuthRequest<'_>,
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, url::ParseError> {
        let oauth = self.protocol_params(request, nonce, timestamp);
        self.signature(request, &oauth)
    }

    fn protocol_params(
        &self,
        request: &OAuthRequest<'_>,
        nonce: &str,
        timestamp: &str,
    ) -> Vec<(String, String)> {
        let mut params = vec![
            ("oauth_consumer_key".to_string(), self.consumer.key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            (
                "oauth_signature_method".to_string(),
                SIGNATURE_METHOD.to_string(),
            ),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
        ];
        if let Some(token) = request.token {
            params.push(("oauth_token".to_string(), token.token.clone()));
        }
        params.extend(
            request
                .oauth_params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        );
        params
    }

    fn signature(
        &self,
        request: &OAuthRequest<'_>,
        oauth: &[(String, String)],
    ) -> Result<String, url::ParseError> {
        let base = base_string(request, oauth)?;
        let key = format!(
            "{}&{}",
            encode(&self.consumer.secret),
            encode(request.token.map_or("", |t| t.secret.as_str()))
        );

        let Ok(mut mac) = HmacSha1::new_from_slice(key.as_bytes()) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// `METHOD&encoded-url&encoded-params`.
fn base_string(
    request: &OAuthRequest<'_>,
    oauth: &[(String, String)],
) -> Result<String, url::ParseError> {
    let url = Url::parse(request.url)?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (encode(&k), encode(&v)))
        .collect();
    pairs.extend(request.body_params.iter().map(|(k, v)| (encode(k), encode(v))));
    pairs.extend(oauth.iter().map(|(k, v)| (encode(k), encode(v))));
    pairs.sort();

    let params = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        request.method.to_ascii_uppercase(),
        encode(&normalized_url(&url)),
        encode(&params)
    ))
}

/// Scheme, host, non-default port and path; no query or fragment.
fn normalized_url(url: &Url) -> String {
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!(
        "{}://{}{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        port,
        url.path()
    )
}

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`.
pub(crate) fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Alphanumeric nonce from 32 bytes of OS randomness.
#[must_use]
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    STANDARD
        .encode(bytes)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}
