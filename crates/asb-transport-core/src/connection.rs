//! Connection string parsing and Shared Access Signature generation.

use crate::error::ConfigurationError;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

/// Environment variable consulted when no connection string is passed explicitly.
pub const CONNECTION_STRING_ENV_VAR: &str = "AzureServiceBus_ConnectionString";

/// How requests against the namespace are authorised.
#[derive(Clone)]
pub enum Credentials {
    /// Key name and base64 key used to sign short-lived tokens.
    SharedAccessKey {
        key_name: String,
        key: Zeroizing<String>,
    },
    /// Pre-issued `SharedAccessSignature ...` token used verbatim.
    SharedAccessSignature(Zeroizing<String>),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedAccessKey { key_name, .. } => f
                .debug_struct("SharedAccessKey")
                .field("key_name", key_name)
                .field("key", &"<redacted>")
                .finish(),
            Self::SharedAccessSignature(_) => f.write_str("SharedAccessSignature(<redacted>)"),
        }
    }
}

/// Parsed Service Bus connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    endpoint: Url,
    credentials: Credentials,
}

impl ConnectionString {
    /// Parse `Endpoint=sb://...;SharedAccessKeyName=...;SharedAccessKey=...`.
    ///
    /// `UseDevelopmentEmulator=true` switches the namespace endpoint to plain HTTP.
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        if value.trim().is_empty() {
            return Err(malformed("connection string cannot be empty"));
        }

        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut signature = None;
        let mut use_emulator = false;

        for part in value.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (name, part_value) = part
                .split_once('=')
                .ok_or_else(|| malformed("every segment must be a key=value pair"))?;

            match name.to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(part_value.to_string()),
                "sharedaccesskeyname" => key_name = Some(part_value.to_string()),
                "sharedaccesskey" => key = Some(Zeroizing::new(part_value.to_string())),
                "sharedaccesssignature" => {
                    signature = Some(Zeroizing::new(part_value.to_string()))
                }
                "usedevelopmentemulator" => {
                    use_emulator = part_value.trim().eq_ignore_ascii_case("true")
                }
                // EntityPath and unknown keys do not affect namespace-level calls.
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| ConfigurationError::Missing {
            key: "Endpoint".to_string(),
        })?;
        let endpoint = namespace_url(&endpoint, use_emulator)?;

        let credentials = match (key_name, key, signature) {
            (_, _, Some(signature)) => Credentials::SharedAccessSignature(signature),
            (Some(key_name), Some(key), None) => Credentials::SharedAccessKey { key_name, key },
            (None, _, None) => {
                return Err(ConfigurationError::Missing {
                    key: "SharedAccessKeyName".to_string(),
                })
            }
            (Some(_), None, None) => {
                return Err(ConfigurationError::Missing {
                    key: "SharedAccessKey".to_string(),
                })
            }
        };

        Ok(Self {
            endpoint,
            credentials,
        })
    }

    /// Namespace base URL, always ending in `/`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Value for the `Authorization` header, valid for `lifetime`.
    pub fn authorization(&self, lifetime: Duration) -> Result<String, ConfigurationError> {
        match &self.credentials {
            Credentials::SharedAccessSignature(signature) => Ok(signature.as_str().to_string()),
            Credentials::SharedAccessKey { key_name, key } => {
                SasTokenGenerator::new(self.endpoint.as_str()).generate_sas_token(
                    key_name,
                    key,
                    lifetime,
                )
            }
        }
    }
}

impl FromStr for ConnectionString {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn malformed(message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::MalformedConnectionString {
        message: message.into(),
    }
}

fn namespace_url(endpoint: &str, use_emulator: bool) -> Result<Url, ConfigurationError> {
    let parsed = Url::parse(endpoint)
        .map_err(|e| malformed(format!("Endpoint '{}' is not a valid URI: {}", endpoint, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| malformed(format!("Endpoint '{}' has no host", endpoint)))?;

    let scheme = if use_emulator { "http" } else { "https" };
    let base = match parsed.port() {
        Some(port) => format!("{}://{}:{}/", scheme, host, port),
        None => format!("{}://{}/", scheme, host),
    };

    Url::parse(&base).map_err(|e| malformed(e.to_string()))
}

// ============================================================================
// SAS Tokens
// ============================================================================

/// Generator for Shared Access Signature tokens scoped to a resource URI.
///
/// Tokens are signed with HMAC-SHA256 over the URL-encoded, lower-cased
/// resource URI and the expiry timestamp.
#[derive(Debug, Clone)]
pub struct SasTokenGenerator {
    resource_uri: String,
}

impl SasTokenGenerator {
    pub fn new(resource_uri: impl Into<String>) -> Self {
        Self {
            resource_uri: resource_uri.into().to_lowercase(),
        }
    }

    /// Generate a token that expires `lifetime` from now.
    pub fn generate_sas_token(
        &self,
        key_name: &str,
        key: &str,
        lifetime: Duration,
    ) -> Result<String, ConfigurationError> {
        let expiry = (Utc::now() + lifetime).timestamp();
        self.sign(key_name, key, expiry)
    }

    fn sign(&self, key_name: &str, key: &str, expiry: i64) -> Result<String, ConfigurationError> {
        let encoded_uri = urlencoding::encode(&self.resource_uri);
        let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

        // The portal hands out the key base64 encoded, but the raw string is the HMAC key.
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| {
            ConfigurationError::Invalid {
                message: format!("Failed to create HMAC: {}", e),
            }
        })?;
        mac.update(string_to_sign.as_bytes());
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri,
            urlencoding::encode(&signature),
            expiry,
            key_name
        ))
    }
}
