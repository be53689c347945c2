//! Authentication for Docker Hub and Distribution v2 registries
//!
//! [`Auth`] turns explicit [`Credentials`] into a [`Session`]. Docker Hub's web
//! API uses a JWT from `/v2/users/login/`; Distribution registries answer
//! `GET /v2/` with a `WWW-Authenticate` challenge that is either `Basic` or a
//! `Bearer` token service. Bearer tokens are scoped, so the session keeps a
//! per-scope token cache and fetches tokens lazily.

use crate::error::handlers::HttpErrorHandler;
use crate::error::{Result, SyncError};
use crate::logging::Logger;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry credentials. Held in memory only; `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
    pub registry_url: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            registry_url: None,
        }
    }

    pub fn with_registry_url(mut self, registry_url: impl Into<String>) -> Self {
        self.registry_url = Some(registry_url.into());
        self
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(SyncError::Validation("Username cannot be empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(SyncError::Validation("Password cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("registry_url", &self.registry_url)
            .finish()
    }
}

/// Parsed `WWW-Authenticate: Bearer realm=...,service=...,scope=...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
    pub scope: Option<String>,
}

/// What the registry asked for on `GET /v2/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    None,
    Basic,
    Bearer(AuthChallenge),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

#[derive(Clone)]
enum Scheme {
    Anonymous,
    Jwt(String),
    Basic(Credentials),
    Bearer {
        challenge: AuthChallenge,
        credentials: Option<Credentials>,
        tokens: Arc<Mutex<HashMap<String, String>>>,
    },
}

/// Authenticated registry session
#[derive(Clone)]
pub struct Session {
    registry_url: String,
    scheme: Scheme,
}

impl Session {
    pub fn anonymous(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            scheme: Scheme::Anonymous,
        }
    }

    pub fn scheme_name(&self) -> &'static str {
        match self.scheme {
            Scheme::Anonymous => "anonymous",
            Scheme::Jwt(_) => "jwt",
            Scheme::Basic(_) => "basic",
            Scheme::Bearer { .. } => "bearer",
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("registry_url", &self.registry_url)
            .field("scheme", &self.scheme_name())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Auth {
    client: Client,
    registry_address: String,
    output: Logger,
}

impl Auth {
    pub fn new(client: Client, registry_address: &str, output: Logger) -> Self {
        Self {
            client,
            registry_address: registry_address.trim_end_matches('/').to_string(),
            output,
        }
    }

    /// Docker Hub web API login; the JWT is sent as `Authorization: JWT <token>`
    pub async fn docker_hub_login(&self, credentials: &Credentials) -> Result<Session> {
        credentials.validate()?;
        self.output.verbose(&format!(
            "Logging in to Docker Hub as {}",
            credentials.username
        ));

        let url = format!("{}/v2/users/login/", self.registry_address);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: &credentials.username,
                password: credentials.password(),
            })
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_auth_error(status, &error_text));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("Failed to parse login response: {}", e)))?;
        let token = login
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::Auth("No token received after login".to_string()))?;

        self.output.detail(&format!("JWT obtained (length: {} chars)", token.len()));
        Ok(Session {
            registry_url: self.registry_address.clone(),
            scheme: Scheme::Jwt(token),
        })
    }

    /// Distribution v2 login following the `/v2/` challenge
    pub async fn registry_login(&self, credentials: Option<&Credentials>) -> Result<Session> {
        if let Some(credentials) = credentials {
            credentials.validate()?;
        }

        let challenge = self.get_auth_challenge().await?;
        let scheme = match challenge {
            Challenge::None => {
                self.output
                    .verbose("No authentication challenge - registry does not require auth");
                Scheme::Anonymous
            }
            Challenge::Basic => {
                let credentials = credentials.ok_or_else(|| {
                    SyncError::Auth(format!(
                        "{} requires credentials (Basic auth)",
                        self.registry_address
                    ))
                })?;
                self.verify_basic(credentials).await?;
                Scheme::Basic(credentials.clone())
            }
            Challenge::Bearer(challenge) => {
                self.output.verbose(&format!(
                    "Auth challenge received: realm={}, service={}",
                    challenge.realm, challenge.service
                ));
                let tokens = Arc::new(Mutex::new(HashMap::new()));
                if let Some(credentials) = credentials {
                    // Fail fast on bad credentials instead of on the first listing
                    let token = self.get_token(&challenge, Some(credentials), None).await?;
                    tokens.lock().await.insert(String::new(), token);
                }
                Scheme::Bearer {
                    challenge,
                    credentials: credentials.cloned(),
                    tokens,
                }
            }
        };

        Ok(Session {
            registry_url: self.registry_address.clone(),
            scheme,
        })
    }

    /// Attach the session's authorization to a request for the given scope
    pub async fn authorize(
        &self,
        session: &Session,
        request: RequestBuilder,
        scope: Option<&str>,
    ) -> Result<RequestBuilder> {
        match &session.scheme {
            Scheme::Anonymous => Ok(request),
            Scheme::Jwt(token) => Ok(request.header(AUTHORIZATION, format!("JWT {}", token))),
            Scheme::Basic(credentials) => {
                Ok(request.basic_auth(&credentials.username, Some(credentials.password())))
            }
            Scheme::Bearer {
                challenge,
                credentials,
                tokens,
            } => {
                let key = scope.unwrap_or_default().to_string();
                let mut cache = tokens.lock().await;
                let token = match cache.get(&key) {
                    Some(token) => token.clone(),
                    None => {
                        let token = self
                            .get_token(challenge, credentials.as_ref(), scope)
                            .await?;
                        cache.insert(key, token.clone());
                        token
                    }
                };
                Ok(request.bearer_auth(token))
            }
        }
    }

    async fn get_auth_challenge(&self) -> Result<Challenge> {
        let url = format!("{}/v2/", self.registry_address);
        self.output.detail(&format!("Sending auth challenge request to {}", url));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("Registry {} is unreachable: {}", url, e)))?;

        let status = response.status();
        self.output
            .detail(&format!("Auth challenge response status: {}", status));

        if status.is_success() {
            return Ok(Challenge::None);
        }

        if status == StatusCode::UNAUTHORIZED {
            let header = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    SyncError::Auth("401 without a WWW-Authenticate header".to_string())
                })?;
            return Self::parse_auth_challenge(header).ok_or_else(|| {
                SyncError::Auth(format!("Unsupported auth challenge: {}", header))
            });
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(HttpErrorHandler::handle_auth_error(status, &error_text))
    }

    /// Parse a `WWW-Authenticate` header value
    pub fn parse_auth_challenge(auth_header: &str) -> Option<Challenge> {
        let trimmed = auth_header.trim();
        if trimmed.len() >= 5 && trimmed[..5].eq_ignore_ascii_case("basic") {
            return Some(Challenge::Basic);
        }
        if trimmed.len() < 7 || !trimmed[..7].eq_ignore_ascii_case("bearer ") {
            return None;
        }

        let mut params = HashMap::new();
        for param in split_params(&trimmed[7..]) {
            if let Some((key, value)) = param.split_once('=') {
                params.insert(
                    key.trim().to_ascii_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }

        let realm = params.remove("realm")?;
        Some(Challenge::Bearer(AuthChallenge {
            realm,
            service: params.remove("service").unwrap_or_default(),
            scope: params.remove("scope"),
        }))
    }

    async fn verify_basic(&self, credentials: &Credentials) -> Result<()> {
        let url = format!("{}/v2/", self.registry_address);
        let response = self
            .client
            .get(&url)
            .basic_auth(&credentials.username, Some(credentials.password()))
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("Registry {} is unreachable: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(HttpErrorHandler::handle_auth_error(status, &error_text))
        }
    }

    async fn get_token(
        &self,
        challenge: &AuthChallenge,
        credentials: Option<&Credentials>,
        scope: Option<&str>,
    ) -> Result<String> {
        let mut url = url::Url::parse(&challenge.realm)
            .map_err(|e| {
                SyncError::Auth(format!("Invalid token realm {}: {}", challenge.realm, e))
            })?;
        {
            let mut query = url.query_pairs_mut();
            if !challenge.service.is_empty() {
                query.append_pair("service", &challenge.service);
            }
            if let Some(scope) = scope.filter(|s| !s.is_empty()) {
                query.append_pair("scope", scope);
            }
        }

        self.output
            .detail(&format!("Requesting token for scope {:?}", scope.unwrap_or("-")));

        let mut request = self.client.get(url.as_str());
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(credentials.password()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("Failed to reach token service: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            self.output.debug(&format!(
                "Token request failed with status {}: {}",
                status, error_text
            ));
            return Err(HttpErrorHandler::handle_auth_error(status, &error_text));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("Failed to parse token response: {}", e)))?;

        token_response
            .token
            .or(token_response.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::Auth("Token service returned no token".to_string()))
    }
}

/// Split challenge parameters on commas outside quoted values
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&params[start..]);
    parts
}
