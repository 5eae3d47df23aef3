//! HTTP handlers for the gateway server

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    Form,
};
use rpcbridge_core::{branding, CredentialPair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::state::AppState;
use crate::oauth::{AuthorizeRequest, ChallengeMethod, IssuedTokens, OAuthError};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness of the gateway process itself (not the backend)
pub async fn health() -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// OAuth Authorization Server Metadata (RFC 8414)
#[derive(Serialize)]
pub struct OAuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

pub async fn oauth_metadata(State(state): State<AppState>) -> Json<OAuthServerMetadata> {
    debug!("[OAuth] Authorization server metadata request");
    Json(OAuthServerMetadata {
        issuer: state.base_url.clone(),
        authorization_endpoint: state.endpoint("/authorize"),
        token_endpoint: state.endpoint("/token"),
        registration_endpoint: state.endpoint("/register"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
            "password".to_string(),
        ],
        code_challenge_methods_supported: vec![ChallengeMethod::S256.as_str().to_string()],
        token_endpoint_auth_methods_supported: vec!["none".to_string()],
        scopes_supported: vec![branding::DEFAULT_SCOPE.to_string()],
    })
}

/// OAuth Protected Resource Metadata (RFC 9728)
#[derive(Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
}

/// Served at the root document and at the resource-specific path
pub async fn resource_metadata(State(state): State<AppState>) -> Json<ProtectedResourceMetadata> {
    debug!("[OAuth] Protected resource metadata request");
    Json(ProtectedResourceMetadata {
        resource: state.endpoint(&state.mcp_path),
        authorization_servers: vec![state.base_url.clone()],
        scopes_supported: vec![branding::DEFAULT_SCOPE.to_string()],
        bearer_methods_supported: vec!["header".to_string()],
    })
}

/// Dynamic client registration request (RFC 7591). Every field is optional;
/// registration always yields the same client.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    pub client_id_issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
}

pub async fn oauth_register(Json(request): Json<RegistrationRequest>) -> impl IntoResponse {
    info!(
        "[DCR] Registration request from: {} (redirect_uris: {:?})",
        request.client_name.as_deref().unwrap_or("-"),
        request.redirect_uris
    );

    let grant_types = if request.grant_types.is_empty() {
        vec!["authorization_code".to_string(), "refresh_token".to_string()]
    } else {
        request.grant_types
    };

    (
        StatusCode::CREATED,
        Json(RegistrationResponse {
            client_id: branding::REGISTERED_CLIENT_ID.to_string(),
            client_id_issued_at: chrono::Utc::now().timestamp(),
            client_name: request.client_name,
            redirect_uris: request.redirect_uris,
            grant_types,
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
        }),
    )
}

/// Authorization request, from the query string (GET) or the form (POST)
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Submitted by the login form only
    pub login: Option<String>,
    /// Submitted by the login form only
    pub secret: Option<String>,
}

impl AuthorizeParams {
    /// Checks that do not need credentials. On failure returns the response
    /// to send: an error redirect once the redirect URI is usable, otherwise
    /// a plain 400 page.
    fn precheck(&self) -> Result<Url, Response> {
        let Some(redirect_uri) = self.redirect_uri.as_deref().filter(|r| !r.is_empty()) else {
            return Err(error_page(StatusCode::BAD_REQUEST, "Missing redirect_uri"));
        };
        let Ok(redirect) = Url::parse(redirect_uri) else {
            return Err(error_page(StatusCode::BAD_REQUEST, "Invalid redirect_uri"));
        };

        let response_type = self.response_type.as_deref().unwrap_or_default();
        if response_type != "code" {
            let err = OAuthError::UnsupportedResponseType(response_type.to_string());
            return Err(error_redirect(&redirect, &err, self.state.as_deref()));
        }

        if self.code_challenge.as_deref().unwrap_or_default().is_empty() {
            let err = OAuthError::InvalidRequest("code_challenge is required".into());
            return Err(error_redirect(&redirect, &err, self.state.as_deref()));
        }

        if ChallengeMethod::parse(self.code_challenge_method.as_deref()).is_none() {
            let err = OAuthError::InvalidRequest("code_challenge_method must be S256".into());
            return Err(error_redirect(&redirect, &err, self.state.as_deref()));
        }

        Ok(redirect)
    }
}

/// GET /authorize - render the login form
pub async fn oauth_authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    info!(
        "[OAuth] Authorization request: client_id={:?}",
        params.client_id
    );

    if let Err(response) = params.precheck() {
        return response;
    }

    Html(login_form(&state, &params, None)).into_response()
}

/// POST /authorize - validate the submitted pair and redirect with a code
pub async fn oauth_authorize_submit(
    State(state): State<AppState>,
    Form(params): Form<AuthorizeParams>,
) -> Response {
    let redirect = match params.precheck() {
        Ok(redirect) => redirect,
        Err(response) => return response,
    };

    let credentials = CredentialPair::new(
        params.login.clone().unwrap_or_default(),
        params.secret.clone().unwrap_or_default(),
    );
    if credentials.login.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Html(login_form(&state, &params, Some("Login is required"))),
        )
            .into_response();
    }

    let request = AuthorizeRequest {
        credentials,
        client_id: params.client_id.clone(),
        redirect_uri: params.redirect_uri.clone().unwrap_or_default(),
        code_challenge: params.code_challenge.clone().unwrap_or_default(),
        code_challenge_method: params.code_challenge_method.clone(),
        scope: params.scope.clone(),
    };

    match state.oauth.authorize(request).await {
        Ok(code) => {
            let mut target = redirect;
            {
                let mut query = target.query_pairs_mut();
                query.append_pair("code", &code);
                if let Some(s) = params.state.as_deref() {
                    query.append_pair("state", s);
                }
            }
            Redirect::to(target.as_str()).into_response()
        }
        Err(OAuthError::InvalidCredentials) => (
            StatusCode::UNAUTHORIZED,
            Html(login_form(&state, &params, Some("Invalid credentials"))),
        )
            .into_response(),
        Err(err) => {
            warn!("[OAuth] Authorization failed: {}", err);
            error_redirect(&redirect, &err, params.state.as_deref())
        }
    }
}

/// Token request form (RFC 6749 §4.1.3, §4.3.2, §6)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponseBody {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<IssuedTokens> for TokenResponseBody {
    fn from(issued: IssuedTokens) -> Self {
        Self {
            access_token: issued.access_token,
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
            refresh_token: Some(issued.refresh_token),
            scope: issued.scope,
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, OAuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{} is required", name)))
}

/// POST /token
pub async fn oauth_token(State(state): State<AppState>, Form(request): Form<TokenRequest>) -> Response {
    let grant_type = request.grant_type.as_deref().unwrap_or_default();
    info!(
        "[OAuth] Token request: grant_type={}, client_id={:?}",
        grant_type, request.client_id
    );

    let issued = match grant_type {
        "password" => match (required(&request.username, "username"), required(&request.password, "password")) {
            (Ok(username), Ok(password)) => {
                state
                    .oauth
                    .password_grant(CredentialPair::new(username, password), request.scope.clone())
                    .await
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        },
        "authorization_code" => required(&request.code, "code").and_then(|code| {
            state.oauth.exchange_code(
                code,
                request.redirect_uri.as_deref(),
                request.code_verifier.as_deref(),
                request.client_id.as_deref(),
            )
        }),
        "refresh_token" => {
            required(&request.refresh_token, "refresh_token").and_then(|token| state.oauth.refresh(token))
        }
        "" => Err(OAuthError::InvalidRequest("grant_type is required".into())),
        other => Err(OAuthError::UnsupportedGrantType(other.to_string())),
    };

    match issued {
        Ok(issued) => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-store")],
            Json(TokenResponseBody::from(issued)),
        )
            .into_response(),
        Err(err) => {
            warn!("[OAuth] Token request rejected: {} ({})", err.error_code(), grant_type);
            err.into_response()
        }
    }
}

/// Redirect back to the client with `error`, `error_description` and `state`
fn error_redirect(redirect: &Url, err: &OAuthError, state: Option<&str>) -> Response {
    let mut target = redirect.clone();
    {
        let mut query = target.query_pairs_mut();
        query.append_pair("error", err.error_code());
        query.append_pair("error_description", &err.to_string());
        if let Some(s) = state {
            query.append_pair("state", s);
        }
    }
    Redirect::to(target.as_str()).into_response()
}

fn error_page(status: StatusCode, message: &str) -> Response {
    let html = format!(
        "<!DOCTYPE html>\n<html><head><title>{name} - Error</title></head>\
         <body><h1>Authorization error</h1><p>{message}</p></body></html>",
        name = branding::DISPLAY_NAME,
        message = escape_html(message),
    );
    (status, Html(html)).into_response()
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn hidden(name: &str, value: Option<&str>) -> String {
    match value {
        Some(v) => format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            name,
            escape_html(v)
        ),
        None => String::new(),
    }
}

/// Login form; resubmits every authorization parameter as hidden fields
fn login_form(state: &AppState, params: &AuthorizeParams, error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape_html(e)))
        .unwrap_or_default();

    let hidden_fields = [
        hidden("response_type", params.response_type.as_deref()),
        hidden("client_id", params.client_id.as_deref()),
        hidden("redirect_uri", params.redirect_uri.as_deref()),
        hidden("scope", params.scope.as_deref()),
        hidden("state", params.state.as_deref()),
        hidden("code_challenge", params.code_challenge.as_deref()),
        hidden("code_challenge_method", params.code_challenge_method.as_deref()),
    ]
    .concat();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{name} - Sign in</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 24rem; margin: 4rem auto; }}
        label {{ display: block; margin-top: 1rem; }}
        input[type=text], input[type=password] {{ width: 100%; padding: 0.4rem; }}
        .error {{ color: #b00020; }}
        button {{ margin-top: 1.5rem; padding: 0.5rem 1.5rem; }}
    </style>
</head>
<body>
    <h1>{name}</h1>
    <p>Sign in with your backend credentials.</p>
    {error_html}
    <form method="post" action="{action}">
        {hidden_fields}
        <label>Login <input type="text" name="login" value="{login}" autocomplete="username" required></label>
        <label>Secret <input type="password" name="secret" autocomplete="current-password" required></label>
        <button type="submit">Authorize</button>
    </form>
</body>
</html>"#,
        name = branding::DISPLAY_NAME,
        action = escape_html(&state.endpoint("/authorize")),
        login = escape_html(params.login.as_deref().unwrap_or_default()),
    )
}
