// REST API: the user service and the authenticated /api/v1 routes

use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{
    AuthError, AuthService, AuthType, Authenticator, BasicAuth, DbSessionStore, ExcludedPath,
    MemorySessionStore, SessionAuth, SessionStore, UserLookup, UserStore, cookie_value,
};
use crate::config::ServiceConfig;
use crate::db::Db;
use crate::db::schema::{UserRecord, UserView};
use crate::types::SessionId;

/// Paths under `/api/v1` reachable without a user.
pub const API_EXCLUDED_PATHS: &[&str] = &[
    "/api/v1/status/",
    "/api/v1/unauthorized/",
    "/api/v1/forbidden/",
    "/api/v1/auth_session/login/",
];

/// Shared handles for every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub session_auth: Option<Arc<SessionAuth>>,
    pub config: Arc<ServiceConfig>,
    pub excluded_paths: Arc<Vec<ExcludedPath>>,
}

impl AppState {
    /// Build the services and the single session store for `config.auth_type`.
    pub fn new(db: Db, config: ServiceConfig) -> Self {
        let users = UserStore::new(db.clone());

        let mut session_auth = None;
        let authenticator: Option<Arc<dyn Authenticator>> = match config.auth_type {
            None => None,
            Some(auth_type) if !auth_type.uses_sessions() => {
                Some(Arc::new(BasicAuth::new(users.clone())))
            }
            Some(auth_type) => {
                let sessions: Arc<dyn SessionStore> = match auth_type {
                    AuthType::SessionDbAuth => Arc::new(DbSessionStore::new(db)),
                    _ => Arc::new(MemorySessionStore::new()),
                };
                let auth = Arc::new(SessionAuth::new(
                    sessions,
                    users.clone(),
                    config.session_name.clone(),
                ));
                session_auth = Some(auth.clone());
                Some(auth)
            }
        };

        if let Some(auth_type) = config.auth_type {
            info!("API authentication: {}", auth_type);
        } else {
            info!("API authentication disabled");
        }

        Self {
            auth: AuthService::new(users),
            authenticator,
            session_auth,
            config: Arc::new(config),
            excluded_paths: Arc::new(API_EXCLUDED_PATHS.iter().map(ExcludedPath::new).collect()),
        }
    }

    /// Tear down the session store. Call once before exit.
    pub async fn shutdown(&self) {
        if let Some(session_auth) = &self.session_auth {
            session_auth.sessions().shutdown().await;
        }
    }
}

/// User resolved by the auth middleware.
#[derive(Clone)]
pub struct CurrentUser(pub UserRecord);

/// Both routers merged, as served by the binary.
pub fn create_router(state: AppState) -> Router {
    create_user_service_router(state.clone()).merge(create_api_router(state))
}

pub fn create_user_service_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/users", post(register_user))
        .route("/sessions", post(login).delete(logout))
        .route("/profile", get(profile))
        .route(
            "/reset_password",
            post(get_reset_password_token).put(update_password),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/unauthorized", get(unauthorized))
        .route("/api/v1/forbidden", get(forbidden))
        .route("/api/v1/users/me", get(users_me))
        .route("/api/v1/auth_session/login", post(session_login))
        .route("/api/v1/auth_session/logout", delete(session_logout))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn message_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// Attach `name=<session id>` as an HTTP-only cookie.
fn with_session_cookie(mut response: Response, name: &str, session_id: &SessionId) -> Response {
    let cookie = format!("{}={}; Path=/; HttpOnly", name, session_id);
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
            response
        }
        Err(e) => {
            error!(error = %e, "Session cookie is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Resolve the request user for `/api/v1`.
///
/// 401 when credentials are absent, 403 when they resolve to no user.
async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(authenticator) = state.authenticator.clone() else {
        return next.run(request).await;
    };

    if !authenticator.require_auth(request.uri().path(), &state.excluded_paths) {
        return next.run(request).await;
    }

    let headers = request.headers();
    if authenticator.authorization_header(Some(headers)).is_none()
        && authenticator.session_cookie(Some(headers)).is_none()
    {
        return error_json(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let Some(user) = authenticator.current_user(Some(request.headers())).await else {
        return error_json(StatusCode::FORBIDDEN, "Forbidden");
    };

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

#[derive(Debug, Deserialize)]
struct CredentialsForm {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailForm {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResetPasswordForm {
    email: Option<String>,
    reset_token: Option<String>,
    new_password: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({ "message": "Bienvenue" }))
}

async fn register_user(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let (Some(email), Some(password)) = (non_empty(form.email), non_empty(form.password)) else {
        return message_json(StatusCode::BAD_REQUEST, "email and password required");
    };

    match state.auth.register(&email, &password).await {
        Ok(_) => Json(json!({ "email": email, "message": "user created" })).into_response(),
        Err(AuthError::AlreadyExists(_)) => {
            message_json(StatusCode::BAD_REQUEST, "email already registered")
        }
        Err(e) => {
            error!(error = %e, "Registration failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let (Some(email), Some(password)) = (non_empty(form.email), non_empty(form.password)) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if !state.auth.valid_login(&email, &password).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Some(session_id) = state.auth.create_session(&email).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let response = Json(json!({ "email": email, "message": "logged in" })).into_response();
    with_session_cookie(response, &state.config.session_name, &session_id)
}

async fn session_user(state: &AppState, headers: &HeaderMap) -> Option<UserRecord> {
    let session_id = cookie_value(headers, &state.config.session_name)?;
    state.auth.get_user_from_session_id(&session_id).await
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(user) = session_user(&state, &headers).await else {
        return StatusCode::FORBIDDEN.into_response();
    };

    state.auth.destroy_session(user.user_id.as_str()).await;
    // explicit 302; Redirect::to answers 303
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match session_user(&state, &headers).await {
        Some(user) => Json(json!({ "email": user.email })).into_response(),
        None => StatusCode::FORBIDDEN.into_response(),
    }
}

async fn get_reset_password_token(
    State(state): State<AppState>,
    Form(form): Form<EmailForm>,
) -> Response {
    let Some(email) = non_empty(form.email) else {
        return StatusCode::FORBIDDEN.into_response();
    };

    match state.auth.get_reset_password_token(&email).await {
        Ok(token) => Json(json!({ "email": email, "reset_token": token })).into_response(),
        Err(AuthError::UserNotFound) => StatusCode::FORBIDDEN.into_response(),
        Err(e) => {
            error!(error = %e, "Reset token generation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn update_password(
    State(state): State<AppState>,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    let (Some(email), Some(reset_token), Some(new_password)) = (
        non_empty(form.email),
        non_empty(form.reset_token),
        non_empty(form.new_password),
    ) else {
        return StatusCode::FORBIDDEN.into_response();
    };

    match state.auth.update_password(&reset_token, &new_password).await {
        Ok(()) => Json(json!({ "email": email, "message": "Password updated" })).into_response(),
        Err(AuthError::UserNotFound) => StatusCode::FORBIDDEN.into_response(),
        Err(e) => {
            error!(error = %e, "Password update failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

async fn unauthorized() -> Response {
    error_json(StatusCode::UNAUTHORIZED, "Unauthorized")
}

async fn forbidden() -> Response {
    error_json(StatusCode::FORBIDDEN, "Forbidden")
}

async fn users_me(request: Request) -> Response {
    match request.extensions().get::<CurrentUser>() {
        Some(CurrentUser(user)) => Json(UserView::from(user)).into_response(),
        None => error_json(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn session_login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let Some(email) = non_empty(form.email) else {
        return error_json(StatusCode::BAD_REQUEST, "email missing");
    };
    let Some(password) = non_empty(form.password) else {
        return error_json(StatusCode::BAD_REQUEST, "password missing");
    };
    let Some(session_auth) = state.session_auth.clone() else {
        return error_json(StatusCode::NOT_FOUND, "Not found");
    };

    let user = match state.auth.users().find_user_by(UserLookup::Email(&email)).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_json(StatusCode::NOT_FOUND, "no user found for this email"),
        Err(e) => {
            error!(error = %e, "User lookup failed during session login");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !crate::auth::verify_password(&user.hashed_password, &password) {
        return error_json(StatusCode::UNAUTHORIZED, "wrong password");
    }

    let Some(session_id) = session_auth.create_session(user.user_id.as_str()).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let response = Json(UserView::from(&user)).into_response();
    with_session_cookie(response, session_auth.cookie_name(), &session_id)
}

async fn session_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_auth) = state.session_auth.clone() else {
        return error_json(StatusCode::NOT_FOUND, "Not found");
    };

    if session_auth.destroy_session(Some(&headers)).await {
        Json(json!({})).into_response()
    } else {
        error_json(StatusCode::NOT_FOUND, "Not found")
    }
}
