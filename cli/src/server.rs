use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State, rejection::PathRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::spoonacular::SpoonacularClient;
use potluck_core::auth::{generate_session_token, hash_password, hash_token, verify_password};
use potluck_core::db::Database;
use potluck_core::error::Error;
use potluck_core::models::{
    NewUser, ParsedIngredient, Recipe, RecipeDetail, RecipeRequest, User, clean_ingredient_lines,
    validate_servings, validate_signup,
};
use potluck_core::pipeline::{self, Aborted, RecipePipeline};
use potluck_core::store::SharedDatabase;
use potluck_core::upstream::{FoodTrivia, IngredientNormalizer, TriviaKind};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB
const SESSION_COOKIE: &str = "potluck_session";

#[derive(Clone)]
struct AppState {
    db: SharedDatabase,
    normalizer: Arc<dyn IngredientNormalizer>,
    trivia: Arc<dyn FoodTrivia>,
    secure_cookies: bool,
    session_ttl: chrono::Duration,
}

impl AppState {
    fn session_cookie(&self, token: &str) -> String {
        self.cookie(token, self.session_ttl.num_seconds())
    }

    fn expired_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let mut cookie =
            format!("{SESSION_COOKIE}={value}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}");
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Everything `serve` needs besides the database.
pub struct ServeOptions {
    pub port: u16,
    pub bind: String,
    pub public_dir: Option<PathBuf>,
    pub secure_cookies: bool,
    pub session_ttl_hours: u32,
    pub spoonacular_key: Option<String>,
    pub spoonacular_url: String,
    pub spoonacular_timeout_secs: u64,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct SignupRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseIngredientsRequest {
    ingredient_list: String,
    #[serde(default = "default_servings")]
    servings: i64,
}

fn default_servings() -> i64 {
    1
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_internal() {
            return Self::Internal(anyhow::Error::new(err));
        }
        let message = err.to_string();
        match err {
            Error::Validation(_) => Self::BadRequest(message),
            Error::Auth(_) => Self::Unauthorized(message),
            Error::NotFound(_) => Self::NotFound(message),
            Error::Conflict(_) => Self::Conflict(message),
            _ => Self::BadGateway(message),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<Aborted> for ApiError {
    fn from(aborted: Aborted) -> Self {
        warn!(
            stage = %aborted.stage,
            kind = aborted.error.kind(),
            "recipe not created"
        );
        aborted.error.into()
    }
}

// --- Sessions ---

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| pair.trim().strip_prefix("potluck_session="))
        .filter(|token| !token.is_empty())
}

fn session_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    let Some(token) = session_token(headers) else {
        return Ok(None);
    };
    let user = state
        .db
        .lock()
        .get_session_user(&hash_token(token), Utc::now())?;
    Ok(user)
}

// --- Middleware ---

async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match session_user(&state, request.headers()) {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(None) => ApiError::Unauthorized("Not logged in".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    response
}

// --- Handlers ---

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Redirect, ApiError> {
    validate_signup(&req.username, &req.email, &req.password)?;

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("password hashing task failed")??;

    let user = state.db.lock().create_user(&NewUser {
        username: req.username,
        email: req.email,
        password_hash,
    })?;
    info!(user_id = user.id, "user signed up");

    // 307 keeps the method and body, so the client logs straight in.
    Ok(Redirect::temporary("/api/login"))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let user = state.db.lock().get_user_by_email(&req.email)?;

    let verified = match user {
        Some(user) => {
            let hash = user.password_hash.clone();
            let ok = tokio::task::spawn_blocking(move || verify_password(&req.password, &hash))
                .await
                .context("password verification task failed")?;
            ok.then_some(user)
        }
        None => None,
    };
    let Some(user) = verified else {
        debug!("login rejected");
        return Err(Error::Auth("Incorrect email or password".to_string()).into());
    };

    let token = generate_session_token();
    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(state.session_ttl)
        .ok_or_else(|| Error::Internal("session expiry out of range".to_string()))?;
    {
        let db = state.db.lock();
        db.purge_expired_sessions(now)?;
        db.create_session(user.id, &hash_token(&token), expires_at)?;
    }
    info!(user_id = user.id, "user logged in");

    Ok((
        [(header::SET_COOKIE, state.session_cookie(&token))],
        Json(json!({ "email": user.email, "id": user.id })),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers) {
        let removed = state.db.lock().delete_session(&hash_token(token))?;
        debug!(removed, "logout");
    }
    Ok((
        [(header::SET_COOKIE, state.expired_cookie())],
        Redirect::to("/"),
    )
        .into_response())
}

async fn user_data(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = match session_user(&state, &headers)? {
        Some(user) => json!({ "username": user.username, "email": user.email, "id": user.id }),
        None => json!({}),
    };
    Ok(Json(body))
}

async fn create_recipe(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<RecipeRequest>,
) -> Result<StatusCode, ApiError> {
    let pipeline = RecipePipeline::new(
        state.normalizer.as_ref(),
        &state.db,
        &state.db,
        &state.db,
    );
    pipeline.create(user.id, &req).await?;
    Ok(StatusCode::CREATED)
}

async fn delete_recipe(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    pipeline::delete_recipe(&state.db, id, user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_recipes(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, ApiError> {
    let recipes = state.db.lock().list_recipes()?;
    Ok(Json(recipes))
}

async fn get_recipe(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let Path(id) = path?;
    let detail = state.db.lock().get_recipe_detail(id)?;
    Ok(Json(detail))
}

async fn food_fact(State(state): State<AppState>) -> Result<Json<String>, ApiError> {
    Ok(Json(state.trivia.random_text(TriviaKind::Fact).await?))
}

async fn food_joke(State(state): State<AppState>) -> Result<Json<String>, ApiError> {
    Ok(Json(state.trivia.random_text(TriviaKind::Joke).await?))
}

async fn parse_ingredients(
    State(state): State<AppState>,
    Json(req): Json<ParseIngredientsRequest>,
) -> Result<Json<Vec<ParsedIngredient>>, ApiError> {
    let servings = validate_servings(req.servings)?;
    let lines: Vec<String> = req.ingredient_list.lines().map(str::to_string).collect();
    let lines = clean_ingredient_lines(&lines);
    if lines.is_empty() {
        return Err(ApiError::BadRequest(
            "ingredientList must not be empty".to_string(),
        ));
    }
    let parsed = state.normalizer.normalize(&lines, servings).await?;
    Ok(Json(parsed))
}

// --- Router ---

fn build_router(state: AppState, public_dir: Option<&FsPath>) -> Router {
    let protected = Router::new()
        .route("/api/recipe", post(create_recipe))
        .route("/api/recipes/{id}", delete(delete_recipe))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let mut app = Router::new()
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/logout", get(logout))
        .route("/api/user_data", get(user_data))
        .route("/api/recipes", get(list_recipes))
        .route("/api/recipes/{id}", get(get_recipe))
        .route("/food-fact", get(food_fact))
        .route("/food-joke", get(food_joke))
        .route("/parse-ingredients", post(parse_ingredients))
        .merge(protected);

    if let Some(dir) = public_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, options: ServeOptions) -> anyhow::Result<()> {
    let purged = db
        .purge_expired_sessions(Utc::now())
        .context("failed to purge expired sessions")?;
    if purged > 0 {
        info!(purged, "removed expired sessions");
    }

    let client = Arc::new(SpoonacularClient::new(
        &options.spoonacular_url,
        options.spoonacular_key,
        Duration::from_secs(options.spoonacular_timeout_secs),
    )?);
    if !client.has_api_key() {
        warn!(
            "no Spoonacular API key configured (--spoonacular-key or SPOONACULAR_API_KEY); \
             recipe creation and trivia routes will answer 502"
        );
    }

    let state = AppState {
        db: SharedDatabase::new(db),
        normalizer: client.clone(),
        trivia: client,
        secure_cookies: options.secure_cookies,
        session_ttl: chrono::Duration::hours(i64::from(options.session_ttl_hours)),
    };

    if let Some(ref dir) = options.public_dir {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "public directory does not exist");
        }
    }
    let app = build_router(state, options.public_dir.as_deref());

    let bind = &options.bind;
    let port = options.port;
    if bind != "127.0.0.1" && bind != "localhost" && !options.secure_cookies {
        warn!("listening on {bind} without --secure-cookies; session cookies travel in clear text");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use potluck_core::error::Result as CoreResult;
    use tower::ServiceExt;

    /// Local stand-in for Spoonacular. Parses "<amount> [unit] <name>".
    struct StubUpstream {
        fail: bool,
    }

    #[async_trait]
    impl IngredientNormalizer for StubUpstream {
        async fn normalize(
            &self,
            lines: &[String],
            _servings: u32,
        ) -> CoreResult<Vec<ParsedIngredient>> {
            if self.fail {
                return Err(Error::Upstream("timed out".to_string()));
            }
            Ok(lines
                .iter()
                .filter_map(|line| {
                    let words: Vec<&str> = line.split_whitespace().collect();
                    let amount: f64 = words.first()?.parse().ok()?;
                    let (unit, name) = match &words[1..] {
                        [] => return None,
                        [name] => (String::new(), (*name).to_string()),
                        [unit, rest @ ..] => ((*unit).to_string(), rest.join(" ")),
                    };
                    Some(ParsedIngredient { name, amount, unit })
                })
                .collect())
        }
    }

    #[async_trait]
    impl FoodTrivia for StubUpstream {
        async fn random_text(&self, kind: TriviaKind) -> CoreResult<String> {
            match kind {
                _ if self.fail => Err(Error::Upstream("bad status".to_string())),
                TriviaKind::Fact => Ok("Honey never spoils.".to_string()),
                TriviaKind::Joke => Ok("Lettuce celebrate.".to_string()),
            }
        }
    }

    fn test_state(fail_upstream: bool, secure_cookies: bool) -> AppState {
        let upstream = Arc::new(StubUpstream {
            fail: fail_upstream,
        });
        AppState {
            db: SharedDatabase::new(Database::open_in_memory().unwrap()),
            normalizer: upstream.clone(),
            trivia: upstream,
            secure_cookies,
            session_ttl: chrono::Duration::hours(24),
        }
    }

    fn test_app(fail_upstream: bool) -> (Router, SharedDatabase) {
        let state = test_state(fail_upstream, false);
        let db = state.db.clone();
        (build_router(state, None), db)
    }

    fn json_request(
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: &serde_json::Value,
    ) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    /// Sign up and log in; returns the `name=value` part of the session cookie.
    async fn login_as(app: &Router, name: &str) -> String {
        let creds = json!({
            "username": name,
            "email": format!("{name}@example.com"),
            "password": "correct horse",
        });
        let response = send(app, json_request("POST", "/api/signup", None, &creds)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let response = send(app, json_request("POST", "/api/login", None, &creds)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        cookie.split(';').next().unwrap().to_string()
    }

    fn recipe_body(title: &str, ingredients: &[&str]) -> serde_json::Value {
        json!({
            "title": title,
            "instructions": "Cook it.",
            "ingredients": ingredients,
            "servings": 4,
        })
    }

    #[tokio::test]
    async fn signup_redirects_to_login() {
        let (app, _) = test_app(false);
        let response = send(
            &app,
            json_request(
                "POST",
                "/api/signup",
                None,
                &json!({"username": "alice", "email": "alice@example.com", "password": "correct horse"}),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/api/login");
    }

    #[tokio::test]
    async fn signup_duplicate_email_conflicts() {
        let (app, _) = test_app(false);
        login_as(&app, "alice").await;

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/signup",
                None,
                &json!({"username": "other", "email": "ALICE@example.com", "password": "correct horse"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn signup_short_password_rejected() {
        let (app, db) = test_app(false);
        let response = send(
            &app,
            json_request(
                "POST",
                "/api/signup",
                None,
                &json!({"username": "alice", "email": "alice@example.com", "password": "short"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(db.lock().list_users().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_sets_http_only_cookie() {
        let (app, _) = test_app(false);
        let creds = json!({"username": "alice", "email": "alice@example.com", "password": "correct horse"});
        send(&app, json_request("POST", "/api/signup", None, &creds)).await;

        let response = send(&app, json_request("POST", "/api/login", None, &creds)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("potluck_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));

        let json = body_json(response).await;
        assert_eq!(json["email"], "alice@example.com");
        assert!(json["id"].is_i64());
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn login_wrong_password_returns_401() {
        let (app, _) = test_app(false);
        login_as(&app, "alice").await;

        for creds in [
            json!({"email": "alice@example.com", "password": "wrong password"}),
            json!({"email": "nobody@example.com", "password": "correct horse"}),
        ] {
            let response = send(&app, json_request("POST", "/api/login", None, &creds)).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().get(header::SET_COOKIE).is_none());
            let json = body_json(response).await;
            assert_eq!(json["error"], "Incorrect email or password");
        }
    }

    #[tokio::test]
    async fn login_with_unrepresentable_expiry_fails_cleanly() {
        let mut state = test_state(false, false);
        state.session_ttl = chrono::Duration::hours(i64::from(u32::MAX));
        let db = state.db.clone();
        let app = build_router(state, None);

        let creds = json!({"username": "alice", "email": "alice@example.com", "password": "correct horse"});
        let response = send(&app, json_request("POST", "/api/signup", None, &creds)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let response = send(&app, json_request("POST", "/api/login", None, &creds)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");

        assert!(db.lock().get_user_by_email("alice@example.com").unwrap().is_some());
    }

    #[test]
    fn secure_cookie_flag() {
        let state = test_state(false, true);
        assert!(state.session_cookie("abc").ends_with("; Secure"));
        assert!(state.expired_cookie().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn user_data_reflects_session() {
        let (app, _) = test_app(false);

        let response = send(&app, get_request("/api/user_data", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({}));

        let cookie = login_as(&app, "alice").await;
        let response = send(&app, get_request("/api/user_data", Some(&cookie))).await;
        let json = body_json(response).await;
        assert_eq!(json["username"], "alice");
        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn logout_invalidates_session() {
        let (app, _) = test_app(false);
        let cookie = login_as(&app, "alice").await;

        let response = send(&app, get_request("/logout", Some(&cookie))).await;
        assert!(response.status().is_redirection());
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
        let cleared = response.headers().get(header::SET_COOKIE).unwrap();
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));

        let response = send(
            &app,
            json_request("POST", "/api/recipe", Some(&cookie), &recipe_body("Soup", &["1 onion"])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let (app, db) = test_app(false);
        {
            let db = db.lock();
            let user = db
                .create_user(&NewUser {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    password_hash: "unused".to_string(),
                })
                .unwrap();
            db.create_session(
                user.id,
                &hash_token("stale"),
                Utc::now() - chrono::Duration::hours(1),
            )
            .unwrap();
        }

        let cookie = "potluck_session=stale";
        let response = send(&app, get_request("/api/user_data", Some(cookie))).await;
        assert_eq!(body_json(response).await, json!({}));

        let response = send(
            &app,
            json_request("POST", "/api/recipe", Some(cookie), &recipe_body("Soup", &["1 onion"])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_recipe_requires_session() {
        let (app, db) = test_app(false);
        let response = send(
            &app,
            json_request("POST", "/api/recipe", None, &recipe_body("Soup", &["1 onion"])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Not logged in");
        assert!(db.lock().list_recipes().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recipes_share_ingredients_across_users() {
        let (app, db) = test_app(false);
        let alice = login_as(&app, "alice").await;
        let bob = login_as(&app, "bob").await;

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/recipe",
                Some(&alice),
                &recipe_body("Soup", &["2 cups carrots", "1 onion"]),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
        {
            let db = db.lock();
            assert_eq!(db.list_recipes().unwrap().len(), 1);
            assert_eq!(db.list_ingredients().unwrap().len(), 2);
            assert_eq!(db.count_recipe_ingredients().unwrap(), 2);
        }

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/recipe",
                Some(&bob),
                &recipe_body("Onion Tart", &["1 onion"]),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let db = db.lock();
        assert_eq!(db.list_recipes().unwrap().len(), 2);
        assert_eq!(db.list_ingredients().unwrap().len(), 2);
        assert_eq!(db.count_recipe_ingredients().unwrap(), 3);
    }

    #[tokio::test]
    async fn upstream_failure_returns_502_and_writes_nothing() {
        let (app, db) = test_app(true);
        let alice = login_as(&app, "alice").await;

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/recipe",
                Some(&alice),
                &recipe_body("Soup", &["2 cups carrots"]),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let db = db.lock();
        assert!(db.list_recipes().unwrap().is_empty());
        assert!(db.list_ingredients().unwrap().is_empty());
        assert_eq!(db.count_recipe_ingredients().unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_ingredients_return_400() {
        let (app, _) = test_app(false);
        let alice = login_as(&app, "alice").await;

        let response = send(
            &app,
            json_request("POST", "/api/recipe", Some(&alice), &recipe_body("Soup", &["  "])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "at least one ingredient is required");
    }

    #[tokio::test]
    async fn delete_recipe_is_owner_scoped() {
        let (app, db) = test_app(false);
        let alice = login_as(&app, "alice").await;
        let bob = login_as(&app, "bob").await;

        send(
            &app,
            json_request(
                "POST",
                "/api/recipe",
                Some(&alice),
                &recipe_body("Soup", &["2 cups carrots", "1 onion"]),
            ),
        )
        .await;
        let id = db.lock().list_recipes().unwrap()[0].id;
        let uri = format!("/api/recipes/{id}");

        let response = send(&app, json_request("DELETE", &uri, Some(&bob), &json!({}))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(db.lock().list_recipes().unwrap().len(), 1);

        let response = send(&app, json_request("DELETE", &uri, Some(&alice), &json!({}))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, get_request(&uri, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let db = db.lock();
        assert!(db.list_recipes().unwrap().is_empty());
        assert_eq!(db.count_recipe_ingredients().unwrap(), 0);
        assert_eq!(db.list_ingredients().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn recipe_list_and_detail() {
        let (app, _) = test_app(false);
        let alice = login_as(&app, "alice").await;
        for title in ["Soup", "Stew"] {
            send(
                &app,
                json_request("POST", "/api/recipe", Some(&alice), &recipe_body(title, &["1 onion"])),
            )
            .await;
        }

        let response = send(&app, get_request("/api/recipes", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let list = body_json(response).await;
        assert_eq!(list[0]["title"], "Stew");
        assert_eq!(list[1]["title"], "Soup");

        let id = list[1]["id"].as_i64().unwrap();
        let response = send(&app, get_request(&format!("/api/recipes/{id}"), None)).await;
        let detail = body_json(response).await;
        assert_eq!(detail["owner_username"], "alice");
        assert_eq!(detail["ingredients"][0]["ingredient_name"], "onion");
    }

    #[tokio::test]
    async fn trivia_routes_return_text() {
        let (app, _) = test_app(false);
        let response = send(&app, get_request("/food-fact", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!("Honey never spoils."));

        let response = send(&app, get_request("/food-joke", None)).await;
        assert_eq!(body_json(response).await, json!("Lettuce celebrate."));
    }

    #[tokio::test]
    async fn trivia_upstream_failure_returns_502() {
        let (app, _) = test_app(true);
        let response = send(&app, get_request("/food-fact", None)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("upstream service error"));
    }

    #[tokio::test]
    async fn parse_ingredients_proxies_normalizer() {
        let (app, _) = test_app(false);
        let response = send(
            &app,
            json_request(
                "POST",
                "/parse-ingredients",
                None,
                &json!({"ingredientList": "2 cups carrots\n\n1 onion", "servings": 2}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json[0]["name"], "carrots");
        assert_eq!(json[0]["unit"], "cups");
        assert_eq!(json[1]["name"], "onion");

        let response = send(
            &app,
            json_request("POST", "/parse-ingredients", None, &json!({"ingredientList": " "})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let (app, _) = test_app(false);
        let response = send(&app, get_request("/api/recipes", None)).await;

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let (app, _) = test_app(false);
        let response = send(
            &app,
            json_request("DELETE", "/api/recipes/1", None, &json!({})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let (app, _) = test_app(false);

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/signup")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn serves_public_dir_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<h1>potluck</h1>").unwrap();
        let app = build_router(test_state(false, false), Some(tmp.path()));

        let response = send(&app, get_request("/index.html", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<h1>potluck</h1>");

        let response = send(&app, get_request("/api/recipes", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_numeric_recipe_id_returns_json_400() {
        let (app, _) = test_app(false);
        let alice = login_as(&app, "alice").await;

        let response = send(&app, json_request("DELETE", "/api/recipes/abc", Some(&alice), &json!({}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].is_string());

        let response = send(&app, get_request("/api/recipes/abc", None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn slow_normalizer_returns_502_and_writes_nothing() {
        let fake = Router::new().route(
            "/recipes/parseIngredients",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!([]))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, fake).await.unwrap();
        });

        let client = Arc::new(
            SpoonacularClient::new(
                &format!("http://{addr}"),
                Some("secret".to_string()),
                Duration::from_millis(300),
            )
            .unwrap(),
        );
        let mut state = test_state(false, false);
        state.normalizer = client;
        let db = state.db.clone();
        let app = build_router(state, None);
        let alice = login_as(&app, "alice").await;

        let response = send(
            &app,
            json_request("POST", "/api/recipe", Some(&alice), &recipe_body("Soup", &["1 onion"])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("timed out"));

        let db = db.lock();
        assert!(db.list_recipes().unwrap().is_empty());
        assert!(db.list_ingredients().unwrap().is_empty());
        assert_eq!(db.count_recipe_ingredients().unwrap(), 0);
    }

    #[tokio::test]
    async fn internal_core_errors_map_to_500() {
        let error = ApiError::from(Error::PasswordHash("invalid salt".to_string()));
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let error = ApiError::from(Error::Auth("nope".to_string()));
        assert_eq!(error.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::from(Error::Internal(
            "secret database path /home/user/.potluck/db".to_string(),
        ));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn session_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(session_token(&headers).is_none());

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; potluck_session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("potluck_session="));
        assert!(session_token(&headers).is_none());
    }
}
