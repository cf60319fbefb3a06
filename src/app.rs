use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::error::DirectoryError;
use crate::interpreter::{AppState, Interpreter, Turn};
use crate::registry::AppletRegistry;
use crate::store::{AppletStore, FileAppletStore};
use crate::users::{CurrentUser, NewUser, ProfileUpdate, UserDirectory};

/// Header carrying the username vouched for by the upstream authenticator
///
/// The server trusts this header as-is. It must only be reachable through a
/// proxy that authenticates the caller and overwrites the header.
pub const USER_HEADER: &str = "x-zendo-user";

/// Everything the request handlers share
pub struct AppContext {
    pub registry: AppletRegistry,
    pub store: Box<dyn AppletStore>,
    pub users: UserDirectory,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    state: AppState,
}

#[derive(Serialize)]
struct ChatResponse {
    /// False when the message was ignored and `state` is unchanged
    handled: bool,
    state: AppState,
    /// Display lines, newest first
    lines: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct AppletInfo {
    name: &'static str,
    description: &'static str,
    aliases: &'static [&'static str],
}

/// Build the router over an existing context
///
/// # Routes
/// * `POST /api/chat` - run one chat turn as the user named in [`USER_HEADER`]
/// * `GET /api/applets` - list the registered applet variants
/// * `POST /api/users` - register a user profile
/// * `PUT /api/profile` - change the calling user's profile
///
/// # Arguments
/// * `context` - Registry, store and user directory shared by all handlers
///
/// # Returns
/// * `Router` - Ready to be served or driven directly in tests
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/applets", get(get_applets))
        .route("/api/users", post(post_user))
        .route("/api/profile", put(put_profile))
        .with_state(context)
}

/// Start the web server
///
/// Creates the database files if needed, loads the store and the user
/// directory from `config.database_dir`, and serves until the process stops.
///
/// # Arguments
/// * `config` - Database location and bind address
///
/// # Errors
/// * Returns an error if the database files cannot be created or parsed
/// * Returns an error if the address cannot be bound
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.init_database()?;

    let context = Arc::new(AppContext {
        registry: AppletRegistry::with_builtins(),
        store: Box::new(FileAppletStore::open(config.applets_path())?),
        users: UserDirectory::open(config.users_path())?,
    });

    let app = router(context);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);
    warn!(
        "Identity is taken from the {} header without verification; serve behind an authenticating proxy",
        USER_HEADER
    );
    axum::serve(listener, app).await?;

    Ok(())
}

async fn post_chat(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let user = header_user(&context, &headers);
    if let Some(user) = user.as_ref().filter(|u| u.is_authenticated) {
        if let Err(e) = context.users.record_login(user.id) {
            warn!("could not record activity for user {}: {}", user.id, e);
        }
    }

    let mut state = request.state;
    let interpreter = Interpreter::new(&context.registry, context.store.as_ref());
    let turn = interpreter.handle(user.as_ref(), &mut state, &request.message);

    Json(ChatResponse {
        handled: turn == Turn::Handled,
        lines: state.history.render_lines(),
        state,
    })
}

async fn get_applets(State(context): State<Arc<AppContext>>) -> impl IntoResponse {
    let applets: Vec<AppletInfo> = context
        .registry
        .iter()
        .map(|kind| AppletInfo {
            name: kind.name,
            description: kind.description,
            aliases: kind.aliases,
        })
        .collect();

    Json(applets)
}

async fn post_user(
    State(context): State<Arc<AppContext>>,
    Json(new_user): Json<NewUser>,
) -> Response {
    match context.users.add_user(new_user) {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => directory_error(e),
    }
}

async fn put_profile(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    let Some(user) = header_user(&context, &headers).filter(|u| u.is_authenticated) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "Unauthorized".to_string(),
            }),
        )
            .into_response();
    };

    match context.users.update_profile(user.id, update) {
        Ok(user) => Json(user).into_response(),
        Err(e) => directory_error(e),
    }
}

fn header_user(context: &AppContext, headers: &HeaderMap) -> Option<CurrentUser> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|username| context.users.current_user(username.trim()))
}

fn directory_error(e: DirectoryError) -> Response {
    let status = match e {
        DirectoryError::MissingField | DirectoryError::InvalidEmail => StatusCode::BAD_REQUEST,
        DirectoryError::UsernameTaken | DirectoryError::EmailTaken => StatusCode::CONFLICT,
        DirectoryError::UserNotFound => StatusCode::NOT_FOUND,
        DirectoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
        .into_response()
}
