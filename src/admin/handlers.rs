use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use crate::http::server::AppState;
use crate::http::HandlerError;
use crate::store::{Role, StoreError, User, UserStore};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    /// Whether an administrator account exists.
    pub initialized: bool,
    pub watchdog_armed: bool,
}

/// A user as exposed over the API; never carries credentials.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    pub id: u64,
    pub username: String,
    pub role: Role,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminInitPayload {
    pub username: String,
    pub password: String,
}

impl AdminInitPayload {
    pub fn validate(&self, min_password_length: usize) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("Invalid username".to_string());
        }
        if self.password.chars().count() < min_password_length {
            return Err(format!(
                "Password must be at least {} characters long",
                min_password_length
            ));
        }
        Ok(())
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let initialized = match state.users.has_administrator() {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(error = %e, "Status: unable to query user store");
            false
        }
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        initialized,
        watchdog_armed: state.watchdog.is_armed(),
    })
}

/// 204 when an administrator exists, 404 otherwise.
pub async fn admin_check(State(state): State<AppState>) -> Result<StatusCode, HandlerError> {
    match state.users.has_administrator() {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(HandlerError::not_found(
            "No administrator account found inside the database",
        )),
        Err(e) => Err(HandlerError::internal("Unable to retrieve users from the database").with_details(e)),
    }
}

/// Create the first administrator account and disarm the startup watchdog.
pub async fn admin_init(
    State(state): State<AppState>,
    payload: Result<Json<AdminInitPayload>, JsonRejection>,
) -> Result<Json<UserView>, HandlerError> {
    let Json(payload) =
        payload.map_err(|e| HandlerError::bad_request("Invalid request payload").with_details(e))?;
    payload
        .validate(state.security.min_password_length)
        .map_err(|e| HandlerError::bad_request("Invalid request payload").with_details(e))?;

    let _guard = state.admin_init_lock.lock().await;

    let initialized = state
        .users
        .has_administrator()
        .map_err(|e| HandlerError::internal("Unable to retrieve users from the database").with_details(e))?;
    if initialized {
        return Err(HandlerError::conflict("Unable to create administrator user")
            .with_details("An administrator user already exists"));
    }

    let users = state.users.clone();
    let username = payload.username.trim().to_string();
    let user = tokio::task::spawn_blocking(move || users.create_user(&username, &payload.password, Role::Administrator))
        .await
        .map_err(|e| HandlerError::internal("User creation task failed").with_details(e))?
        .map_err(|e| {
            if matches!(e, StoreError::DuplicateUsername(_)) {
                HandlerError::conflict("Unable to create administrator user").with_details(e)
            } else {
                HandlerError::internal("Unable to persist user inside the database").with_details(e)
            }
        })?;

    state.watchdog.stop();
    tracing::info!(user_id = user.id, username = %user.username, "Initial administrator account created");

    let users = state.users.clone();
    match tokio::task::spawn_blocking(move || users.save_to_file()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Failed to persist user store, will retry on shutdown"),
        Err(e) => tracing::error!(error = %e, "User store save task failed"),
    }

    Ok(Json(UserView::from(&user)))
}

pub async fn list_users(State(state): State<AppState>) -> Json<Vec<UserView>> {
    Json(state.users.list_users().iter().map(UserView::from).collect())
}
