use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{extractors::CurrentUser, jwt::TokenKeys, password},
    error::ApiError,
    state::AppState,
    users::{
        dto::{LoginRequest, LoginResponse, MessageResponse, RegisterRequest, RegisterResponse},
        repo::User,
    },
};

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if User::find_by_username(&state.db, &payload.username)
        .await?
        .is_some()
    {
        warn!("username already taken");
        return Err(ApiError::Conflict("Username already exists".into()));
    }

    let hash = password::hash_password(&payload.password)?;

    // The pre-check above is not atomic with the insert; the UNIQUE
    // constraint catches a racing duplicate and gets the same 400.
    let user = match User::create(
        &state.db,
        &payload.username,
        &payload.fullname,
        &payload.email,
        &hash,
    )
    .await
    {
        Ok(u) => u,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            warn!("username taken by concurrent registration");
            return Err(ApiError::Conflict("Username already exists".into()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: user.username,
            email: user.email,
        }),
    ))
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = match User::find_by_username(&state.db, &payload.username).await? {
        Some(u) => u,
        None => {
            warn!("login for unknown username");
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !password::verify_password(&payload.password, &user.hashed_password)? {
        warn!(user_id = user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = TokenKeys::from_ref(&state);
    let access_token = keys.sign(&user.username)?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        username: user.username,
        access_token,
    }))
}

#[instrument(skip(state, _current))]
pub async fn list_users(
    State(state): State<AppState>,
    _current: CurrentUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = User::list_all(&state.db).await?;
    Ok(Json(users))
}

// No auth gate here, matching the public API this service exposes.
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !User::delete_by_id(&state.db, id).await? {
        warn!(id, "delete of unknown user id");
        return Err(ApiError::NotFound("User not found".into()));
    }

    info!(id, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully".into(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request},
    };
    use http_body_util::BodyExt;
    use jsonwebtoken::Algorithm;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{AppConfig, JwtConfig};

    async fn live_state() -> AppState {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
        let db = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("connect to test database");
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("apply migrations");
        let config = Arc::new(AppConfig {
            database_url,
            jwt: JwtConfig {
                secret: "handler-test-secret".into(),
                algorithm: Algorithm::HS256,
                ttl_minutes: 30,
            },
        });
        AppState { db, config }
    }

    fn unique_username(prefix: &str) -> String {
        format!(
            "{prefix}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    async fn register_one(state: &AppState, username: &str) -> i32 {
        let (status, Json(resp)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                username: username.into(),
                fullname: "Test User".into(),
                email: format!("{username}@example.com"),
                password: "a-fine-password".into(),
            }),
        )
        .await
        .expect("first registration succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(resp.username, username);
        User::find_by_username(&state.db, username)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[tokio::test]
    #[ignore = "requires a running postgres at DATABASE_URL"]
    async fn duplicate_registration_is_a_conflict() {
        let state = live_state().await;
        let username = unique_username("dup");
        register_one(&state, &username).await;

        let err = register(
            State(state.clone()),
            Json(RegisterRequest {
                username: username.clone(),
                fullname: "Someone Else".into(),
                email: "other@example.com".into(),
                password: "another-password".into(),
            }),
        )
        .await
        .expect_err("second registration must fail");
        assert!(matches!(err, ApiError::Conflict(_)));

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = $1")
                .bind(&username)
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore = "requires a running postgres at DATABASE_URL"]
    async fn login_with_wrong_password_is_rejected() {
        let state = live_state().await;
        let username = unique_username("login");
        register_one(&state, &username).await;

        let err = login(
            State(state.clone()),
            Json(LoginRequest {
                username: username.clone(),
                password: "not-the-password".into(),
            }),
        )
        .await
        .expect_err("wrong password must fail");
        assert!(matches!(err, ApiError::InvalidCredentials));

        let Json(resp) = login(
            State(state.clone()),
            Json(LoginRequest {
                username: username.clone(),
                password: "a-fine-password".into(),
            }),
        )
        .await
        .expect("correct password succeeds");
        assert_eq!(resp.message, "Login successful");
        assert!(!resp.access_token.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a running postgres at DATABASE_URL"]
    async fn list_with_valid_token_includes_new_user() {
        let state = live_state().await;
        let username = unique_username("list");
        register_one(&state, &username).await;

        let Json(login_resp) = login(
            State(state.clone()),
            Json(LoginRequest {
                username: username.clone(),
                password: "a-fine-password".into(),
            }),
        )
        .await
        .expect("login succeeds");

        let app = crate::app::build_app(state.clone());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/users/")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", login_resp.access_token),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let users: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let listed = users
            .as_array()
            .expect("response is an array")
            .iter()
            .find(|u| u["username"] == username.as_str())
            .expect("just-registered user is listed");
        assert!(listed.get("hashed_password").is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running postgres at DATABASE_URL"]
    async fn delete_removes_exactly_the_named_user() {
        let state = live_state().await;
        let username = unique_username("del");
        let id = register_one(&state, &username).await;

        let err = delete_user(State(state.clone()), Path(id + 1_000_000))
            .await
            .expect_err("unknown id must be a 404");
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(User::find_by_id(&state.db, id).await.unwrap().is_some());

        let Json(resp) = delete_user(State(state.clone()), Path(id))
            .await
            .expect("existing id deletes");
        assert_eq!(resp.message, "User deleted successfully");
        assert!(User::find_by_id(&state.db, id).await.unwrap().is_none());
    }
}
