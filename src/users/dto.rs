use serde::{Deserialize, Serialize};

/// Request body for `POST /users/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub password: String,
}

/// Response for a successful registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub username: String,
    pub email: String,
}

/// Request body for `POST /users/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response for a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
