use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// User record as stored. The password hash never leaves the server:
/// it is skipped when the record is serialized to JSON.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub fullname: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    pub auth_provider: String,
    pub github_id: Option<i64>,
    pub avatar_url: Option<String>,
}

impl User {
    pub async fn create(
        db: &PgPool,
        username: &str,
        fullname: &str,
        email: &str,
        hashed_password: &str,
    ) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, fullname, email, hashed_password, auth_provider)
            VALUES ($1, $2, $3, $4, 'local')
            RETURNING id, username, fullname, email, hashed_password,
                      auth_provider, github_id, avatar_url
            "#,
        )
        .bind(username)
        .bind(fullname)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, fullname, email, hashed_password,
                   auth_provider, github_id, avatar_url
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: i32) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, fullname, email, hashed_password,
                   auth_provider, github_id, avatar_url
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn list_all(db: &PgPool) -> sqlx::Result<Vec<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, fullname, email, hashed_password,
                   auth_provider, github_id, avatar_url
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(db)
        .await
    }

    /// Returns whether a row was actually deleted.
    pub async fn delete_by_id(db: &PgPool, id: i32) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 7,
            username: "alice".into(),
            fullname: "Alice Example".into(),
            email: "alice@example.com".into(),
            hashed_password: "$argon2id$v=19$m=19456,t=2,p=1$abc$def".into(),
            auth_provider: "local".into(),
            github_id: None,
            avatar_url: None,
        }
    }

    // The list endpoint serializes User rows directly, so the skip
    // attribute is what keeps hashes out of responses.
    #[test]
    fn serialized_user_has_no_password_hash() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("hashed_password").is_none());
        assert_eq!(json["username"], "alice");
        assert_eq!(json["auth_provider"], "local");
        assert!(json["github_id"].is_null());
    }
}
