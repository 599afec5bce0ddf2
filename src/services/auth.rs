use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Role, User};

/// The caller identity resolved from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Users act on their own records, admins on anyone's.
    pub fn can_act_on(&self, owner_id: &str) -> Result<(), AppError> {
        if self.is_admin() || self.id == owner_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "not permitted to act on another user's record".to_string(),
            ))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn issue_token(user: &User, config: &AppConfig) -> anyhow::Result<String> {
    let exp = (Utc::now() + chrono::Duration::hours(config.token_ttl_hours)).timestamp();
    let claims = Claims {
        sub: user.id.clone(),
        role: user.role.as_str().to_string(),
        exp,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_token(token: &str, config: &AppConfig) -> Result<AuthUser, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let role = Role::parse(&data.claims.role).ok_or(AppError::Unauthorized)?;
    Ok(AuthUser {
        id: data.claims.sub,
        role,
    })
}

/// Resolves the caller from the Authorization header.
pub fn authenticate(headers: &HeaderMap, config: &AppConfig) -> Result<AuthUser, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }
    decode_token(token, config)
}

pub fn require_admin(actor: &AuthUser) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("admin role required".to_string()))
    }
}

pub fn register(
    conn: &Connection,
    name: &str,
    email: &str,
    password: &str,
    phone: Option<String>,
) -> Result<User, AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("invalid email address".to_string()));
    }
    if password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    if queries::get_user_by_email(conn, email)?.is_some() {
        return Err(AppError::Conflict("email is already registered".to_string()));
    }

    let now = Utc::now().naive_utc();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        role: Role::User,
        phone,
        created_at: now,
        updated_at: now,
    };
    queries::insert_user(conn, &user)?;
    Ok(user)
}

pub fn login(conn: &Connection, email: &str, password: &str) -> Result<User, AppError> {
    let user = queries::get_user_by_email(conn, email)?.ok_or(AppError::Unauthorized)?;
    if !verify_password(password, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }
    Ok(user)
}

/// Creates the bootstrap admin account on startup when configured and not
/// already present.
pub fn ensure_bootstrap_admin(conn: &Connection, config: &AppConfig) -> anyhow::Result<()> {
    if config.admin_email.is_empty() || config.admin_password.is_empty() {
        return Ok(());
    }
    if queries::get_user_by_email(conn, &config.admin_email)?.is_some() {
        return Ok(());
    }

    let now = Utc::now().naive_utc();
    let admin = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: "Administrator".to_string(),
        email: config.admin_email.clone(),
        password_hash: hash_password(&config.admin_password)?,
        role: Role::Admin,
        phone: None,
        created_at: now,
        updated_at: now,
    };
    queries::insert_user(conn, &admin)?;
    tracing::info!(email = %config.admin_email, "created bootstrap admin user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn test_config() -> AppConfig {
        AppConfig {
            port: 3000,
            database_url: ":memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 24,
            booking_grace_minutes: 5,
            expiry_interval_secs: 60,
            admin_email: String::new(),
            admin_password: String::new(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_token_roundtrip() {
        let conn = setup_db();
        let config = test_config();
        let user = register(&conn, "Asha", "asha@example.com", "password123", None).unwrap();

        let token = issue_token(&user, &config).unwrap();
        let actor = decode_token(&token, &config).unwrap();
        assert_eq!(actor.id, user.id);
        assert_eq!(actor.role, Role::User);
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let conn = setup_db();
        let config = test_config();
        let user = register(&conn, "Asha", "asha@example.com", "password123", None).unwrap();
        let token = issue_token(&user, &config).unwrap();

        let mut other = test_config();
        other.jwt_secret = "different-secret".to_string();
        assert!(matches!(
            decode_token(&token, &other),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_register_duplicate_email() {
        let conn = setup_db();
        register(&conn, "Asha", "asha@example.com", "password123", None).unwrap();
        let err = register(&conn, "Other", "asha@example.com", "password456", None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_register_validates_input() {
        let conn = setup_db();
        assert!(register(&conn, "", "a@b.com", "password123", None).is_err());
        assert!(register(&conn, "A", "not-an-email", "password123", None).is_err());
        assert!(register(&conn, "A", "a@b.com", "short", None).is_err());
    }

    #[test]
    fn test_login() {
        let conn = setup_db();
        register(&conn, "Asha", "asha@example.com", "password123", None).unwrap();

        assert!(login(&conn, "asha@example.com", "password123").is_ok());
        assert!(matches!(
            login(&conn, "asha@example.com", "nope-nope-nope"),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            login(&conn, "ghost@example.com", "password123"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_authz_scope() {
        let user = AuthUser {
            id: "u1".to_string(),
            role: Role::User,
        };
        let admin = AuthUser {
            id: "a1".to_string(),
            role: Role::Admin,
        };
        assert!(user.can_act_on("u1").is_ok());
        assert!(user.can_act_on("u2").is_err());
        assert!(admin.can_act_on("u2").is_ok());
    }
}
