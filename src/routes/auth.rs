use crate::models::user::User;
use crate::otp::{CodeCheck, CodeStore};
use crate::{auth, config::Config, db::Db, errors::ApiError, validate};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Registration channel is an explicit discriminant in the body
/// (`{"channel": "email", ...}` or `{"channel": "phone", ...}`), never
/// inferred from which identity field happens to be present.
#[derive(Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum RegisterReq {
    Email {
        email: String,
        password: String,
        username: Option<String>,
    },
    Phone {
        phone: String,
        code: String,
        password: String,
        password_confirm: String,
        username: Option<String>,
    },
}

#[derive(Serialize)]
pub struct AuthResp {
    pub token: String,
    pub user: User,
}

pub async fn register(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    codes: web::Data<CodeStore>,
    body: web::Json<RegisterReq>,
) -> Result<HttpResponse, ApiError> {
    let (email, phone, password, username) = match body.into_inner() {
        RegisterReq::Email {
            email,
            password,
            username,
        } => {
            if !validate::is_valid_email(&email) {
                return Err(ApiError::BadRequest("invalid email address".into()));
            }
            if password.len() < auth::MIN_PASSWORD_LEN {
                return Err(ApiError::BadRequest(
                    "password must be at least 6 characters".into(),
                ));
            }
            let username =
                username.unwrap_or_else(|| validate::default_username_for_email(&email));
            (Some(email), None, password, username)
        }
        RegisterReq::Phone {
            phone,
            code,
            password,
            password_confirm,
            username,
        } => {
            if !validate::is_valid_phone(&phone) {
                return Err(ApiError::BadRequest("invalid phone number".into()));
            }
            if password.len() < auth::MIN_PASSWORD_LEN {
                return Err(ApiError::BadRequest(
                    "password must be at least 6 characters".into(),
                ));
            }
            if password != password_confirm {
                return Err(ApiError::BadRequest("passwords do not match".into()));
            }
            match codes.verify(&phone, &code)? {
                CodeCheck::Valid => {}
                CodeCheck::Mismatch => {
                    return Err(ApiError::BadRequest("incorrect verification code".into()))
                }
                CodeCheck::NotFoundOrExpired => {
                    return Err(ApiError::BadRequest(
                        "verification code expired or not issued".into(),
                    ))
                }
                CodeCheck::TooManyAttempts => {
                    return Err(ApiError::BadRequest(
                        "too many failed attempts, request a new code".into(),
                    ))
                }
            }
            let username =
                username.unwrap_or_else(|| validate::default_username_for_phone(&phone));
            (None, Some(phone), password, username)
        }
    };

    // Argon2 is CPU-bound; keep it off the async workers.
    let hash = web::block(move || auth::hash_password(&password))
        .await
        .map_err(|_| ApiError::Internal)??;

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        phone,
        username,
        created_at: chrono::Utc::now(),
    };

    // Uniqueness rides on the UNIQUE constraints so concurrent registrations
    // for the same identity cannot both win.
    let res = sqlx::query(
        "INSERT INTO users(id, email, phone, password_hash, username, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&hash)
    .bind(&user.username)
    .bind(user.created_at)
    .execute(&db.0)
    .await;

    if let Err(e) = res {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.message().contains("UNIQUE") {
                return Err(ApiError::Conflict("email or phone already registered".into()));
            }
        }
        return Err(e.into());
    }

    let identity = user.email.clone().or_else(|| user.phone.clone()).unwrap_or_default();
    let token = auth::create_token(&user.id, &identity, &cfg)?;
    Ok(HttpResponse::Created().json(AuthResp { token, user }))
}

#[derive(Deserialize)]
pub struct LoginReq {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: String,
}

pub async fn login(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    body: web::Json<LoginReq>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    // Shorter than the minimum can never match a stored hash; skip the
    // argon2 work. Same error as any other failed login.
    if body.password.len() < auth::MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidCredentials);
    }
    let (query, identity) = match (&body.phone, &body.email) {
        (Some(p), _) => ("SELECT * FROM users WHERE phone = ?", p.clone()),
        (None, Some(e)) => ("SELECT * FROM users WHERE email = ?", e.clone()),
        (None, None) => return Err(ApiError::BadRequest("email or phone required".into())),
    };

    let row = sqlx::query(query)
        .bind(&identity)
        .fetch_optional(&db.0)
        .await?;
    // Unknown identity and wrong password must be indistinguishable.
    let row = row.ok_or(ApiError::InvalidCredentials)?;
    let hash: String = row.get("password_hash");
    let user = User::from_row(&row);

    let password = body.password;
    let valid = web::block(move || auth::verify_password(&hash, &password))
        .await
        .map_err(|_| ApiError::Internal)?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    let token = auth::create_token(&user.id, &identity, &cfg)?;
    Ok(HttpResponse::Ok().json(AuthResp { token, user }))
}

pub async fn me(db: web::Data<Db>, user: auth::AuthUser) -> Result<HttpResponse, ApiError> {
    let row = sqlx::query("SELECT id, email, phone, username, created_at FROM users WHERE id = ?")
        .bind(&user.user_id)
        .fetch_optional(&db.0)
        .await?;
    let row = row.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(User::from_row(&row)))
}
