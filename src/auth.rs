use crate::config::Config;
use crate::errors::ApiError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use futures_util::future::{err, ok, Ready};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Tokens are valid for a fixed 7 days from issuance. There is no revocation
/// list; rotating `jwt_secret` invalidates everything outstanding.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// Callers must reject plaintexts shorter than this before calling
/// [`hash_password`] — the hasher itself accepts any input, the length rule
/// is registration/login policy enforced up front to avoid wasted work.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    /// The email or phone the user authenticated with.
    pub identity: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    // PHC string embeds salt and cost, so verification needs nothing else.
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|_| ApiError::Internal)?
        .to_string())
}

pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(user_id: &str, identity: &str, cfg: &Config) -> Result<String, ApiError> {
    create_token_with_ttl(user_id, identity, Duration::days(TOKEN_TTL_DAYS), cfg)
}

fn create_token_with_ttl(
    user_id: &str,
    identity: &str,
    ttl: Duration,
    cfg: &Config,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        identity: identity.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret_bytes()),
    )
    .map_err(|_| ApiError::Internal)
}

/// Fails uniformly with `InvalidToken` for bad signature, malformed payload
/// and expiry alike, so a caller cannot tell forgery from staleness.
pub fn verify_token(token: &str, cfg: &Config) -> Result<Claims, ApiError> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.leeway = 0; // expiry is exact
    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(cfg.jwt_secret_bytes()), &v)
        .map(|data| data.claims)
        .map_err(|_| ApiError::InvalidToken)
}

/// Access gate: extracting this from a request verifies the bearer token
/// before the handler body runs. Downstream ownership checks key off
/// `user_id`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let cfg = match req.app_data::<actix_web::web::Data<Config>>() {
            Some(c) => c,
            None => return err(ApiError::Internal),
        };
        let header = match req.headers().get(actix_web::http::header::AUTHORIZATION) {
            Some(h) => h,
            None => return err(ApiError::MissingToken),
        };
        let token = header.to_str().ok().and_then(|s| s.strip_prefix("Bearer "));
        match token {
            Some(t) => match verify_token(t, cfg) {
                Ok(claims) => ok(AuthUser {
                    user_id: claims.sub,
                }),
                Err(_) => err(ApiError::InvalidToken),
            },
            None => err(ApiError::InvalidToken),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> Config {
        Config {
            jwt_secret: Some("test-secret".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "hunter22"));
        assert!(!verify_password(&hash, "hunter23"));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("not-a-phc-string", "hunter22"));
    }

    #[test]
    fn token_roundtrip_recovers_claims() {
        let cfg = test_cfg();
        let token = create_token("user-1", "a@b.com", &cfg).unwrap();
        let claims = verify_token(&token, &cfg).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.identity, "a@b.com");
        assert_eq!(claims.exp - claims.iat, (TOKEN_TTL_DAYS * 86400) as usize);
    }

    #[test]
    fn expired_token_rejected() {
        let cfg = test_cfg();
        let token =
            create_token_with_ttl("user-1", "a@b.com", Duration::seconds(-120), &cfg).unwrap();
        assert!(matches!(
            verify_token(&token, &cfg),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn token_just_before_expiry_accepted() {
        let cfg = test_cfg();
        let token =
            create_token_with_ttl("user-1", "a@b.com", Duration::seconds(1), &cfg).unwrap();
        assert!(verify_token(&token, &cfg).is_ok());
    }

    #[test]
    fn wrong_secret_rejected() {
        let cfg = test_cfg();
        let token = create_token("user-1", "a@b.com", &cfg).unwrap();
        let other = Config {
            jwt_secret: Some("other-secret".to_string()),
            ..Config::default()
        };
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn tampered_token_rejected() {
        let cfg = test_cfg();
        let mut token = create_token("user-1", "a@b.com", &cfg).unwrap();
        token.push('x');
        assert!(verify_token(&token, &cfg).is_err());
        assert!(verify_token("definitely.not.ajwt", &cfg).is_err());
    }
}
