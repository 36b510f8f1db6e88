use crate::otp::CodeStore;
use crate::{config::Config, db::Db, errors::ApiError, validate};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct SendCodeReq {
    pub phone: String,
}

#[derive(Serialize)]
pub struct SendCodeResp {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub async fn send_code(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    codes: web::Data<CodeStore>,
    body: web::Json<SendCodeReq>,
) -> Result<HttpResponse, ApiError> {
    if !validate::is_valid_phone(&body.phone) {
        return Err(ApiError::BadRequest("invalid phone number".into()));
    }

    let existing = sqlx::query("SELECT id FROM users WHERE phone = ?")
        .bind(&body.phone)
        .fetch_optional(&db.0)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("phone already registered".into()));
    }

    let code = codes.issue(&body.phone)?;

    // No SMS provider wired up here; the code goes to the log, and into the
    // response when expose_codes is on (dev/test only).
    log::info!("verification code for {}: {}", body.phone, code);

    Ok(HttpResponse::Ok().json(SendCodeResp {
        sent: true,
        code: cfg.expose_codes.then_some(code),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web::Data, App};

    fn test_cfg() -> Config {
        Config {
            jwt_secret: Some("test-secret".to_string()),
            expose_codes: true,
            ..Config::default()
        }
    }

    macro_rules! sms_app {
        ($cfg:expr, $db:expr, $codes:expr) => {
            test::init_service(
                App::new()
                    .app_data($cfg.clone())
                    .app_data($db.clone())
                    .app_data($codes.clone())
                    .route("/api/sms/send-code", web::post().to(send_code)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn send_code_returns_code_in_dev_mode() {
        let cfg = Data::new(test_cfg());
        let db = Data::new(Db::connect_in_memory().await);
        let codes = Data::new(CodeStore::new());
        let app = sms_app!(cfg, db, codes);

        let req = test::TestRequest::post()
            .uri("/api/sms/send-code")
            .set_json(serde_json::json!({"phone": "13800138000"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["sent"], true);
        assert_eq!(body["code"].as_str().unwrap().len(), 6);
    }

    #[actix_web::test]
    async fn second_send_within_cooldown_rejected() {
        let cfg = Data::new(test_cfg());
        let db = Data::new(Db::connect_in_memory().await);
        let codes = Data::new(CodeStore::new());
        let app = sms_app!(cfg, db, codes);

        let body = serde_json::json!({"phone": "13800138000"});
        let req = test::TestRequest::post()
            .uri("/api/sms/send-code")
            .set_json(&body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/sms/send-code")
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let err: serde_json::Value = test::read_body_json(resp).await;
        // message carries the remaining seconds
        assert!(err["error"].as_str().unwrap().contains("retry in"));
    }

    #[actix_web::test]
    async fn registered_phone_cannot_request_code() {
        let cfg = Data::new(test_cfg());
        let db = Data::new(Db::connect_in_memory().await);
        let codes = Data::new(CodeStore::new());
        let app = sms_app!(cfg, db, codes);

        sqlx::query(
            "INSERT INTO users(id, phone, password_hash, username, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind("u1")
        .bind("13800138000")
        .bind("hash")
        .bind("user8000")
        .bind(chrono::Utc::now())
        .execute(&db.0)
        .await
        .unwrap();

        let req = test::TestRequest::post()
            .uri("/api/sms/send-code")
            .set_json(serde_json::json!({"phone": "13800138000"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CONFLICT
        );
    }

    #[actix_web::test]
    async fn malformed_phone_rejected() {
        let cfg = Data::new(test_cfg());
        let db = Data::new(Db::connect_in_memory().await);
        let codes = Data::new(CodeStore::new());
        let app = sms_app!(cfg, db, codes);

        let req = test::TestRequest::post()
            .uri("/api/sms/send-code")
            .set_json(serde_json::json!({"phone": "12345"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }
}
