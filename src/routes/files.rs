use crate::auth::AuthUser;
use crate::models::file::FileMeta;
use crate::storage::FileStore;
use crate::{config::Config, db::Db, errors::ApiError};
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use sanitize_filename::sanitize;
use sqlx::Row;
use std::path::Path;

pub async fn upload_file(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    user: AuthUser,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut saved: Option<FileMeta> = None;
    while let Some(field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart".into()))?
    {
        saved = Some(save_upload(&cfg, &db, &store, &user.user_id, field).await?);
        break;
    }
    let saved = saved.ok_or(ApiError::BadRequest("no file part".into()))?;
    Ok(HttpResponse::Created().json(saved))
}

async fn save_upload(
    cfg: &Config,
    db: &Db,
    store: &FileStore,
    user_id: &str,
    mut field: actix_multipart::Field,
) -> Result<FileMeta, ApiError> {
    let content_disposition = field.content_disposition().cloned();
    let original = content_disposition
        .and_then(|cd| cd.get_filename().map(|s| s.to_string()))
        .unwrap_or_else(|| "upload.bin".into());
    let original_safe = sanitize(&original);
    // client-asserted, with sniffing as a fallback; neither is trusted
    let asserted_mime = field.content_type().map(|m| m.to_string());

    let mut data: Vec<u8> = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("upload read error".into()))?
    {
        data.extend_from_slice(&chunk);
        if data.len() > cfg.max_upload_size {
            return Err(ApiError::BadRequest("file too large".into()));
        }
    }

    let mime = asserted_mime.or_else(|| infer::get(&data).map(|t| t.mime_type().to_string()));

    let id = uuid::Uuid::new_v4().to_string();
    let ext = Path::new(&original_safe)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("bin");
    let stored_name = format!("{}.{}", id, ext);

    // Bytes first, then metadata. If the metadata insert fails the bytes are
    // removed again so the store never holds orphans a row doesn't point at.
    store.put(&stored_name, &data).map_err(|e| {
        log::error!("byte store write failed: {e}");
        ApiError::Internal
    })?;

    let meta = FileMeta {
        id,
        user_id: user_id.to_string(),
        original_name: original_safe,
        stored_name,
        mime_type: mime,
        size_bytes: data.len() as i64,
        created_at: chrono::Utc::now(),
    };

    let res = sqlx::query(
        "INSERT INTO files(id, user_id, stored_name, original_name, mime_type, size_bytes, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&meta.id)
    .bind(&meta.user_id)
    .bind(&meta.stored_name)
    .bind(&meta.original_name)
    .bind(&meta.mime_type)
    .bind(meta.size_bytes)
    .bind(meta.created_at)
    .execute(&db.0)
    .await;

    if let Err(e) = res {
        if let Err(cleanup) = store.delete(&meta.stored_name) {
            log::error!("failed to remove orphaned upload {}: {cleanup}", meta.stored_name);
        }
        return Err(e.into());
    }
    Ok(meta)
}

pub async fn list_files(db: web::Data<Db>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query(
        "SELECT * FROM files WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(&user.user_id)
    .fetch_all(&db.0)
    .await?;
    let files: Vec<FileMeta> = rows.iter().map(FileMeta::from_row).collect();
    Ok(HttpResponse::Ok().json(files))
}

// Ownership is folded into the lookup: a file belonging to someone else is
// indistinguishable from a file that does not exist.
pub async fn download_file(
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    req: HttpRequest,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let row = sqlx::query("SELECT * FROM files WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user.user_id)
        .fetch_optional(&db.0)
        .await?;
    let meta = FileMeta::from_row(&row.ok_or(ApiError::NotFound)?);

    let p = store.path(&meta.stored_name);
    if !p.exists() {
        return Err(ApiError::NotFound);
    }

    let named = actix_files::NamedFile::open_async(p)
        .await
        .map_err(|_| ApiError::Internal)?
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(
                urlencoding::encode(&meta.original_name).into_owned(),
            )],
        });

    let mut resp = named.into_response(&req);
    if let Some(m) = &meta.mime_type {
        if let Ok(val) = actix_web::http::header::HeaderValue::from_str(m) {
            resp.headers_mut()
                .insert(actix_web::http::header::CONTENT_TYPE, val);
        }
    }
    Ok(resp)
}

pub async fn delete_file(
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let row = sqlx::query("SELECT stored_name FROM files WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user.user_id)
        .fetch_optional(&db.0)
        .await?;
    let row = row.ok_or(ApiError::NotFound)?;
    let stored_name: String = row.get("stored_name");

    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(&id)
        .execute(&db.0)
        .await?;

    // metadata row is gone; byte removal is best-effort
    if let Err(e) = store.delete(&stored_name) {
        log::warn!("failed to remove bytes for {stored_name}: {e}");
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"deleted": true})))
}
