mod auth;
mod config;
mod db;
mod errors;
mod models;
mod otp;
mod routes;
mod storage;
mod validate;

use crate::config::Config;
use crate::db::Db;
use crate::otp::CodeStore;
use crate::routes::{auth as auth_routes, files as files_routes, health, sms as sms_routes};
use crate::storage::FileStore;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use env_logger::Env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Init logger to show info by default, but can be overridden by RUST_LOG
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cfg = Config::from_env_config();

    let db = Db::connect_and_migrate(&cfg.database_path)
        .await
        .expect("database init failed");
    let store = FileStore::new(&cfg.uploads_dir).expect("create uploads dir");

    // One code store for the whole process, not one per worker.
    let codes = Data::new(CodeStore::new());

    log::info!("Starting server at {}", cfg.listen);

    let listen_addr = cfg.listen.clone();
    HttpServer::new(move || {
        let cors = Cors::permissive()
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(Data::new(cfg.clone()))
            .app_data(Data::new(db.clone()))
            .app_data(Data::new(store.clone()))
            .app_data(codes.clone())
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/auth")
                            .route("/register", web::post().to(auth_routes::register))
                            .route("/login", web::post().to(auth_routes::login))
                            .route("/me", web::get().to(auth_routes::me)),
                    )
                    .service(
                        web::scope("/sms")
                            .route("/send-code", web::post().to(sms_routes::send_code)),
                    )
                    .service(
                        web::scope("/files")
                            .route("/upload", web::post().to(files_routes::upload_file))
                            .route("/list", web::get().to(files_routes::list_files))
                            .route("/download/{id}", web::get().to(files_routes::download_file))
                            .route("/delete/{id}", web::delete().to(files_routes::delete_file)),
                    )
                    .route("/health", web::get().to(health::health_check)),
            )
    })
    .bind(listen_addr)?
    .run()
    .await
}
