use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use warp::Filter;

use roomly::api;
use roomly::config::Config;
use roomly::db::Database;
use roomly::directory::{Directory, SqliteDirectory};
use roomly::server::ChatServer;
use roomly::store::MessageStore;

/// Check that usable TLS material exists before committing to WSS; without
/// it the server falls back to plaintext on the same port.
fn tls_available(cert_path: &str, key_path: &str) -> bool {
    let Ok(cert_file) = File::open(cert_path) else {
        return false;
    };
    let Ok(key_file) = File::open(key_path) else {
        return false;
    };

    let certs: Result<Vec<_>, _> =
        rustls_pemfile::certs(&mut BufReader::new(cert_file)).collect();
    match certs {
        Ok(certs) if !certs.is_empty() => {}
        Ok(_) => {
            log::warn!("no certificates found in {cert_path}");
            return false;
        }
        Err(e) => {
            log::warn!("failed to parse certificate file {cert_path}: {e}");
            return false;
        }
    }

    let keys: Result<Vec<_>, _> =
        rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_file)).collect();
    match keys {
        Ok(keys) if !keys.is_empty() => true,
        Ok(_) => {
            log::warn!("no private keys found in {key_path}");
            false
        }
        Err(e) => {
            log::warn!("failed to parse private key file {key_path}: {e}");
            false
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("failed to open database {}: {e}", config.database_path);
            std::process::exit(1);
        }
    };
    log::info!("database ready at {}", config.database_path);

    let store = MessageStore::new(db.clone());
    let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(db.clone()));
    let chat = ChatServer::new(store.clone(), directory.clone());

    let routes = api::ws_route(chat, config.jwt_secret.clone())
        .or(api::api_routes(store, directory, config.jwt_secret.clone()))
        .or(warp::fs::dir(config.static_dir.clone()))
        .recover(api::handle_rejection)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["authorization", "content-type"])
                .allow_methods(vec!["GET", "PUT", "POST"]),
        );

    let addr = ([0, 0, 0, 0], config.port);
    if tls_available(&config.tls_cert_path, &config.tls_key_path) {
        log::info!("starting secure server (HTTPS/WSS) on port {}", config.port);
        tokio::select! {
            _ = warp::serve(routes)
                .tls()
                .cert_path(&config.tls_cert_path)
                .key_path(&config.tls_key_path)
                .run(addr) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    } else {
        log::info!(
            "TLS material unavailable, serving HTTP/WS on port {}",
            config.port
        );
        tokio::select! {
            _ = warp::serve(routes).run(addr) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    log::info!("shutting down");
    if let Err(e) = db.close().await {
        log::error!("failed to checkpoint database on shutdown: {e}");
    }
}
