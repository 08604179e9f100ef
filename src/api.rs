//! Request-style surface: thread list, conversation history, mark-as-read,
//! and listing inquiries, plus the WebSocket upgrade route. Every route
//! authenticates the caller from the bearer credential; the resulting
//! identity is the viewing user for all queries.

use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth;
use crate::directory::{populate_messages, Directory};
use crate::error::AppError;
use crate::server::ChatServer;
use crate::store::MessageStore;
use crate::threads;

#[derive(Debug)]
struct ApiReject(AppError);

impl warp::reject::Reject for ApiReject {}

fn reject(e: AppError) -> Rejection {
    warp::reject::custom(ApiReject(e))
}

#[derive(Debug, Deserialize)]
struct WsAuth {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadQuery {
    listing: Option<String>,
}

/// `GET /ws?token=...`: the credential is checked before the upgrade, so a
/// bad token is a plain 401 and no connection state is ever created.
pub fn ws_route(
    server: ChatServer,
    secret: String,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<WsAuth>())
        .and(warp::header::optional::<String>("authorization"))
        .and_then(
            move |ws: warp::ws::Ws, query: WsAuth, header: Option<String>| {
                let server = server.clone();
                let secret = secret.clone();
                async move {
                    let token = auth::token_from(header.as_deref(), query.token.as_deref())
                        .ok_or_else(|| {
                            reject(AppError::Authentication("missing token".to_string()))
                        })?;
                    let user_id = auth::verify_token(&secret, &token).map_err(reject)?;
                    Ok::<_, Rejection>(ws.on_upgrade(move |socket| async move {
                        server.handle_connection(socket, user_id).await;
                    }))
                }
            },
        )
}

pub fn api_routes(
    store: MessageStore,
    directory: Arc<dyn Directory>,
    secret: String,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let threads_route = warp::path!("api" / "messages" / "threads")
        .and(warp::get())
        .and(with_auth(secret.clone()))
        .and(with_store(store.clone()))
        .and(with_directory(directory.clone()))
        .and_then(threads_handler);

    let inquiries_route = warp::path!("api" / "messages" / "inquiries" / String)
        .and(warp::get())
        .and(with_auth(secret.clone()))
        .and(with_store(store.clone()))
        .and(with_directory(directory.clone()))
        .and_then(inquiries_handler);

    let mark_read_route = warp::path!("api" / "messages" / "read" / String)
        .and(warp::put())
        .and(warp::query::<ReadQuery>())
        .and(with_auth(secret.clone()))
        .and(with_store(store.clone()))
        .and_then(mark_read_handler);

    let history_route = warp::path!("api" / "messages" / String / String)
        .and(warp::get())
        .and(with_auth(secret))
        .and(with_store(store))
        .and(with_directory(directory))
        .and_then(history_handler);

    // Literal segments first so "read"/"inquiries" are never taken for a
    // listing id by the generic history route.
    threads_route
        .or(inquiries_route)
        .or(mark_read_route)
        .or(history_route)
}

fn with_auth(
    secret: String,
) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move {
            let token = auth::token_from(header.as_deref(), None).ok_or_else(|| {
                reject(AppError::Authentication("missing bearer token".to_string()))
            })?;
            auth::verify_token(&secret, &token).map_err(reject)
        }
    })
}

fn with_store(
    store: MessageStore,
) -> impl Filter<Extract = (MessageStore,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn with_directory(
    directory: Arc<dyn Directory>,
) -> impl Filter<Extract = (Arc<dyn Directory>,), Error = Infallible> + Clone {
    warp::any().map(move || directory.clone())
}

async fn threads_handler(
    user: String,
    store: MessageStore,
    directory: Arc<dyn Directory>,
) -> Result<impl Reply, Rejection> {
    let rows = threads::aggregate(&store, &user).await.map_err(reject)?;
    let threads = threads::populate(directory.as_ref(), rows).await;
    Ok(warp::reply::json(&threads))
}

async fn history_handler(
    listing: String,
    other_user: String,
    user: String,
    store: MessageStore,
    directory: Arc<dyn Directory>,
) -> Result<impl Reply, Rejection> {
    let messages = store
        .list_conversation(&listing, &user, &other_user)
        .await
        .map_err(reject)?;
    let populated = populate_messages(directory.as_ref(), messages).await;
    Ok(warp::reply::json(&populated))
}

async fn mark_read_handler(
    other_user: String,
    query: ReadQuery,
    user: String,
    store: MessageStore,
) -> Result<impl Reply, Rejection> {
    let updated = store
        .mark_read(&user, &other_user, query.listing.as_deref())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(
        &serde_json::json!({ "updated": updated }),
    ))
}

async fn inquiries_handler(
    listing: String,
    user: String,
    store: MessageStore,
    directory: Arc<dyn Directory>,
) -> Result<impl Reply, Rejection> {
    // Only the listing owner sees its inquiries; an unknown listing is
    // indistinguishable from someone else's.
    let owned = directory
        .listing_card(&listing)
        .await
        .map_err(reject)?
        .is_some_and(|card| card.owner == user);
    if !owned {
        return Err(reject(AppError::Authorization(
            "not the listing owner".to_string(),
        )));
    }

    let inquiries = store.list_inquiries(&listing, &user).await.map_err(reject)?;
    let populated = populate_messages(directory.as_ref(), inquiries).await;
    Ok(warp::reply::json(&populated))
}

/// Map rejections to the JSON error body clients expect.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(ApiReject(e)) = err.find::<ApiReject>() {
        (
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            e.to_string(),
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "message": message })),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::directory::testutil::{seed_listing, seed_user};
    use crate::directory::SqliteDirectory;
    use crate::models::{PopulatedMessage, Thread};
    use chrono::Duration;
    use tempfile::tempdir;

    const SECRET: &str = "api-test-secret";

    struct Fixture {
        store: MessageStore,
        db: Database,
        _dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("api.db").to_str().unwrap())
            .await
            .unwrap();
        Fixture {
            store: MessageStore::new(db.clone()),
            db,
            _dir: dir,
        }
    }

    fn routes(
        fixture: &Fixture,
    ) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(fixture.db.clone()));
        api_routes(fixture.store.clone(), directory, SECRET.to_string())
            .recover(handle_rejection)
    }

    fn bearer(user: &str) -> String {
        format!(
            "Bearer {}",
            auth::issue_token(SECRET, user, Duration::hours(1)).unwrap()
        )
    }

    #[tokio::test]
    async fn requests_without_credentials_are_refused() {
        let fixture = setup().await;
        let routes = routes(&fixture);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/messages/threads")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 401);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/messages/threads")
            .header("authorization", "Bearer nonsense")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn threads_reflect_the_store() {
        let fixture = setup().await;
        seed_user(&fixture.db, "u2", "Botan", None).await;
        seed_listing(&fixture.db, "l1", "Sunny room", "u2").await;
        fixture.store.create("u2", "u1", "l1", "welcome").await.unwrap();
        let routes = routes(&fixture);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/messages/threads")
            .header("authorization", bearer("u1"))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 200);

        let threads: Vec<Thread> = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].other_user.name, "Botan");
        assert_eq!(threads[0].listing.title, "Sunny room");
        assert_eq!(threads[0].unread_count, 1);
        assert_eq!(threads[0].last_message.content, "welcome");
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_caller() {
        let fixture = setup().await;
        fixture.store.create("u1", "u2", "l1", "one").await.unwrap();
        fixture.store.create("u2", "u1", "l1", "two").await.unwrap();
        fixture.store.create("u3", "u2", "l1", "someone else").await.unwrap();
        let routes = routes(&fixture);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/messages/l1/u2")
            .header("authorization", bearer("u1"))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 200);

        let history: Vec<PopulatedMessage> = serde_json::from_slice(resp.body()).unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        // Ascending creation order, and only the caller's conversation.
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn mark_read_reports_count_and_is_idempotent() {
        let fixture = setup().await;
        fixture.store.create("u2", "u1", "l1", "a").await.unwrap();
        fixture.store.create("u2", "u1", "l1", "b").await.unwrap();
        let routes = routes(&fixture);

        let resp = warp::test::request()
            .method("PUT")
            .path("/api/messages/read/u2")
            .header("authorization", bearer("u1"))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["updated"], 2);

        let resp = warp::test::request()
            .method("PUT")
            .path("/api/messages/read/u2")
            .header("authorization", bearer("u1"))
            .reply(&routes)
            .await;
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["updated"], 0);
    }

    #[tokio::test]
    async fn mark_read_respects_listing_query() {
        let fixture = setup().await;
        fixture.store.create("u2", "u1", "l1", "a").await.unwrap();
        fixture.store.create("u2", "u1", "l2", "b").await.unwrap();
        let routes = routes(&fixture);

        let resp = warp::test::request()
            .method("PUT")
            .path("/api/messages/read/u2?listing=l1")
            .header("authorization", bearer("u1"))
            .reply(&routes)
            .await;
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["updated"], 1);
        assert_eq!(
            fixture.store.unread_count("u1", "u2", "l2").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn inquiries_require_ownership() {
        let fixture = setup().await;
        seed_user(&fixture.db, "owner", "Olu", None).await;
        seed_listing(&fixture.db, "l1", "Loft", "owner").await;
        fixture.store.create("u2", "owner", "l1", "interested!").await.unwrap();
        let routes = routes(&fixture);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/messages/inquiries/l1")
            .header("authorization", bearer("u2"))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 403);

        // Unknown listing looks exactly the same.
        let resp = warp::test::request()
            .method("GET")
            .path("/api/messages/inquiries/ghost")
            .header("authorization", bearer("u2"))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 403);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/messages/inquiries/l1")
            .header("authorization", bearer("owner"))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), 200);
        let inquiries: Vec<PopulatedMessage> = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(inquiries.len(), 1);
        assert_eq!(inquiries[0].content, "interested!");
    }

    #[tokio::test]
    async fn ws_handshake_refuses_bad_credentials() {
        let fixture = setup().await;
        let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(fixture.db.clone()));
        let server = ChatServer::new(fixture.store.clone(), directory);
        let route = ws_route(server, SECRET.to_string());

        assert!(warp::test::ws()
            .path("/ws")
            .handshake(route.clone())
            .await
            .is_err());
        assert!(warp::test::ws()
            .path("/ws?token=bogus")
            .handshake(route)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn ws_handshake_accepts_a_valid_token() {
        let fixture = setup().await;
        let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(fixture.db.clone()));
        let server = ChatServer::new(fixture.store.clone(), directory);
        let route = ws_route(server, SECRET.to_string());

        let token = auth::issue_token(SECRET, "u1", Duration::hours(1)).unwrap();
        let mut client = warp::test::ws()
            .path(&format!("/ws?token={token}"))
            .handshake(route)
            .await
            .expect("handshake should succeed");

        client
            .send_text(r#"{"type":"joinRoom","otherUser":"u2","listing":"l1"}"#)
            .await;
        let reply = client.recv().await.expect("expected roomJoined ack");
        let text = reply.to_str().expect("text frame");
        assert!(text.contains("roomJoined"));
        assert!(text.contains("room_l1_u1_u2"));
    }
}
