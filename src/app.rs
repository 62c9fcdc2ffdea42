use std::net::SocketAddr;

use axum::{
    http::{HeaderValue, Request, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{admin, auth, ocr, state::AppState};

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let max_upload_mb = state.config.limits.max_upload_mb;

    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .merge(auth::router())
        .merge(ocr::router(max_upload_mb))
        .merge(admin::router())
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms = ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms = ms, "response");
                        }
                    },
                ),
        )
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "message": "OCR API: upload an image to /extract-text to get its text",
        "docs": {
            "auth": ["/register", "/login", "/refresh-token", "/logout", "/users/me"],
            "ocr": ["/extract-text", "/ocr-history"],
            "admin": ["/admin/dashboard", "/admin/users", "/admin/ocr-stats", "/admin/settings"]
        }
    }))
}

/// Permissive when no origins are configured; otherwise an explicit allow-list with credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, StatusCode},
    };
    use crate::{
        config::AppConfig,
        ocr::engine::fake::FakeEngine,
        settings::{self, SystemSettings},
    };
    use sqlx::PgPool;
    use std::{io::Cursor, sync::Arc};
    use tower::ServiceExt;

    const PASSWORD: &str = "longenough1";
    const BOUNDARY: &str = "ocr-test-boundary";

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn db_app(pool: PgPool, tweak: impl FnOnce(&mut AppConfig)) -> Router {
        let mut config = AppConfig::for_tests();
        tweak(&mut config);
        let ocr = Arc::new(FakeEngine::with_lines(&["Hello", "World"]));
        build_app(AppState::for_tests(pool, config, ocr))
    }

    fn json_req(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut b = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            b = b.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        b.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn register(app: &Router, email: &str, username: &str) -> (StatusCode, Value) {
        let body = json!({ "email": email, "username": username, "password": PASSWORD });
        let (status, _, body) = call(app.clone(), json_req("POST", "/register", body, None)).await;
        (status, body)
    }

    async fn login(app: &Router, username: &str) -> Value {
        let req = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={}&password={}", username, PASSWORD)))
            .unwrap();
        let (status, _, body) = call(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }

    async fn signed_up(app: &Router, username: &str) -> String {
        let (status, _) = register(app, &format!("{}@example.com", username), username).await;
        assert_eq!(status, StatusCode::CREATED);
        login(app, username).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(16, 8, image::Rgb([250, 250, 250]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn upload_req(uri: &str, token: &str, fields: &[(&str, &str)], file: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn root_describes_service() {
        let app = build_app(AppState::fake());
        let (status, _, body) = call(app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "ocr-api");
        assert!(body["docs"]["ocr"].as_array().is_some());
    }

    #[tokio::test]
    async fn me_requires_bearer_token() {
        let app = build_app(AppState::fake());
        let (status, headers, body) =
            call(app, Request::get("/users/me").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn extract_rejects_garbage_token() {
        let app = build_app(AppState::fake());
        let req = Request::post("/extract-text")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
            .body(Body::from("--x--\r\n"))
            .unwrap();
        let (status, _, _) = call(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_is_not_a_bearer_credential() {
        let state = AppState::fake();
        let keys = auth::jwt::JwtKeys::from(&state.config.jwt);
        let refresh = keys.sign_refresh(uuid::Uuid::new_v4()).unwrap();

        let app = build_app(state);
        let req = Request::get("/ocr-history")
            .header(header::AUTHORIZATION, format!("Bearer {}", refresh.token))
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = call(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn admin_routes_require_auth() {
        for path in ["/admin/dashboard", "/admin/users", "/admin/ocr-stats", "/admin/settings"] {
            let app = build_app(AppState::fake());
            let (status, _, _) = call(app, Request::get(path).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
        }
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_app(AppState::fake());
        let (status, _, _) = call(app, Request::get("/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let app = build_app(AppState::fake());
        let (status, headers, body) =
            call(app.clone(), json_req("POST", "/register", json!({}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert!(body["detail"].as_str().unwrap().contains("email"));

        let req = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=a"))
            .unwrap();
        let (status, headers, body) = call(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert!(body["detail"].as_str().unwrap().contains("password"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_registration_is_rejected(pool: PgPool) {
        let app = db_app(pool, |_| {});

        let (status, body) = register(&app, "  Alice@Example.com ", "alice").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "alice@example.com");
        assert!(body.get("password_hash").is_none());

        let (status, body) = register(&app, "alice@example.com", "alice2").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("email"));

        let (status, body) = register(&app, "other@example.com", "alice").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("username"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn refresh_tokens_rotate_and_are_single_use(pool: PgPool) {
        let app = db_app(pool, |_| {});
        register(&app, "bob@example.com", "bob").await;
        let first = login(&app, "bob").await;
        assert_eq!(first["token_type"], "bearer");

        let (status, _, me) = call(
            app.clone(),
            get_req("/users/me", first["access_token"].as_str().unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "bob");

        let old = json!({ "refresh_token": first["refresh_token"] });
        let (status, _, second) =
            call(app.clone(), json_req("POST", "/refresh-token", old.clone(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(second["refresh_token"], first["refresh_token"]);

        let (status, headers, _) =
            call(app.clone(), json_req("POST", "/refresh-token", old, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.contains_key(header::WWW_AUTHENTICATE));

        let latest = json!({ "refresh_token": second["refresh_token"] });
        let (status, _, body) =
            call(app.clone(), json_req("POST", "/logout", latest.clone(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["detail"].is_string());
        let (status, _, _) = call(app, json_req("POST", "/refresh-token", latest, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn wrong_password_is_unauthorized(pool: PgPool) {
        let app = db_app(pool, |_| {});
        register(&app, "eve@example.com", "eve").await;
        let req = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=eve&password=not-the-password"))
            .unwrap();
        let (status, headers, _) = call(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn free_quota_and_history_caps(pool: PgPool) {
        let app = db_app(pool.clone(), |c| c.limits.history_limit = 3);
        let token = signed_up(&app, "carol").await;
        let image = png();

        // form fields beat the query; query flags accept the same spellings as the form
        let req = upload_req(
            "/extract-text?language=ru&preprocess=1&detail=yes",
            &token,
            &[("language", "en")],
            &image,
        );
        let (status, _, body) = call(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["text"], "Hello World");
        assert_eq!(body["model_used"], "Fake (en)");
        assert_eq!(body["regions"].as_array().unwrap().len(), 2);

        for _ in 1..10 {
            let (status, _, body) =
                call(app.clone(), upload_req("/extract-text", &token, &[], &image)).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.get("regions").is_none());
            assert_eq!(body["model_used"], "Fake (ru,en)");
        }

        let (status, _, body) =
            call(app.clone(), upload_req("/extract-text", &token, &[], &image)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["detail"].as_str().unwrap().contains("Premium"));

        let (status, _, history) =
            call(app.clone(), get_req("/ocr-history?limit=500", &token)).await;
        assert_eq!(status, StatusCode::OK);
        let items = history.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0]["image_url"]
            .as_str()
            .unwrap()
            .starts_with("https://fake.local/ocr/"));

        sqlx::query("UPDATE users SET is_premium = TRUE WHERE username = 'carol'")
            .execute(&pool)
            .await
            .unwrap();

        let (status, _, _) =
            call(app.clone(), upload_req("/extract-text", &token, &[], &image)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, _, history) = call(app.clone(), get_req("/ocr-history?limit=500", &token)).await;
        assert_eq!(history.as_array().unwrap().len(), 11);
        let (_, _, history) = call(app, get_req("/ocr-history?limit=5", &token)).await;
        assert_eq!(history.as_array().unwrap().len(), 5);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upload_over_body_cap_is_413(pool: PgPool) {
        let app = db_app(pool, |c| c.limits.max_upload_mb = 1);
        let token = signed_up(&app, "dave").await;

        let big = vec![0u8; 2 * 1024 * 1024];
        let (status, headers, body) =
            call(app, upload_req("/extract-text", &token, &[], &big)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert!(body["detail"].is_string());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn maintenance_wins_over_bad_options(pool: PgPool) {
        let app = db_app(pool.clone(), |_| {});
        let token = signed_up(&app, "frank").await;
        let on = SystemSettings {
            maintenance_mode: true,
            ..Default::default()
        };
        settings::save(&pool, &on).await.unwrap();

        let req = upload_req("/extract-text", &token, &[("language", "klingon")], &png());
        let (status, _, _) = call(app.clone(), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        sqlx::query("UPDATE users SET is_admin = TRUE WHERE username = 'frank'")
            .execute(&pool)
            .await
            .unwrap();
        let req = upload_req("/extract-text", &token, &[("language", "en")], &png());
        let (status, _, _) = call(app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn admin_panel_requires_admin_flag(pool: PgPool) {
        let app = db_app(pool.clone(), |_| {});
        let token = signed_up(&app, "grace").await;

        let (status, _, body) = call(app.clone(), get_req("/admin/dashboard", &token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["detail"].is_string());

        sqlx::query("UPDATE users SET is_admin = TRUE WHERE username = 'grace'")
            .execute(&pool)
            .await
            .unwrap();

        let (status, _, body) = call(app.clone(), get_req("/admin/dashboard", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalUsers"], 1);
        assert_eq!(body["recentUsers"][0]["username"], "grace");

        let (status, _, body) = call(
            app.clone(),
            json_req("PUT", "/admin/users/not-a-uuid", json!({}), Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let me = body_id(&app, &token).await;
        let req = Request::delete(format!("/admin/users/{}", me))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = call(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    async fn body_id(app: &Router, token: &str) -> String {
        let (_, _, me) = call(app.clone(), get_req("/users/me", token)).await;
        me["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn cors_accepts_configured_origins() {
        // Building must not panic with credentials and mirrored headers.
        let _ = cors_layer(&["http://localhost:3000".to_string()]);
        let _ = cors_layer(&[]);
    }
}
