//! HTTP router.
//!
//! Returns a composable `Router` with every route under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! - public: rate limit by peer → audit
//! - protected: auth → rate limit by user → audit

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Build router from a pre-constructed `ApiContext` (custom rate limits).
pub fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension → Auth → Rate limit → Audit → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/me", get(endpoints::me::get).patch(endpoints::me::update))
        .route("/me/password", post(endpoints::me::change_password))
        .route("/dashboard", get(endpoints::dashboard::get))
        .route("/departments/:id/doctors", get(endpoints::departments::doctors))
        .route("/doctors", get(endpoints::doctors::list))
        .route("/doctors/:id/availability", get(endpoints::doctors::availability))
        .route(
            "/appointments",
            get(endpoints::appointments::list).post(endpoints::appointments::book),
        )
        .route("/appointments/:id", get(endpoints::appointments::get))
        .route("/appointments/:id/status", post(endpoints::appointments::set_status))
        .route("/appointments/:id/reschedule", post(endpoints::appointments::reschedule))
        .route(
            "/prescriptions",
            get(endpoints::prescriptions::list).post(endpoints::prescriptions::issue),
        )
        .route("/prescriptions/:id", get(endpoints::prescriptions::get))
        .route("/prescriptions/:id/status", post(endpoints::prescriptions::set_status))
        .route("/prescriptions/:id/route", post(endpoints::prescriptions::route))
        .route("/pharmacies", get(endpoints::pharmacies::list))
        .route(
            "/inventory",
            get(endpoints::inventory::list).post(endpoints::inventory::create),
        )
        .route(
            "/inventory/:id",
            axum::routing::patch(endpoints::inventory::update).delete(endpoints::inventory::delete),
        )
        .route("/inventory/:id/adjust", post(endpoints::inventory::adjust))
        .route("/medications", get(endpoints::medications::catalog))
        .route("/medications/mine", get(endpoints::medications::mine))
        .route("/medications/pharmacies", get(endpoints::medications::pharmacies))
        .route("/patients/:id/medications", get(endpoints::medications::for_patient))
        .route("/notifications", get(endpoints::notifications::list))
        .route("/notifications/read-all", post(endpoints::notifications::mark_all_read))
        .route("/notifications/:id/read", post(endpoints::notifications::mark_read))
        .route(
            "/admin/users",
            get(endpoints::admin::list_users).post(endpoints::admin::create_user),
        )
        .route("/admin/users/:id/active", post(endpoints::admin::set_active))
        .route("/admin/departments", post(endpoints::departments::create))
        .route(
            "/admin/departments/:id",
            axum::routing::patch(endpoints::departments::update)
                .delete(endpoints::departments::delete),
        )
        .route(
            "/admin/alerts",
            get(endpoints::admin::list_alerts).post(endpoints::admin::raise_alert),
        )
        .route("/admin/alerts/:id/resolve", post(endpoints::admin::resolve_alert))
        .route("/admin/audit", get(endpoints::admin::audit))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit_user))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Public routes (rate-limited and audited, no auth)
    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/departments", get(endpoints::departments::list))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", protected.merge(public))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(cors_layer())
}

/// Bearer tokens travel in a header, not cookies, so any origin may call.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use chrono::{Duration, NaiveTime};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::accounts;
    use crate::api::types::RateLimiter;

    const ADMIN_EMAIL: &str = "admin@careflow.test";
    const PASSWORD: &str = "correct horse battery";

    fn test_core() -> (Arc<CoreState>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::with_database(tmp.path().join("careflow.db"), 12));
        let conn = core.open_db().unwrap();
        accounts::ensure_bootstrap_admin(&conn, ADMIN_EMAIL, PASSWORD).unwrap();
        (core, tmp)
    }

    fn make_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn response_json(response: Response<Body>) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        if body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&body).unwrap()
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(make_request(method, uri, token, body))
            .await
            .unwrap();
        let status = response.status();
        (status, response_json(response).await)
    }

    async fn login(app: &Router, email: &str) -> String {
        let (status, json) = call(
            app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login failed: {json}");
        json["token"].as_str().unwrap().to_string()
    }

    /// Admin, department, doctor, pharmacy and a registered patient, all
    /// logged in.
    struct Cast {
        admin: String,
        doctor: String,
        doctor_id: String,
        pharmacy: String,
        pharmacy_id: String,
        patient: String,
        patient_id: String,
    }

    async fn cast(app: &Router) -> Cast {
        let admin = login(app, ADMIN_EMAIL).await;

        let (status, dept) = call(
            app,
            "POST",
            "/api/admin/departments",
            Some(&admin),
            Some(json!({ "name": "Cardiology", "description": "Heart" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let department_id = dept["department"]["id"].as_str().unwrap().to_string();

        let (status, doctor) = call(
            app,
            "POST",
            "/api/admin/users",
            Some(&admin),
            Some(json!({
                "email": "dr.house@careflow.test",
                "password": PASSWORD,
                "full_name": "Gregory House",
                "role": "DOCTOR",
                "department_id": department_id,
                "specialization": "Diagnostics",
                "license_number": "MD-1001",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{doctor}");

        let (status, pharmacy) = call(
            app,
            "POST",
            "/api/admin/users",
            Some(&admin),
            Some(json!({
                "email": "corner@careflow.test",
                "password": PASSWORD,
                "full_name": "Corner Pharmacist",
                "role": "PHARMACY",
                "pharmacy_name": "Corner Pharmacy",
                "address": "1 Main St",
                "license_number": "PH-77",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{pharmacy}");

        let (status, patient) = call(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "pat@careflow.test",
                "password": PASSWORD,
                "full_name": "Pat Patient",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{patient}");
        assert_eq!(patient["user"]["role"], "PATIENT");

        Cast {
            admin,
            doctor: login(app, "dr.house@careflow.test").await,
            doctor_id: doctor["user"]["id"].as_str().unwrap().to_string(),
            pharmacy: login(app, "corner@careflow.test").await,
            pharmacy_id: pharmacy["user"]["id"].as_str().unwrap().to_string(),
            patient: login(app, "pat@careflow.test").await,
            patient_id: patient["user"]["id"].as_str().unwrap().to_string(),
        }
    }

    fn tomorrow_at(hour: u32) -> String {
        let date = crate::db::now().date() + Duration::days(1);
        date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    async fn confirmed_appointment(app: &Router, cast: &Cast) -> String {
        let (status, booked) = call(
            app,
            "POST",
            "/api/appointments",
            Some(&cast.patient),
            Some(json!({
                "doctor_id": cast.doctor_id,
                "scheduled_at": tomorrow_at(10),
                "mode": "ONLINE",
                "reason": "Chest pain",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{booked}");
        assert_eq!(booked["appointment"]["status"], "PENDING");
        let id = booked["appointment"]["id"].as_str().unwrap().to_string();

        let (status, confirmed) = call(
            app,
            "POST",
            &format!("/api/appointments/{id}/status"),
            Some(&cast.doctor),
            Some(json!({ "status": "CONFIRMED" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{confirmed}");
        assert_eq!(confirmed["appointment"]["status"], "CONFIRMED");
        id
    }

    // ── Middleware ──────────────────────────────────────────

    #[tokio::test]
    async fn health_is_public() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let (status, json) = call(&app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], true);
        assert!(!json["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn protected_route_requires_token() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let (status, json) = call(&app, "GET", "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");

        let (status, _) = call(&app, "GET", "/api/me", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_response_is_not_cached() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let token = login(&app, ADMIN_EMAIL).await;

        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/me", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
        assert_eq!(response.headers().get("X-Content-Type-Options").unwrap(), "nosniff");
        let json = response_json(response).await;
        assert_eq!(json["user"]["role"], "ADMIN");
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let token = login(&app, ADMIN_EMAIL).await;

        let (status, _) = call(&app, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let (status, json) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL, "password": "nope nope nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn rate_limit_returns_429() {
        let (core, _tmp) = test_core();
        let ctx = ApiContext::with_rate_limiter(core, RateLimiter::with_limits(2, 100));
        let app = api_router_with_ctx(ctx);

        for _ in 0..2 {
            let (status, _) = call(&app, "GET", "/api/health", None, None).await;
            assert_eq!(status, StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "60");
    }

    #[tokio::test]
    async fn login_attempts_limited_regardless_of_bearer_header() {
        let (core, _tmp) = test_core();
        let ctx = ApiContext::with_rate_limiter(core, RateLimiter::with_limits(2, 100));
        let app = api_router_with_ctx(ctx);

        let mut statuses = Vec::new();
        for i in 0..4 {
            let response = app
                .clone()
                .oneshot(make_request(
                    "POST",
                    "/api/auth/login",
                    Some(&format!("rotating-{i}-0123456789abcdef")),
                    Some(json!({ "email": ADMIN_EMAIL, "password": "guess guess guess" })),
                ))
                .await
                .unwrap();
            statuses.push(response.status());
        }
        assert_eq!(
            statuses,
            [
                StatusCode::UNAUTHORIZED,
                StatusCode::UNAUTHORIZED,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS,
            ]
        );
    }

    #[tokio::test]
    async fn rejected_tokens_are_throttled() {
        let (core, _tmp) = test_core();
        let ctx = ApiContext::with_rate_limiter(core, RateLimiter::with_limits(2, 100));
        let app = api_router_with_ctx(ctx);

        let mut statuses = Vec::new();
        for i in 0..3 {
            let (status, _) = call(&app, "GET", "/api/me", Some(&format!("forged-{i}")), None).await;
            statuses.push(status);
        }
        assert_eq!(
            statuses,
            [StatusCode::UNAUTHORIZED, StatusCode::UNAUTHORIZED, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[tokio::test]
    async fn authenticated_users_have_separate_buckets() {
        let (core, _tmp) = test_core();
        let conn = core.open_db().unwrap();
        accounts::register_patient(
            &conn,
            accounts::NewUser {
                email: "second@careflow.test".into(),
                password: PASSWORD.into(),
                full_name: "Second".into(),
                role: None,
                phone: None,
                profile: Default::default(),
            },
        )
        .unwrap();
        let ctx = ApiContext::with_rate_limiter(core, RateLimiter::with_limits(4, 100));
        let app = api_router_with_ctx(ctx);

        // Two logins use the shared peer bucket; each user then has its own.
        let admin = login(&app, ADMIN_EMAIL).await;
        let second = login(&app, "second@careflow.test").await;
        for _ in 0..4 {
            let (status, _) = call(&app, "GET", "/api/me", Some(&admin), None).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, _) = call(&app, "GET", "/api/me", Some(&admin), None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let (status, _) = call(&app, "GET", "/api/me", Some(&second), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn booking_outside_clinic_hours_is_bad_request() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;
        let (status, json) = call(
            &app,
            "POST",
            "/api/appointments",
            Some(&cast.patient),
            Some(json!({
                "doctor_id": cast.doctor_id,
                "scheduled_at": tomorrow_at(3),
                "mode": "OFFLINE",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn malformed_body_uses_error_envelope() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let (status, json) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn invalid_path_id_is_bad_request() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let token = login(&app, ADMIN_EMAIL).await;
        let (status, _) = call(&app, "GET", "/api/appointments/not-a-uuid", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let (status, _) = call(&app, "GET", "/nonexistent", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ── Accounts & departments ──────────────────────────────

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let body = json!({
            "email": "twice@careflow.test",
            "password": PASSWORD,
            "full_name": "Twice",
        });
        let (status, _) = call(&app, "POST", "/api/auth/register", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, json) = call(&app, "POST", "/api/auth/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn weak_password_is_bad_request() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "short@careflow.test", "password": "123", "full_name": "S" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_routes_forbidden_to_patients() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;

        let (status, json) = call(&app, "GET", "/api/admin/users", Some(&cast.patient), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "FORBIDDEN");

        let (status, _) = call(
            &app,
            "POST",
            "/api/admin/departments",
            Some(&cast.doctor),
            Some(json!({ "name": "Rogue" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn department_directory_and_doctors() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;

        let (status, json) = call(&app, "GET", "/api/departments", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let departments = json["departments"].as_array().unwrap();
        assert_eq!(departments.len(), 1);
        let dept_id = departments[0]["id"].as_str().unwrap();

        let (status, json) = call(
            &app,
            "GET",
            &format!("/api/departments/{dept_id}/doctors"),
            Some(&cast.patient),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["doctors"][0]["id"], cast.doctor_id.as_str());

        // Cannot delete while a doctor is attached
        let (status, _) = call(
            &app,
            "DELETE",
            &format!("/api/admin/departments/{dept_id}"),
            Some(&cast.admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn deactivated_user_loses_access() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;

        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/admin/users/{}/active", cast.patient_id),
            Some(&cast.admin),
            Some(json!({ "active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["is_active"], false);

        let (status, _) = call(&app, "GET", "/api/me", Some(&cast.patient), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // ── Appointments ────────────────────────────────────────

    #[tokio::test]
    async fn booking_flow_and_double_booking() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;

        let (status, json) = call(
            &app,
            "GET",
            &format!(
                "/api/doctors/{}/availability?date={}",
                cast.doctor_id,
                &tomorrow_at(10)[..10]
            ),
            Some(&cast.patient),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let before = json["slots"].as_array().unwrap().len();
        assert!(before > 0);

        let id = confirmed_appointment(&app, &cast).await;

        let (_, json) = call(
            &app,
            "GET",
            &format!(
                "/api/doctors/{}/availability?date={}",
                cast.doctor_id,
                &tomorrow_at(10)[..10]
            ),
            Some(&cast.patient),
            None,
        )
        .await;
        assert_eq!(json["slots"].as_array().unwrap().len(), before - 1);

        // Same slot again
        let (status, _) = call(
            &app,
            "POST",
            "/api/appointments",
            Some(&cast.patient),
            Some(json!({
                "doctor_id": cast.doctor_id,
                "scheduled_at": tomorrow_at(10),
                "mode": "OFFLINE",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Pharmacies cannot see appointments; outsiders get 404
        let (status, _) = call(&app, "GET", "/api/appointments", Some(&cast.pharmacy), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, json) = call(
            &app,
            "GET",
            &format!("/api/appointments/{id}"),
            Some(&cast.patient),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["appointment"]["meeting_link"].as_str().is_some());

        // Doctor was notified of the request
        let (_, json) = call(&app, "GET", "/api/notifications", Some(&cast.doctor), None).await;
        assert!(json["unread_count"].as_i64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn completed_appointment_cannot_be_cancelled() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;
        let id = confirmed_appointment(&app, &cast).await;

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/appointments/{id}/status"),
            Some(&cast.doctor),
            Some(json!({ "status": "COMPLETED", "notes": "Follow up in a month" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/appointments/{id}/status"),
            Some(&cast.patient),
            Some(json!({ "status": "CANCELLED" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn reschedule_returns_to_pending() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;
        let id = confirmed_appointment(&app, &cast).await;

        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/appointments/{id}/reschedule"),
            Some(&cast.patient),
            Some(json!({ "scheduled_at": tomorrow_at(14) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["appointment"]["status"], "PENDING");
    }

    // ── Prescriptions, inventory, medications ───────────────

    #[tokio::test]
    async fn prescription_full_lifecycle() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;
        let appointment_id = confirmed_appointment(&app, &cast).await;

        let (status, item) = call(
            &app,
            "POST",
            "/api/inventory",
            Some(&cast.pharmacy),
            Some(json!({
                "medication_name": "Atorvastatin",
                "quantity": 40,
                "unit": "tablets",
                "reorder_level": 20,
                "unit_price_cents": 15,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{item}");
        let item_id = item["item"]["id"].as_str().unwrap().to_string();

        let (status, issued) = call(
            &app,
            "POST",
            "/api/prescriptions",
            Some(&cast.doctor),
            Some(json!({
                "appointment_id": appointment_id,
                "diagnosis": "Hyperlipidemia",
                "medications": [{
                    "medication_name": "Atorvastatin",
                    "dosage": "20mg",
                    "frequency": "once daily",
                    "duration": "30 days",
                    "quantity": 30,
                }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{issued}");
        assert_eq!(issued["prescription"]["status"], "ISSUED");
        let rx_id = issued["prescription"]["id"].as_str().unwrap().to_string();

        // Patient finds a pharmacy that can fill it, then routes there
        let (status, stock) = call(
            &app,
            "GET",
            "/api/medications/pharmacies?name=atorvastatin&quantity=30",
            Some(&cast.patient),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stock["pharmacies"][0]["pharmacy_id"], cast.pharmacy_id.as_str());

        let (status, routed) = call(
            &app,
            "POST",
            &format!("/api/prescriptions/{rx_id}/route"),
            Some(&cast.patient),
            Some(json!({ "pharmacy_id": cast.pharmacy_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{routed}");
        assert_eq!(routed["prescription"]["status"], "SENT_TO_PHARMACY");

        for next in [
            "RECEIVED_BY_PHARMACY",
            "PHARMACY_ACCEPTED",
            "PROCESSING",
            "READY_FOR_PICKUP",
            "COMPLETED",
        ] {
            let (status, json) = call(
                &app,
                "POST",
                &format!("/api/prescriptions/{rx_id}/status"),
                Some(&cast.pharmacy),
                Some(json!({ "status": next })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{next}: {json}");
            assert_eq!(json["prescription"]["status"], next);
        }

        let (_, detail) = call(
            &app,
            "GET",
            &format!("/api/prescriptions/{rx_id}"),
            Some(&cast.patient),
            None,
        )
        .await;
        assert_eq!(detail["prescription"]["events"].as_array().unwrap().len(), 7);

        // Stock was taken at PROCESSING and crossed the reorder level
        let (_, inventory) = call(&app, "GET", "/api/inventory", Some(&cast.pharmacy), None).await;
        let item = inventory["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|i| i["id"] == item_id.as_str())
            .cloned()
            .unwrap();
        assert_eq!(item["quantity"], 10);

        let (_, alerts) = call(&app, "GET", "/api/admin/alerts", Some(&cast.admin), None).await;
        assert_eq!(alerts["alerts"].as_array().unwrap().len(), 1);

        // Terminal state is final
        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/prescriptions/{rx_id}/status"),
            Some(&cast.pharmacy),
            Some(json!({ "status": "CANCELLED" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, meds) = call(&app, "GET", "/api/medications/mine", Some(&cast.patient), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(meds["medications"][0]["medication_name"], "Atorvastatin");

        let (status, meds) = call(
            &app,
            "GET",
            &format!("/api/patients/{}/medications", cast.patient_id),
            Some(&cast.doctor),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(meds["medications"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn processing_without_stock_conflicts() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;
        let appointment_id = confirmed_appointment(&app, &cast).await;

        let (_, issued) = call(
            &app,
            "POST",
            "/api/prescriptions",
            Some(&cast.doctor),
            Some(json!({
                "appointment_id": appointment_id,
                "pharmacy_id": cast.pharmacy_id,
                "medications": [{
                    "medication_name": "Warfarin",
                    "dosage": "5mg",
                    "frequency": "once daily",
                    "duration": "14 days",
                    "quantity": 14,
                }],
            })),
        )
        .await;
        assert_eq!(issued["prescription"]["status"], "SENT_TO_PHARMACY");
        let rx_id = issued["prescription"]["id"].as_str().unwrap().to_string();

        for next in ["RECEIVED_BY_PHARMACY", "PHARMACY_ACCEPTED"] {
            let (status, _) = call(
                &app,
                "POST",
                &format!("/api/prescriptions/{rx_id}/status"),
                Some(&cast.pharmacy),
                Some(json!({ "status": next })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/prescriptions/{rx_id}/status"),
            Some(&cast.pharmacy),
            Some(json!({ "status": "PROCESSING" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"]["message"].as_str().unwrap().contains("Warfarin"));

        // Patients cannot drive pharmacy steps
        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/prescriptions/{rx_id}/status"),
            Some(&cast.patient),
            Some(json!({ "status": "PROCESSING" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn inventory_adjust_and_delete() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;

        let (_, item) = call(
            &app,
            "POST",
            "/api/inventory",
            Some(&cast.pharmacy),
            Some(json!({ "medication_name": "Ibuprofen", "quantity": 5, "unit": "tablets" })),
        )
        .await;
        let id = item["item"]["id"].as_str().unwrap().to_string();

        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/inventory/{id}/adjust"),
            Some(&cast.pharmacy),
            Some(json!({ "delta": -10 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT, "{json}");

        let (status, json) = call(
            &app,
            "PATCH",
            &format!("/api/inventory/{id}"),
            Some(&cast.pharmacy),
            Some(json!({ "unit_price_cents": 99 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["item"]["unit_price_cents"], 99);

        let (status, _) = call(&app, "GET", "/api/inventory", Some(&cast.patient), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            "DELETE",
            &format!("/api/inventory/{id}"),
            Some(&cast.pharmacy),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    // ── Notifications, dashboard, admin ─────────────────────

    #[tokio::test]
    async fn notifications_mark_read() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;
        confirmed_appointment(&app, &cast).await;

        let (_, json) = call(&app, "GET", "/api/notifications", Some(&cast.patient), None).await;
        let first = json["notifications"][0]["id"].as_str().unwrap().to_string();
        let unread = json["unread_count"].as_i64().unwrap();
        assert!(unread >= 1);

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/notifications/{first}/read"),
            Some(&cast.patient),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // Someone else's notification is invisible
        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/notifications/{first}/read"),
            Some(&cast.doctor),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = call(&app, "POST", "/api/notifications/read-all", Some(&cast.patient), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["updated"].as_i64().unwrap(), unread - 1);
    }

    #[tokio::test]
    async fn dashboard_follows_role() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;
        confirmed_appointment(&app, &cast).await;

        let (_, json) = call(&app, "GET", "/api/dashboard", Some(&cast.patient), None).await;
        assert_eq!(json["dashboard"]["role"], "PATIENT");
        assert_eq!(json["dashboard"]["upcoming_appointments"].as_array().unwrap().len(), 1);

        let (_, json) = call(&app, "GET", "/api/dashboard", Some(&cast.admin), None).await;
        assert_eq!(json["dashboard"]["role"], "ADMIN");
        assert_eq!(json["dashboard"]["users_by_role"]["DOCTOR"], 1);
    }

    #[tokio::test]
    async fn admin_alerts_and_audit() {
        let (core, _tmp) = test_core();
        let app = api_router(core);
        let cast = cast(&app).await;

        let (status, json) = call(
            &app,
            "POST",
            "/api/admin/alerts",
            Some(&cast.admin),
            Some(json!({ "severity": "CRITICAL", "message": "Backup failed" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let alert_id = json["alert"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/admin/alerts/{alert_id}/resolve"),
            Some(&cast.admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, json) = call(&app, "GET", "/api/admin/alerts", Some(&cast.admin), None).await;
        assert!(json["alerts"].as_array().unwrap().is_empty());
        let (_, json) = call(
            &app,
            "GET",
            "/api/admin/alerts?include_resolved=true",
            Some(&cast.admin),
            None,
        )
        .await;
        assert_eq!(json["alerts"].as_array().unwrap().len(), 1);

        let (status, json) = call(
            &app,
            "GET",
            &format!("/api/admin/audit?user_id={}", cast.patient_id),
            Some(&cast.admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = json["entries"].as_array().unwrap();
        assert!(entries.iter().all(|e| e["user_id"] == cast.patient_id.as_str()));

        let (status, _) = call(&app, "GET", "/api/admin/audit", Some(&cast.doctor), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
