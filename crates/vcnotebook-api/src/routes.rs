use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::{Html, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, Caller, FirebaseTokenVerifier};
use crate::checkout::{CheckoutService, CheckoutSession};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::subscriptions::{
    SubscriptionRecord, SubscriptionStore, SubscriptionUpdate, SupabaseSubscriptionStore,
};
use crate::webhook::{PaymentEvent, SignatureVerifier};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    token_verifier: Option<Arc<FirebaseTokenVerifier>>,
    checkout: Arc<CheckoutService>,
    subscriptions: Option<Arc<dyn SubscriptionStore>>,
    webhook_verifier: Option<Arc<SignatureVerifier>>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let subscriptions = SupabaseSubscriptionStore::from_config(&config)
            .map(|store| Arc::new(store) as Arc<dyn SubscriptionStore>);
        if subscriptions.is_none() {
            tracing::warn!(
                "SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY missing; subscription storage disabled"
            );
        }
        Self::new(config, subscriptions)
    }

    pub fn new(config: Arc<AppConfig>, subscriptions: Option<Arc<dyn SubscriptionStore>>) -> Self {
        let webhook_verifier = config
            .dodo_webhook_secret
            .as_deref()
            .map(|secret| Arc::new(SignatureVerifier::new(secret, config.webhook_tolerance)));
        Self {
            token_verifier: FirebaseTokenVerifier::from_config(config.clone()).map(Arc::new),
            checkout: Arc::new(CheckoutService::new(config.clone())),
            subscriptions,
            webhook_verifier,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/checkout/create", post(create_checkout))
        .route("/api/user/subscription-status", get(subscription_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/config", get(supabase_config))
        .route("/api/firebase-config", get(firebase_config))
        .route("/api/ga-config", get(ga_config))
        .route("/api/payments/webhook", post(payment_webhook))
        .route("/payment-success", get(payment_success))
        .merge(protected_routes);

    if let Some(dir) = state.config.static_dir.as_ref() {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SupabaseConfigResponse {
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    supabase_service_key: Option<String>,
}

async fn supabase_config(State(state): State<AppState>) -> Json<SupabaseConfigResponse> {
    let config = &state.config;
    let supabase_service_key = if config.expose_service_role_key {
        config.supabase_service_role_key.clone()
    } else {
        None
    };
    Json(SupabaseConfigResponse {
        supabase_url: config.supabase_url.clone(),
        supabase_anon_key: config.supabase_anon_key.clone(),
        supabase_service_key,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseConfigResponse {
    api_key: Option<String>,
    auth_domain: Option<String>,
    project_id: Option<String>,
    storage_bucket: Option<String>,
    messaging_sender_id: Option<String>,
    app_id: Option<String>,
}

async fn firebase_config(State(state): State<AppState>) -> Json<FirebaseConfigResponse> {
    let config = &state.config;
    Json(FirebaseConfigResponse {
        api_key: config.firebase_api_key.clone(),
        auth_domain: config.firebase_auth_domain.clone(),
        project_id: config.firebase_project_id.clone(),
        storage_bucket: config.firebase_storage_bucket.clone(),
        messaging_sender_id: config.firebase_messaging_sender_id.clone(),
        app_id: config.firebase_app_id.clone(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GaConfigResponse {
    measurement_id: Option<String>,
    enabled: bool,
}

async fn ga_config(State(state): State<AppState>) -> Json<GaConfigResponse> {
    let measurement_id = state.config.ga_measurement_id.clone();
    Json(GaConfigResponse {
        enabled: measurement_id.is_some(),
        measurement_id,
    })
}

async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = match state.token_verifier.as_ref() {
        Some(verifier) => {
            let token = extract_bearer_token(request.headers())?;
            Caller::Verified(verifier.verify_id_token(token).await?)
        }
        None => Caller::Anonymous,
    };
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutCreateRequest {
    user_email: Option<String>,
    user_id: Option<String>,
}

async fn create_checkout(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    Json(request): Json<CheckoutCreateRequest>,
) -> Result<Json<CheckoutSession>, AppError> {
    // A verified token can stand in for the email the client left out.
    let (Some(user_email), Some(user_id)) = (
        non_empty(request.user_email.as_deref()).or_else(|| caller.email()),
        non_empty(request.user_id.as_deref()),
    ) else {
        return Err(AppError::bad_request("User email and ID are required"));
    };
    caller.authorize(user_id)?;

    let user_hash = user_fingerprint(user_id);
    let origin = request_origin(&state.config, &headers);
    let session = state
        .checkout
        .create_checkout(user_email, user_id, &origin)
        .await
        .inspect_err(|error| {
            tracing::warn!(endpoint = "checkout", user = user_hash, %error, "Checkout creation failed");
        })?;
    tracing::info!(endpoint = "checkout", user = user_hash, "Created checkout session");
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct SubscriptionStatusQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

async fn subscription_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<SubscriptionStatusQuery>,
) -> Result<Json<SubscriptionRecord>, AppError> {
    let user_id = non_empty(query.user_id.as_deref())
        .ok_or_else(|| AppError::bad_request("User ID is required"))?;
    caller.authorize(user_id)?;

    let store = state.subscriptions.as_ref().ok_or_else(|| {
        AppError::not_configured(
            "Subscription storage not configured",
            "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set",
        )
    })?;
    let record = store.fetch(user_id).await?;
    tracing::debug!(
        endpoint = "subscription_status",
        user = user_fingerprint(user_id),
        found = record.is_some(),
        "Served subscription status"
    );
    Ok(Json(record.unwrap_or_else(SubscriptionRecord::inactive)))
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    received: bool,
}

async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    match state.webhook_verifier.as_ref() {
        Some(verifier) => verifier.verify(&headers, &body, Utc::now().timestamp())?,
        None => tracing::warn!("DODO_WEBHOOK_SECRET not set; accepting unsigned webhook"),
    }

    let event = PaymentEvent::parse(&body)
        .map_err(|error| AppError::bad_request(format!("Webhook body is not valid JSON: {error}")))?;

    match &event {
        PaymentEvent::Legacy(name) => {
            tracing::warn!(event = name.as_str(), "Ignoring legacy webhook shape");
        }
        PaymentEvent::Unrecognized(name) => {
            tracing::info!(event = name.as_str(), "Ignoring unhandled webhook event");
        }
        _ => match event.subscription_update() {
            Ok(update) => record_subscription_change(&state, &update, event.label()).await,
            Err(reason) => {
                tracing::info!(event = event.label(), reason, "Webhook left subscription unchanged");
            }
        },
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Store failures are logged, never surfaced, so the provider does not retry
/// an event that was already understood.
async fn record_subscription_change(state: &AppState, update: &SubscriptionUpdate, event: &str) {
    let user_hash = user_fingerprint(&update.user_id);
    let Some(store) = state.subscriptions.as_ref() else {
        tracing::error!(
            event,
            user = user_hash,
            "Subscription storage not configured; dropping update"
        );
        return;
    };
    match store.upsert(update).await {
        Ok(()) => tracing::info!(
            event,
            user = user_hash,
            is_premium = update.is_premium,
            "Updated subscription"
        ),
        Err(error) => tracing::error!(
            event,
            user = user_hash,
            %error,
            "Failed to update subscription"
        ),
    }
}

const PAYMENT_SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Payment Successful</title>
  <style>
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; text-align: center; padding: 50px; background: #f5f5f7; }
    .card { background: white; padding: 40px; border-radius: 12px; box-shadow: 0 4px 20px rgba(0,0,0,0.1); max-width: 400px; margin: 0 auto; }
    h1 { color: #1d1d1f; margin-bottom: 10px; }
    p { color: #86868b; margin-bottom: 30px; }
    .btn { background: #007aff; color: white; padding: 12px 24px; border-radius: 8px; text-decoration: none; display: inline-block; }
  </style>
</head>
<body>
  <div class="card">
    <h1>Payment Successful!</h1>
    <p>Welcome to Premium! You now have access to all premium features.</p>
    <a href="/" class="btn">Return to Notes</a>
  </div>
</body>
</html>
"#;

async fn payment_success() -> Html<&'static str> {
    Html(PAYMENT_SUCCESS_PAGE)
}

/// `PUBLIC_BASE_URL` when configured, else the scheme and host the client used.
fn request_origin(config: &AppConfig, headers: &HeaderMap) -> String {
    if let Some(base) = config.public_base_url.as_deref() {
        return base.to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map_or("http", str::trim);
    format!("{scheme}://{host}")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::subscriptions::memory::MemorySubscriptionStore;
    use crate::webhook::sign_for_test;

    const WEBHOOK_SECRET: &str = "whsec_c2VjcmV0LWtleS1ieXRlcw==";

    fn config_from(pairs: &[(&str, &str)]) -> Arc<AppConfig> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        Arc::new(
            AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap(),
        )
    }

    fn router_with(pairs: &[(&str, &str)], store: Option<Arc<MemorySubscriptionStore>>) -> Router {
        let store = store.map(|store| store as Arc<dyn SubscriptionStore>);
        app_router(AppState::new(config_from(pairs), store))
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn signed_webhook(body: &Value, secret: &str) -> Request<Body> {
        let raw = body.to_string();
        let now = Utc::now().timestamp();
        let signature = sign_for_test(secret, "msg_1", now, raw.as_bytes());
        Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .header("content-type", "application/json")
            .header("webhook-id", "msg_1")
            .header("webhook-timestamp", now.to_string())
            .header("webhook-signature", signature)
            .body(Body::from(raw))
            .unwrap()
    }

    fn activation_event(user_id: &str) -> Value {
        json!({
            "type": "subscription.active",
            "data": {
                "status": "active",
                "subscription_id": "sub_1",
                "customer": { "email": "ada@example.com" },
                "metadata": { "user_id": user_id }
            }
        })
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (status, body) = send(router_with(&[], None), get_request("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_i64().is_some());
    }

    #[tokio::test]
    async fn service_key_is_hidden_unless_exposed() {
        let base = [
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service"),
        ];
        let (_, body) = send(router_with(&base, None), get_request("/api/config")).await;
        assert_eq!(body["supabaseUrl"], "https://project.supabase.co");
        assert_eq!(body["supabaseAnonKey"], "anon");
        assert_eq!(body["supabaseServiceKey"], Value::Null);

        let mut exposed = base.to_vec();
        exposed.push(("EXPOSE_SERVICE_ROLE_KEY", "true"));
        let (_, body) = send(router_with(&exposed, None), get_request("/api/config")).await;
        assert_eq!(body["supabaseServiceKey"], "service");
    }

    #[tokio::test]
    async fn firebase_and_analytics_config_reflect_environment() {
        let router = router_with(
            &[
                ("FIREBASE_API_KEY", "fb-key"),
                ("FIREBASE_PROJECT_ID", "notes-app"),
                ("GA_MEASUREMENT_ID", "G-123"),
            ],
            None,
        );
        let (_, firebase) = send(router.clone(), get_request("/api/firebase-config")).await;
        assert_eq!(firebase["apiKey"], "fb-key");
        assert_eq!(firebase["projectId"], "notes-app");
        assert_eq!(firebase["appId"], Value::Null);

        let (_, ga) = send(router, get_request("/api/ga-config")).await;
        assert_eq!(ga, json!({ "measurementId": "G-123", "enabled": true }));

        let (_, ga) = send(router_with(&[], None), get_request("/api/ga-config")).await;
        assert_eq!(ga, json!({ "measurementId": null, "enabled": false }));
    }

    #[tokio::test]
    async fn checkout_requires_email_and_user() {
        let (status, body) = send(
            router_with(&[], None),
            json_post("/api/checkout/create", &json!({ "userEmail": "ada@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("User email and ID are required"));
    }

    #[tokio::test]
    async fn checkout_without_payment_key_reports_details() {
        let (status, body) = send(
            router_with(&[("PRODUCT_ID", "prod_1")], None),
            json_post(
                "/api/checkout/create",
                &json!({ "userEmail": "ada@example.com", "userId": "user-1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({
                "error": "Payment system not configured",
                "details": "DODO_PAYMENTS_API_KEY environment variable is missing"
            })
        );
    }

    #[tokio::test]
    async fn protected_routes_demand_bearer_token_when_auth_required() {
        let router = router_with(
            &[
                ("REQUIRE_AUTH", "true"),
                ("FIREBASE_PROJECT_ID", "notes-app"),
                ("FIREBASE_JWKS_URL", "http://127.0.0.1:9/jwks"),
            ],
            None,
        );
        let (status, _) = send(
            router.clone(),
            get_request("/api/user/subscription-status?userId=user-1"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Public config stays reachable.
        let (status, _) = send(router, get_request("/api/config")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn subscription_status_validates_and_defaults() {
        let store = Arc::new(MemorySubscriptionStore::default());
        let router = router_with(&[], Some(store));

        let (status, _) = send(router.clone(), get_request("/api/user/subscription-status")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            router,
            get_request("/api/user/subscription-status?userId=nobody"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "is_premium": false, "subscription_status": "inactive", "updated_at": null })
        );
    }

    #[tokio::test]
    async fn subscription_status_without_store_is_a_config_error() {
        let (status, body) = send(
            router_with(&[], None),
            get_request("/api/user/subscription-status?userId=user-1"),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Subscription storage not configured");
    }

    #[tokio::test]
    async fn signed_activation_marks_user_premium() {
        let store = Arc::new(MemorySubscriptionStore::default());
        let router = router_with(&[("DODO_WEBHOOK_SECRET", WEBHOOK_SECRET)], Some(store.clone()));

        let (status, body) = send(
            router.clone(),
            signed_webhook(&activation_event("user-1"), WEBHOOK_SECRET),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "received": true }));

        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].user_id, "user-1");
        assert_eq!(updates[0].subscription_id.as_deref(), Some("sub_1"));

        let (_, status_body) = send(
            router,
            get_request("/api/user/subscription-status?userId=user-1"),
        )
        .await;
        assert_eq!(status_body["is_premium"], true);
        assert_eq!(status_body["subscription_status"], "active");
    }

    #[tokio::test]
    async fn webhook_signature_is_enforced_when_secret_set() {
        let store = Arc::new(MemorySubscriptionStore::default());
        let router = router_with(&[("DODO_WEBHOOK_SECRET", WEBHOOK_SECRET)], Some(store.clone()));

        let (status, _) = send(
            router.clone(),
            json_post("/api/payments/webhook", &activation_event("user-1")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            router,
            signed_webhook(&activation_event("user-1"), "whsec_d3JvbmctY2xpZW50LWtleQ=="),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(store.updates().is_empty());
    }

    #[tokio::test]
    async fn unsigned_webhook_accepted_without_secret() {
        let store = Arc::new(MemorySubscriptionStore::default());
        let router = router_with(&[], Some(store.clone()));
        let cancel = json!({
            "type": "subscription.cancelled",
            "data": { "status": "cancelled", "metadata": { "user_id": "user-9" } }
        });

        let (status, _) = send(router, json_post("/api/payments/webhook", &cancel)).await;
        assert_eq!(status, StatusCode::OK);
        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].is_premium);
        assert_eq!(updates[0].subscription_status, "inactive");
    }

    #[tokio::test]
    async fn webhook_acknowledges_even_when_store_fails() {
        let store = Arc::new(MemorySubscriptionStore::failing());
        let router = router_with(&[], Some(store.clone()));

        let (status, body) = send(
            router,
            json_post("/api/payments/webhook", &activation_event("user-1")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
        assert_eq!(store.updates().len(), 1);
    }

    #[tokio::test]
    async fn legacy_and_malformed_webhooks() {
        let store = Arc::new(MemorySubscriptionStore::default());
        let router = router_with(&[], Some(store.clone()));

        let legacy = json!({ "event": "payment.completed", "data": { "metadata": { "user_id": "u" } } });
        let (status, _) = send(router.clone(), json_post("/api/payments/webhook", &legacy)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(store.updates().is_empty());

        let malformed = Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(router, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn well_formed_json_of_any_shape_is_acknowledged() {
        let store = Arc::new(MemorySubscriptionStore::default());
        let router = router_with(&[], Some(store.clone()));

        for body in [
            json!({ "type": "subscription.active", "data": { "metadata": { "user_id": 42 } } }),
            json!({ "type": "payment.succeeded", "data": "x" }),
            json!([1, 2]),
        ] {
            let (status, ack) =
                send(router.clone(), json_post("/api/payments/webhook", &body)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(ack, json!({ "received": true }));
        }
        assert!(store.updates().is_empty());
    }

    #[tokio::test]
    async fn payment_success_page_is_html() {
        let response = router_with(&[], None)
            .oneshot(get_request("/payment-success"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Payment Successful!"));
    }

    #[test]
    fn origin_prefers_public_base_url() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "notes.local:3000".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());

        let config = config_from(&[]);
        assert_eq!(request_origin(&config, &headers), "https://notes.local:3000");

        let config = config_from(&[("PUBLIC_BASE_URL", "https://notes.example.com/")]);
        assert_eq!(request_origin(&config, &headers), "https://notes.example.com");
    }
}
