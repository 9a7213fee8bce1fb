use super::*;
use axum::{
    body::{self, Body},
    http::Request,
    response::Response,
};
use serde_json::{json, Value};
use server_api::{auth::mint_token, AuthContext};
use shared::domain::{Role, UserId};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    auth: AuthConfig,
}

impl TestApp {
    fn token(&self, user: &str, role: Role) -> String {
        let caller = AuthContext {
            user_id: UserId::new(user),
            role,
        };
        mint_token(&self.auth, &caller).expect("token")
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response")
    }
}

async fn test_app(backend: StoreBackend) -> TestApp {
    let auth = AuthConfig {
        jwt_secret: "test-secret".into(),
        ttl_seconds: 60,
    };
    let store = open_store(backend, "sqlite::memory:").await.expect("store");
    let api = ApiContext {
        store,
        auth: auth.clone(),
    };
    TestApp {
        router: build_router(Arc::new(AppState { api }), 16 * 1024),
        auth,
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn address_body(owner: &str) -> Value {
    json!({
        "ownerId": owner,
        "street": "Main",
        "number": "1",
        "neighborhood": "N",
        "city": "C",
        "state": "S",
        "zipCode": "00000",
    })
}

async fn create(app: &TestApp, token: &str, owner: &str) -> Value {
    let response = app
        .send("POST", "/addresses", Some(token), Some(address_body(owner)))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn healthz_reports_ok_without_credentials() {
    let app = test_app(StoreBackend::Memory).await;
    let response = app.send("GET", "/healthz", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn address_routes_require_bearer_token() {
    let app = test_app(StoreBackend::Memory).await;
    let response = app.send("GET", "/addresses", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send("GET", "/addresses", Some("not-a-jwt"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn create_then_get_by_id_round_trips_on_sqlite() {
    let app = test_app(StoreBackend::Sqlite).await;
    let token = app.token("u1", Role::Customer);

    let created = create(&app, &token, "u1").await;
    assert_eq!(created["ownerId"], "u1");
    assert_eq!(created["street"], "Main");
    assert_eq!(created["zipCode"], "00000");
    assert_eq!(created["isPrimary"], false);
    let id = created["id"].as_str().expect("generated id").to_string();

    let response = app
        .send("GET", &format!("/addresses/{id}"), Some(&token), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, created);

    let response = app
        .send("GET", "/address", Some(&token), Some(json!({ "addressId": id })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_with_missing_field_returns_400() {
    let app = test_app(StoreBackend::Memory).await;
    let token = app.token("u1", Role::Customer);
    let mut body = address_body("u1");
    body.as_object_mut().expect("object").remove("zipCode");

    let response = app.send("POST", "/addresses", Some(&token), Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "zipCode is required");

    let admin = app.token("root", Role::Admin);
    let response = app.send("GET", "/addresses", Some(&admin), None).await;
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn malformed_json_body_returns_400() {
    let app = test_app(StoreBackend::Memory).await;
    let token = app.token("u1", Role::Customer);
    let request = Request::post("/addresses")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = app.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn customers_only_see_their_own_addresses() {
    let app = test_app(StoreBackend::Memory).await;
    let alice = app.token("alice", Role::Customer);
    let admin = app.token("root", Role::Admin);
    create(&app, &alice, "alice").await;
    create(&app, &admin, "bob").await;

    let response = app
        .send("GET", "/addresses/owner/bob", Some(&alice), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().expect("list").len(), 1);
    assert_eq!(listed[0]["ownerId"], "alice");

    let response = app
        .send("GET", "/addresses/owner/bob", Some(&admin), None)
        .await;
    let listed = json_body(response).await;
    assert_eq!(listed[0]["ownerId"], "bob");

    let response = app
        .send("GET", "/addresses/owner", Some(&admin), Some(json!({ "ownerId": "carol" })))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["message"], "no addresses found for user carol");
    assert_eq!(body["error"], body["message"]);
}

#[tokio::test]
async fn list_all_spans_owners_for_admins_only() {
    let app = test_app(StoreBackend::Memory).await;
    let admin = app.token("root", Role::Admin);
    let customer = app.token("a", Role::Customer);
    create(&app, &admin, "a").await;
    create(&app, &admin, "b").await;

    let response = app.send("GET", "/addresses", Some(&customer), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "forbidden");

    let response = app.send("GET", "/addresses", Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().expect("list").len(), 2);
}

#[tokio::test]
async fn set_primary_switches_between_addresses() {
    let app = test_app(StoreBackend::Sqlite).await;
    let token = app.token("u1", Role::Customer);
    let a = create(&app, &token, "u1").await;
    let b = create(&app, &token, "u1").await;
    let a_id = a["id"].as_str().expect("id");
    let b_id = b["id"].as_str().expect("id");

    let response = app
        .send("GET", "/addresses/primary/u1", Some(&token), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(
            "PATCH",
            &format!("/addresses/primary/u1/{a_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "primary address updated");

    let response = app
        .send("GET", "/addresses/primary/u1", Some(&token), None)
        .await;
    assert_eq!(json_body(response).await["id"], a_id);

    let response = app
        .send(
            "POST",
            "/addresses/primary",
            Some(&token),
            Some(json!({ "userId": "u1", "addressId": b_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let a = json_body(
        app.send("GET", &format!("/addresses/{a_id}"), Some(&token), None)
            .await,
    )
    .await;
    let b = json_body(
        app.send("GET", &format!("/addresses/{b_id}"), Some(&token), None)
            .await,
    )
    .await;
    assert_eq!(a["isPrimary"], false);
    assert_eq!(b["isPrimary"], true);
}

#[tokio::test]
async fn set_primary_on_foreign_address_returns_404() {
    let app = test_app(StoreBackend::Memory).await;
    let token = app.token("u1", Role::Customer);
    let theirs = create(&app, &token, "u2").await;

    let response = app
        .send(
            "PATCH",
            &format!("/addresses/primary/u1/{}", theirs["id"].as_str().expect("id")),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_merges_patch_and_404s_unknown_id() {
    let app = test_app(StoreBackend::Memory).await;
    let token = app.token("u1", Role::Customer);
    let created = create(&app, &token, "u1").await;
    let id = created["id"].as_str().expect("id");

    let response = app
        .send(
            "PATCH",
            &format!("/addresses/{id}"),
            Some(&token),
            Some(json!({ "city": "Recife", "country": "BR", "isPrimary": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response).await;
    assert_eq!(updated["city"], "Recife");
    assert_eq!(updated["country"], "BR");
    assert_eq!(updated["street"], "Main");
    assert_eq!(updated["isPrimary"], false);

    let response = app
        .send(
            "PUT",
            "/address",
            Some(&token),
            Some(json!({ "addressId": "00000000-0000-4000-8000-000000000000", "city": "X" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_twice_returns_200_then_404() {
    let app = test_app(StoreBackend::Sqlite).await;
    let token = app.token("u1", Role::Customer);
    let created = create(&app, &token, "u1").await;
    let uri = format!("/addresses/{}", created["id"].as_str().expect("id"));

    let response = app.send("DELETE", &uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "address deleted");

    let response = app.send("DELETE", &uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send("GET", &uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = test_app(StoreBackend::Memory).await;
    let token = app.token("u1", Role::Customer);
    let mut body = address_body("u1");
    body["street"] = Value::String("x".repeat(32 * 1024));

    let response = app.send("POST", "/addresses", Some(&token), Some(body)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
