//! HTTP-level tests for the auth and admin surfaces, run in-process against
//! the real router with an in-memory store.

mod common;

use axum::http::{Method, StatusCode, header};
use serde_json::json;

use common::{PASSWORD, SoftAuthenticator, TestApp};
use stagehand::server::auth::{FEDERATION_SECRET_HEADER, SESSION_COOKIE};
use stagehand::sweeper;
use stagehand::types::Role;

const RP_ID: &str = "localhost";
const ORIGIN: &str = "http://localhost:8090";

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let resp = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, "OK");
}

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::new();

    let resp = app
        .post(
            "/api/auth/register",
            None,
            json!({"email": "a@x.com", "password": PASSWORD, "name": "A"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.data()["user"]["email"], "a@x.com");
    assert!(resp.data()["user"].get("password_hash").is_none());

    let resp = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "a@x.com", "password": PASSWORD}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let tokens = &resp.data()["tokens"];
    assert!(tokens["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(tokens["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(tokens["token_type"], "Bearer");

    let resp = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "a@x.com", "password": "wrong password"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["code"], "unauthorized");
    assert!(resp.headers.contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new();
    app.register("dup@x.com", "Dup").await;

    let resp = app
        .post(
            "/api/auth/register",
            None,
            json!({"email": "DUP@x.com", "password": PASSWORD, "name": "Again"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.body["code"], "conflict");
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let app = TestApp::new();

    let resp = app.request(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app.get("/api/auth/me", "not-a-token").await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let token = app.register("me@x.com", "Me").await;
    let resp = app.get("/api/auth/me", &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["email"], "me@x.com");
    assert_eq!(resp.data()["passkeys"], json!([]));
}

#[tokio::test]
async fn test_refresh_rotation_revokes_predecessor() {
    let app = TestApp::new();
    let resp = app
        .post(
            "/api/auth/register",
            None,
            json!({"email": "r@x.com", "password": PASSWORD, "name": "R"}),
        )
        .await;
    let refresh = resp.data()["tokens"]["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .post("/api/auth/refresh", None, json!({"refresh_token": refresh}))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_ne!(resp.data()["refresh_token"], refresh);

    let resp = app
        .post("/api/auth/refresh", None, json!({"refresh_token": refresh}))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revocation_survives_sweep() {
    let app = TestApp::new();
    let resp = app
        .post(
            "/api/auth/register",
            None,
            json!({"email": "d@x.com", "password": PASSWORD, "name": "D"}),
        )
        .await;
    let access = resp.data()["tokens"]["access_token"].as_str().unwrap().to_string();
    let refresh = resp.data()["tokens"]["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .post(
            "/api/auth/logout",
            Some(access.as_str()),
            json!({"refresh_token": refresh}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .post("/api/auth/refresh", None, json!({"refresh_token": refresh}))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let report = sweeper::sweep_once(&app.state.rooms, &app.state.tokens);
    assert_eq!(report.revocations_removed, 0);

    let resp = app
        .post("/api/auth/refresh", None, json!({"refresh_token": refresh}))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guest_login() {
    let app = TestApp::new();
    let resp = app
        .post("/api/auth/guest-login", None, json!({"name": "Visitor"}))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.data()["user"]["provider"], "guest");
    assert_eq!(resp.data()["user"]["roles"], json!(["guest"]));

    let resp = app
        .post("/api/auth/guest-login", None, json!({"name": "  "}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["code"], "validation_error");
}

#[tokio::test]
async fn test_federated_callback_requires_shared_secret() {
    let app = TestApp::new();
    let body = json!({
        "provider": "google",
        "email": "fed@x.com",
        "name": "Fed",
        "avatar_url": "https://img.example.com/fed.png"
    });

    let resp = app
        .post("/api/auth/federated/callback", None, body.clone())
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .request_with(
            Method::POST,
            "/api/auth/federated/callback",
            None,
            Some(body.clone()),
            &[(FEDERATION_SECRET_HEADER, "wrong")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .request_with(
            Method::POST,
            "/api/auth/federated/callback",
            None,
            Some(body),
            &[(FEDERATION_SECRET_HEADER, "federation-shared-secret")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["user"]["provider"], "google");
    assert_eq!(
        resp.data()["user"]["avatar_url"],
        "https://img.example.com/fed.png"
    );
}

#[tokio::test]
async fn test_federated_login_disabled_without_secret() {
    let mut config = common::test_config();
    config.auth.federation_secret = None;
    let app = TestApp::with_config(config);

    let resp = app
        .request_with(
            Method::POST,
            "/api/auth/federated/callback",
            None,
            Some(json!({"provider": "google", "email": "f@x.com", "name": "F"})),
            &[(FEDERATION_SECRET_HEADER, "anything")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_passkey_signup_and_login_over_http() {
    let app = TestApp::new();
    let mut authenticator = SoftAuthenticator::new(9);

    let begin = app
        .post(
            "/api/auth/passkey/signup/begin",
            None,
            json!({"email": "pk@x.com", "name": "Passkey User"}),
        )
        .await;
    assert_eq!(begin.status, StatusCode::OK);
    let sid = begin.cookie(SESSION_COOKIE).expect("session cookie");
    let cookie = format!("{SESSION_COOKIE}={sid}");
    let challenge = begin.data()["challenge"].as_str().unwrap().to_string();
    assert_eq!(begin.data()["rp"]["id"], RP_ID);

    let finish = app
        .request_with(
            Method::POST,
            "/api/auth/passkey/signup/finish",
            None,
            Some(authenticator.attestation(&challenge, RP_ID, ORIGIN)),
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(finish.status, StatusCode::CREATED, "{}", finish.body);
    assert_eq!(finish.data()["user"]["provider"], "passkey");
    let access = finish.data()["tokens"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let me = app.get("/api/auth/me", &access).await;
    assert_eq!(me.data()["passkeys"].as_array().unwrap().len(), 1);

    let begin = app
        .request_with(
            Method::POST,
            "/api/auth/passkey/login/begin",
            None,
            None,
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(begin.status, StatusCode::OK);
    assert!(begin.cookie(SESSION_COOKIE).is_none());
    let challenge = begin.data()["challenge"].as_str().unwrap().to_string();

    let login = app
        .request_with(
            Method::POST,
            "/api/auth/passkey/login/finish",
            None,
            Some(authenticator.assertion(&challenge, RP_ID, ORIGIN)),
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.body);
    assert_eq!(login.data()["user"]["email"], "pk@x.com");

    // The challenge was consumed by the first finish.
    let again = app
        .request_with(
            Method::POST,
            "/api/auth/passkey/login/finish",
            None,
            Some(authenticator.assertion(&challenge, RP_ID, ORIGIN)),
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(again.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_passkey_finish_without_session_cookie() {
    let app = TestApp::new();
    let authenticator = SoftAuthenticator::new(4);

    let resp = app
        .post(
            "/api/auth/passkey/signup/finish",
            None,
            authenticator.attestation("AQID", RP_ID, ORIGIN),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

async fn passkey_login(
    app: &TestApp,
    cookie: &str,
    authenticator: &mut SoftAuthenticator,
) -> common::TestResponse {
    let begin = app
        .request_with(
            Method::POST,
            "/api/auth/passkey/login/begin",
            None,
            None,
            &[("cookie", cookie)],
        )
        .await;
    let challenge = begin.data()["challenge"].as_str().unwrap().to_string();
    app.request_with(
        Method::POST,
        "/api/auth/passkey/login/finish",
        None,
        Some(authenticator.assertion(&challenge, RP_ID, ORIGIN)),
        &[("cookie", cookie)],
    )
    .await
}

#[tokio::test]
async fn test_passkey_replay_flags_credential() {
    let app = TestApp::new();
    let token = app.register("clone@x.com", "Clone").await;
    let mut authenticator = SoftAuthenticator::new(6);

    let begin = app
        .request(Method::POST, "/api/auth/passkey/register/begin", Some(token.as_str()), None)
        .await;
    let sid = begin.cookie(SESSION_COOKIE).expect("session cookie");
    let cookie = format!("{SESSION_COOKIE}={sid}");
    let challenge = begin.data()["challenge"].as_str().unwrap().to_string();

    let finish = app
        .request_with(
            Method::POST,
            "/api/auth/passkey/register/finish",
            Some(token.as_str()),
            Some(authenticator.attestation(&challenge, RP_ID, ORIGIN)),
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(finish.status, StatusCode::CREATED, "{}", finish.body);

    assert_eq!(passkey_login(&app, &cookie, &mut authenticator).await.status, StatusCode::OK);

    // A cloned authenticator presents a counter that did not advance.
    authenticator.counter = 0;
    let resp = passkey_login(&app, &cookie, &mut authenticator).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["code"], "replay_detected");

    // Once flagged, even a well-behaved counter is refused.
    authenticator.counter = 10;
    let resp = passkey_login(&app, &cookie, &mut authenticator).await;
    assert_eq!(resp.body["code"], "replay_detected");

    let passkeys = app.get("/api/auth/passkeys", &token).await;
    assert_eq!(passkeys.data()[0]["clone_suspected"], true);
}

#[tokio::test]
async fn test_delete_passkey() {
    let app = TestApp::new();
    let token = app.register("del@x.com", "Del").await;
    let authenticator = SoftAuthenticator::new(8);

    let begin = app
        .request(Method::POST, "/api/auth/passkey/register/begin", Some(token.as_str()), None)
        .await;
    let cookie = format!(
        "{SESSION_COOKIE}={}",
        begin.cookie(SESSION_COOKIE).expect("session cookie")
    );
    let challenge = begin.data()["challenge"].as_str().unwrap().to_string();
    let finish = app
        .request_with(
            Method::POST,
            "/api/auth/passkey/register/finish",
            Some(token.as_str()),
            Some(authenticator.attestation(&challenge, RP_ID, ORIGIN)),
            &[("cookie", cookie.as_str())],
        )
        .await;
    let id = finish.data()["id"].as_str().unwrap().to_string();

    let uri = format!("/api/auth/passkeys/{id}");
    let resp = app.request(Method::DELETE, &uri, Some(token.as_str()), None).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.request(Method::DELETE, &uri, Some(token.as_str()), None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

async fn admin_token(app: &TestApp, email: &str, role: Role) -> String {
    app.register(email, "Admin").await;
    app.state.auth.grant_role(email, role).expect("grant role");
    let resp = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": email, "password": PASSWORD}),
        )
        .await;
    resp.data()["tokens"]["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::new();
    let token = app.register("plain@x.com", "Plain").await;

    let resp = app.get("/api/admin/users", &token).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let admin = admin_token(&app, "admin@x.com", Role::Admin).await;
    let resp = app.get("/api/admin/users", &admin).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data().as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_deactivates_user() {
    let app = TestApp::new();
    let admin = admin_token(&app, "admin@x.com", Role::Admin).await;
    let victim = app.register("victim@x.com", "Victim").await;
    let victim_id = app.get("/api/auth/me", &victim).await.data()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let admin_id = app.get("/api/auth/me", &admin).await.data()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .request(
            Method::PUT,
            &format!("/api/admin/users/{admin_id}/status"),
            Some(admin.as_str()),
            Some(json!({"is_active": false})),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .request(
            Method::PUT,
            &format!("/api/admin/users/{victim_id}/status"),
            Some(admin.as_str()),
            Some(json!({"is_active": false})),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["is_active"], false);

    let resp = app.get("/api/auth/me", &victim).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "victim@x.com", "password": PASSWORD}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_only_superadmin_grants_admin() {
    let app = TestApp::new();
    let admin = admin_token(&app, "admin@x.com", Role::Admin).await;
    let root = admin_token(&app, "root@x.com", Role::SuperAdmin).await;
    let user = app.register("u@x.com", "U").await;
    let user_id = app.get("/api/auth/me", &user).await.data()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/admin/users/{user_id}/roles");

    let resp = app
        .request(Method::PUT, &uri, Some(admin.as_str()), Some(json!({"roles": ["admin"]})))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .request(
            Method::PUT,
            &uri,
            Some(admin.as_str()),
            Some(json!({"roles": ["user", "moderator"]})),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .request(Method::PUT, &uri, Some(admin.as_str()), Some(json!({"roles": ["wizard"]})))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .request(Method::PUT, &uri, Some(root.as_str()), Some(json!({"roles": ["admin"]})))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["roles"], json!(["admin"]));
}

#[tokio::test]
async fn test_admin_deletes_user() {
    let app = TestApp::new();
    let admin = admin_token(&app, "admin@x.com", Role::Admin).await;
    let user = app.register("gone@x.com", "Gone").await;
    let user_id = app.get("/api/auth/me", &user).await.data()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/api/admin/users/{user_id}");
    let resp = app.request(Method::DELETE, &uri, Some(admin.as_str()), None).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.get("/api/auth/me", &user).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
