//! End-to-end tests over real sockets
//!
//! The issuer and the resource API run as separate listeners; the API learns
//! the issuer's key only through `GET /.well-known/jwks.json`.

use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use axum::Router;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use team_checkin::api::{self, AppState, model::CheckinBoard};
use team_checkin::auth::handler::{AuthState, create_router};
use team_checkin::auth::{
    AccessGate, AttemptLimiter, CredentialStore, FileUserStore, HttpJwksSource, Identity,
    InMemoryUserStore, KeyProvider, Role, TokenIssuer, TokenVerifier, UserStore,
};
use team_checkin::config::DEFAULT_KEY_ID;

static KEYS: LazyLock<Arc<KeyProvider>> =
    LazyLock::new(|| Arc::new(KeyProvider::generate(DEFAULT_KEY_ID).unwrap()));

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

fn auth_app(keys: Arc<KeyProvider>, store: Arc<dyn UserStore>) -> Router {
    let state = AuthState {
        credentials: Arc::new(CredentialStore::new(store, 4).unwrap()),
        issuer: TokenIssuer::new(Arc::clone(&keys), Duration::from_secs(3600)),
        keys,
        started_at: Instant::now(),
    };
    create_router(
        state,
        Arc::new(AttemptLimiter::for_auth(0, Duration::from_secs(60))),
        64 * 1024,
    )
}

fn api_app(jwks_url: String) -> Router {
    let source = HttpJwksSource::new(jwks_url, Duration::from_secs(2)).unwrap();
    let verifier = TokenVerifier::new(Arc::new(source), Duration::from_secs(30));
    let state = AppState {
        gate: AccessGate::new(Arc::new(verifier)),
        board: Arc::new(CheckinBoard::new()),
        started_at: Instant::now(),
    };
    api::create_router(
        state,
        Arc::new(AttemptLimiter::for_api(0, Duration::from_secs(60))),
        &["http://localhost:3000".to_string()],
        64 * 1024,
    )
}

struct Deployment {
    client: reqwest::Client,
    auth: String,
    api: String,
}

impl Deployment {
    async fn start() -> Self {
        let auth_addr = spawn(auth_app(Arc::clone(&*KEYS), Arc::new(InMemoryUserStore::new()))).await;
        let api_addr = spawn(api_app(format!("http://{auth_addr}/.well-known/jwks.json"))).await;
        Self {
            client: reqwest::Client::new(),
            auth: format!("http://{auth_addr}"),
            api: format!("http://{api_addr}"),
        }
    }

    async fn signup_and_login(&self, email: &str, role: &str) -> String {
        let signup = self
            .client
            .post(format!("{}/signup", self.auth))
            .json(&json!({"email": email, "password": "Str0ng!Pass", "role": role}))
            .send()
            .await
            .unwrap();
        assert_eq!(signup.status(), StatusCode::CREATED);

        let login: Value = self
            .client
            .post(format!("{}/login", self.auth))
            .json(&json!({"email": email, "password": "Str0ng!Pass"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        login["token"].as_str().unwrap().to_string()
    }

    async fn api_call(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.api))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }
}

#[tokio::test]
async fn manager_and_member_flow_across_services() {
    // GIVEN: both services running, a manager and a member signed up
    let deployment = Deployment::start().await;
    let manager = deployment.signup_and_login("m@x.com", "manager").await;
    let member = deployment.signup_and_login("t@x.com", "member").await;

    // WHEN: the manager creates a check-in through the API
    let (status, check_in) = deployment
        .api_call(
            reqwest::Method::POST,
            "/checkins",
            &manager,
            Some(json!({
                "title": "Sprint retro",
                "dueDate": "2030-01-15T17:00:00Z",
                "questions": [{"text": "What went well?"}]
            })),
        )
        .await;

    // THEN: it is created, visible to the member, and answerable only by the member
    assert_eq!(status, StatusCode::CREATED);

    let (status, listed) = deployment
        .api_call(reqwest::Method::GET, "/checkins", &member, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = deployment
        .api_call(
            reqwest::Method::POST,
            "/checkins",
            &member,
            Some(json!({"title": "Nope", "dueDate": "2030-01-15", "questions": [{"text": "Why?"}]})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = deployment
        .api_call(
            reqwest::Method::POST,
            "/responses",
            &member,
            Some(json!({
                "checkInId": check_in["id"],
                "answers": [{"questionId": check_in["questions"][0]["id"], "answer": "Shipping"}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, report) = deployment
        .api_call(reqwest::Method::GET, "/reports/summary", &manager, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["summary"][0]["count"], 1);
}

#[tokio::test]
async fn published_jwks_matches_issuer_key() {
    let deployment = Deployment::start().await;

    let jwks: Value = deployment
        .client
        .get(format!("{}/.well-known/jwks.json", deployment.auth))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let key = &jwks["keys"][0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["use"], "sig");
    assert_eq!(key["kid"], DEFAULT_KEY_ID);
    assert_eq!(key["e"], "AQAB");
}

#[tokio::test]
async fn token_from_another_issuer_is_rejected() {
    // GIVEN: a second issuer using the same kid but its own key
    let deployment = Deployment::start().await;
    deployment.signup_and_login("m@x.com", "manager").await;

    let rogue_keys = Arc::new(KeyProvider::generate(DEFAULT_KEY_ID).unwrap());
    let rogue_addr = spawn(auth_app(rogue_keys, Arc::new(InMemoryUserStore::new()))).await;
    let rogue = Deployment {
        client: reqwest::Client::new(),
        auth: format!("http://{rogue_addr}"),
        api: deployment.api.clone(),
    };
    let forged = rogue.signup_and_login("m@x.com", "manager").await;

    // WHEN: its token is presented to the real API
    let (status, body) = deployment
        .api_call(reqwest::Method::GET, "/checkins", &forged, None)
        .await;

    // THEN: the signature check fails
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or missing authorization token");
}

#[tokio::test]
async fn api_fails_closed_when_issuer_is_unreachable() {
    // Bind then drop to get a port nobody listens on
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let api_addr = spawn(api_app(format!("http://{dead_addr}/.well-known/jwks.json"))).await;
    let issuer = TokenIssuer::new(Arc::clone(&*KEYS), Duration::from_secs(3600));
    let token = issuer
        .issue(&Identity {
            id: "u1".to_string(),
            email: "m@x.com".to_string(),
            password_hash: String::new(),
            role: Role::Manager,
        })
        .unwrap();

    let response = reqwest::Client::new()
        .get(format!("http://{api_addr}/checkins"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn file_store_keeps_accounts_across_restarts() {
    // GIVEN: an issuer backed by a user document
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    let store = Arc::new(FileUserStore::open(&path).await.unwrap());
    let first = spawn(auth_app(Arc::clone(&*KEYS), store)).await;
    let client = reqwest::Client::new();

    let signup = client
        .post(format!("http://{first}/signup"))
        .json(&json!({"email": "m@x.com", "password": "Str0ng!Pass", "role": "manager"}))
        .send()
        .await
        .unwrap();
    assert_eq!(signup.status(), StatusCode::CREATED);

    // WHEN: a new issuer opens the same document
    let reopened = Arc::new(FileUserStore::open(&path).await.unwrap());
    let second = spawn(auth_app(Arc::clone(&*KEYS), reopened)).await;

    // THEN: the account can still log in
    let login = client
        .post(format!("http://{second}/login"))
        .json(&json!({"email": "m@x.com", "password": "Str0ng!Pass"}))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);
    let body: Value = login.json().await.unwrap();
    assert_eq!(body["user"]["role"], "manager");
}
