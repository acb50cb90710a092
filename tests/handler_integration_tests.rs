use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use yamdb_api::{
    AppConfig, AppState, InMemoryRepository, MockNotifier, accounts,
    auth::{TokenKind, issue_token},
    create_router,
    repository::PageRequest,
};

// --- Test Harness ---

/// An application wired to the in-memory repository and a recording notifier,
/// driven in-process through `oneshot`.
struct TestApp {
    router: Router,
    state: AppState,
    notifier: Arc<MockNotifier>,
}

impl TestApp {
    fn new() -> Self {
        let notifier = Arc::new(MockNotifier::new());
        let state = AppState {
            repo: Arc::new(InMemoryRepository::new()),
            notifier: notifier.clone(),
            config: AppConfig::default(),
        };

        TestApp {
            router: create_router(state.clone()),
            state,
            notifier,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, token, Some(body)).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }

    /// The code currently stored for `username`.
    async fn stored_code(&self, username: &str) -> Option<String> {
        self.state
            .repo
            .get_user_by_username(username)
            .await
            .unwrap()
            .and_then(|user| user.confirmation_code)
    }

    /// Signs up `username` and exchanges the code for an access token.
    async fn register(&self, username: &str) -> String {
        let (status, _) = self
            .post(
                "/api/v1/auth/signup/",
                None,
                json!({ "username": username, "email": format!("{username}@example.com") }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let code = self.stored_code(username).await.expect("code stored on signup");
        let (status, body) = self
            .post(
                "/api/v1/auth/token/",
                None,
                json!({ "username": username, "confirmation_code": code }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        let admin = accounts::ensure_admin(&self.state.repo, "root", "root@example.com")
            .await
            .unwrap();
        issue_token(&self.state.config, admin.id, TokenKind::Access).unwrap()
    }

    /// Creates a bare title as admin and returns its id.
    async fn create_title(&self, admin: &str, name: &str) -> i64 {
        let (status, body) = self
            .post(
                "/api/v1/titles/",
                Some(admin),
                json!({ "name": name, "year": 1999 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    async fn review(&self, token: &str, title_id: i64, score: i64) -> (StatusCode, Value) {
        self.post(
            &format!("/api/v1/titles/{title_id}/reviews/"),
            Some(token),
            json!({ "text": "Worth watching.", "score": score }),
        )
        .await
    }
}

fn error_fields(body: &Value) -> &Value {
    &body["error"]["fields"]
}

// --- Signup & Tokens ---

#[tokio::test]
async fn test_signup_mails_code_and_token_exchange_works_once() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/v1/auth/signup/",
            None,
            json!({ "username": "alice", "email": "alice@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "username": "alice", "email": "alice@example.com" }));

    // Delivery runs on a spawned task.
    let mut mailed = None;
    for _ in 0..10 {
        tokio::task::yield_now().await;
        mailed = app.notifier.last_code_for("alice");
        if mailed.is_some() {
            break;
        }
    }
    let code = mailed.expect("confirmation code should be mailed");
    assert_eq!(app.stored_code("alice").await.as_deref(), Some(code.as_str()));

    let (status, body) = app
        .post(
            "/api/v1/auth/token/",
            None,
            json!({ "username": "alice", "confirmation_code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert!(body["refresh"].is_string());

    let (status, me) = app.get("/api/v1/users/me/", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["role"], "user");

    // The code was consumed.
    let (status, _) = app
        .post(
            "/api/v1/auth/token/",
            None,
            json!({ "username": "alice", "confirmation_code": code }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_with_wrong_code_or_unknown_user() {
    let app = TestApp::new();
    app.post(
        "/api/v1/auth/signup/",
        None,
        json!({ "username": "bob", "email": "bob@example.com" }),
    )
    .await;

    let (status, body) = app
        .post(
            "/api/v1/auth/token/",
            None,
            json!({ "username": "bob", "confirmation_code": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["confirmation_code"].is_array());

    let (status, _) = app
        .post(
            "/api/v1/auth/token/",
            None,
            json!({ "username": "nobody", "confirmation_code": "whatever" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signup_repeat_reissues_code_but_clashes_are_rejected() {
    let app = TestApp::new();
    let payload = json!({ "username": "carol", "email": "carol@example.com" });

    app.post("/api/v1/auth/signup/", None, payload.clone()).await;
    let first = app.stored_code("carol").await.unwrap();

    let (status, _) = app.post("/api/v1/auth/signup/", None, payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(app.stored_code("carol").await.unwrap(), first);

    let (status, body) = app
        .post(
            "/api/v1/auth/signup/",
            None,
            json!({ "username": "carol", "email": "other@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["username"].is_array());

    let (status, body) = app
        .post(
            "/api/v1/auth/signup/",
            None,
            json!({ "username": "dave", "email": "carol@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["email"].is_array());
}

#[tokio::test]
async fn test_signup_rejects_reserved_and_invalid_usernames() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/v1/auth/signup/",
            None,
            json!({ "username": "me", "email": "me@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["username"].is_array());

    let (status, body) = app
        .post(
            "/api/v1/auth/signup/",
            None,
            json!({ "username": "has space", "email": "not-an-email" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["username"].is_array());
    assert!(error_fields(&body)["email"].is_array());
}

#[tokio::test]
async fn test_refresh_issues_new_access_token() {
    let app = TestApp::new();
    app.post(
        "/api/v1/auth/signup/",
        None,
        json!({ "username": "erin", "email": "erin@example.com" }),
    )
    .await;
    let code = app.stored_code("erin").await.unwrap();
    let (_, tokens) = app
        .post(
            "/api/v1/auth/token/",
            None,
            json!({ "username": "erin", "confirmation_code": code }),
        )
        .await;

    let (status, body) = app
        .post(
            "/api/v1/auth/token/refresh/",
            None,
            json!({ "refresh": tokens["refresh"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["token"].as_str().unwrap();
    let (status, _) = app.get("/api/v1/users/me/", Some(access)).await;
    assert_eq!(status, StatusCode::OK);

    // An access token is not a refresh token.
    let (status, _) = app
        .post(
            "/api/v1/auth/token/refresh/",
            None,
            json!({ "refresh": tokens["token"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post("/api/v1/auth/token/refresh/", None, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["refresh"].is_array());
}

// --- Users ---

#[tokio::test]
async fn test_me_requires_authentication_and_ignores_role_changes() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/v1/users/me/", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.register("frank").await;
    let (status, body) = app
        .patch(
            "/api/v1/users/me/",
            Some(&token),
            json!({ "bio": "Film buff", "role": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bio"], "Film buff");
    assert_eq!(body["role"], "user");

    let (status, body) = app.delete("/api/v1/users/me/", Some(&token)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["status"], 405);
}

#[tokio::test]
async fn test_user_administration_is_admin_only() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let user = app.register("grace").await;

    let (status, _) = app.get("/api/v1/users/", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/v1/users/", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post(
            "/api/v1/users/",
            Some(&admin),
            json!({ "username": "heidi", "email": "heidi@example.com", "role": "moderator" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "moderator");

    let (status, body) = app.get("/api/v1/users/?search=hei", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["username"], "heidi");

    let (status, body) = app
        .patch("/api/v1/users/grace/", Some(&admin), json!({ "role": "admin" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    // The promotion applies to grace's existing token.
    let (status, _) = app.get("/api/v1/users/", Some(&user)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.delete("/api/v1/users/heidi/", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get("/api/v1/users/heidi/", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Catalog ---

#[tokio::test]
async fn test_catalog_writes_need_admin_and_reads_are_public() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let user = app.register("ivan").await;
    let category = json!({ "name": "Films", "slug": "films" });

    let (status, _) = app.post("/api/v1/categories/", None, category.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .post("/api/v1/categories/", Some(&user), category.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post("/api/v1/categories/", Some(&admin), category.clone())
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, category);

    let (status, body) = app
        .post("/api/v1/categories/", Some(&admin), category)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["slug"].is_array());

    let (status, body) = app.get("/api/v1/categories/?search=fil", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _) = app
        .patch(
            "/api/v1/categories/films/",
            Some(&admin),
            json!({ "name": "Movies" }),
        )
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = app.delete("/api/v1/categories/films/", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete("/api/v1/categories/films/", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_title_creation_resolves_slugs_and_filters() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.post(
        "/api/v1/categories/",
        Some(&admin),
        json!({ "name": "Films", "slug": "films" }),
    )
    .await;
    app.post(
        "/api/v1/genres/",
        Some(&admin),
        json!({ "name": "Drama", "slug": "drama" }),
    )
    .await;

    let (status, body) = app
        .post(
            "/api/v1/titles/",
            Some(&admin),
            json!({
                "name": "The Matrix",
                "year": 1999,
                "genre": ["drama"],
                "category": "films"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["rating"], Value::Null);
    assert_eq!(body["category"]["slug"], "films");
    assert_eq!(body["genre"][0]["slug"], "drama");

    let (status, body) = app
        .post(
            "/api/v1/titles/",
            Some(&admin),
            json!({ "name": "Unknown", "year": 2001, "genre": ["nope"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["genre"].is_array());

    let (status, _) = app
        .post(
            "/api/v1/titles/",
            Some(&admin),
            json!({ "name": "Future", "year": 9999 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.create_title(&admin, "Another film").await;

    let (status, body) = app
        .get("/api/v1/titles/?genre=drama&name=matrix", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["name"], "The Matrix");

    let (status, body) = app.get("/api/v1/titles/?category=films", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _) = app.get("/api/v1/titles/?year=nineteen", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_title_update_can_detach_category() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.post(
        "/api/v1/categories/",
        Some(&admin),
        json!({ "name": "Books", "slug": "books" }),
    )
    .await;
    let (_, title) = app
        .post(
            "/api/v1/titles/",
            Some(&admin),
            json!({ "name": "Dune", "year": 1965, "category": "books" }),
        )
        .await;
    let id = title["id"].as_i64().unwrap();

    let (status, body) = app
        .patch(
            &format!("/api/v1/titles/{id}/"),
            Some(&admin),
            json!({ "description": "Spice." }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Spice.");
    assert_eq!(body["category"]["slug"], "books");

    let (status, body) = app
        .patch(
            &format!("/api/v1/titles/{id}/"),
            Some(&admin),
            json!({ "category": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], Value::Null);
}

// --- Reviews & Comments ---

#[tokio::test]
async fn test_rating_is_rounded_mean_of_scores() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let title_id = app.create_title(&admin, "Rated").await;

    for (name, score) in [("u1", 6), ("u2", 8), ("u3", 10)] {
        let token = app.register(name).await;
        let (status, body) = app.review(&token, title_id, score).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["author"], name);
        assert_eq!(body["score"], score);
    }

    let (status, body) = app.get(&format!("/api/v1/titles/{title_id}/"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], 8);

    let (status, body) = app
        .get(&format!("/api/v1/titles/{title_id}/reviews/"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn test_review_rules_one_per_author_and_score_bounds() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let title_id = app.create_title(&admin, "Strict").await;
    let token = app.register("judy").await;

    for score in [0, 11] {
        let (status, body) = app.review(&token, title_id, score).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_fields(&body)["score"].is_array());
    }

    let (status, _) = app.review(&token, title_id, 7).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.review(&token, title_id, 9).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["non_field_errors"].is_array());

    let (status, _) = app.review(&token, title_id + 1000, 7).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(
            &format!("/api/v1/titles/{title_id}/reviews/"),
            None,
            json!({ "text": "Anonymous", "score": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_only_author_or_staff_may_edit_review() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let title_id = app.create_title(&admin, "Contested").await;
    let author = app.register("kim").await;
    let stranger = app.register("lee").await;

    let (_, review) = app.review(&author, title_id, 5).await;
    let uri = format!("/api/v1/titles/{title_id}/reviews/{}/", review["id"]);

    let (status, _) = app.patch(&uri, Some(&stranger), json!({ "score": 1 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, Some(&stranger)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.patch(&uri, None, json!({ "score": 1 })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.patch(&uri, Some(&author), json!({ "score": 9 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 9);
    assert_eq!(body["text"], "Worth watching.");

    // Moderators may edit anyone's review.
    app.patch(
        "/api/v1/users/lee/",
        Some(&admin),
        json!({ "role": "moderator" }),
    )
    .await;
    let (status, _) = app.delete(&uri, Some(&stranger)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_lifecycle() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let title_id = app.create_title(&admin, "Discussed").await;
    let author = app.register("mia").await;
    let replier = app.register("ned").await;

    let (_, review) = app.review(&author, title_id, 6).await;
    let comments_uri = format!("/api/v1/titles/{title_id}/reviews/{}/comments/", review["id"]);

    let (status, body) = app
        .post(&comments_uri, Some(&replier), json!({ "text": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_fields(&body)["text"].is_array());

    let (status, comment) = app
        .post(&comments_uri, Some(&replier), json!({ "text": "Agreed." }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["author"], "ned");
    let comment_uri = format!("{comments_uri}{}/", comment["id"]);

    let (status, _) = app
        .patch(&comment_uri, Some(&author), json!({ "text": "Hijacked" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .patch(&comment_uri, Some(&replier), json!({ "text": "Fully agreed." }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Fully agreed.");

    let (status, body) = app.get(&comments_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    // A comment is only reachable under its own review.
    let wrong_uri = format!(
        "/api/v1/titles/{}/reviews/{}/comments/{}/",
        title_id + 1,
        review["id"],
        comment["id"]
    );
    let (status, _) = app.get(&wrong_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete(&comment_uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_deleting_title_cascades_to_reviews_and_comments() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let title_id = app.create_title(&admin, "Doomed").await;
    let token = app.register("olga").await;

    let (_, review) = app.review(&token, title_id, 4).await;
    let review_id = review["id"].as_i64().unwrap();
    let (status, _) = app
        .post(
            &format!("/api/v1/titles/{title_id}/reviews/{review_id}/comments/"),
            Some(&token),
            json!({ "text": "Self-reply" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .delete(&format!("/api/v1/titles/{title_id}/"), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .get(&format!("/api/v1/titles/{title_id}/reviews/"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(
        app.state
            .repo
            .get_review(title_id, review_id)
            .await
            .unwrap()
            .is_none()
    );
    let comments = app
        .state
        .repo
        .list_comments(review_id, PageRequest { page: 1, page_size: 10 })
        .await
        .unwrap();
    assert_eq!(comments.count, 0);
}

#[tokio::test]
async fn test_renamed_user_shows_new_name_on_existing_review_and_comment() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let title_id = app.create_title(&admin, "Renamed").await;
    let token = app.register("kim").await;

    let (_, review) = app.review(&token, title_id, 7).await;
    let review_id = review["id"].as_i64().unwrap();
    let reviews_uri = format!("/api/v1/titles/{title_id}/reviews/{review_id}/");
    let comments_uri = format!("{reviews_uri}comments/");
    let (status, comment) = app
        .post(&comments_uri, Some(&token), json!({ "text": "Still agree" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = comment["id"].as_i64().unwrap();
    assert_eq!(comment["author"], "kim");

    let (status, me) = app
        .patch("/api/v1/users/me/", Some(&token), json!({ "username": "kimmy" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "kimmy");

    let (status, review) = app.get(&reviews_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(review["author"], "kimmy");

    let (status, comment) = app
        .get(&format!("{comments_uri}{comment_id}/"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comment["author"], "kimmy");

    let (_, listed) = app
        .get(&format!("/api/v1/titles/{title_id}/reviews/"), None)
        .await;
    assert_eq!(listed["results"][0]["author"], "kimmy");
}

// --- Protocol ---

#[tokio::test]
async fn test_unsupported_verbs_and_paths_answer_in_json() {
    let app = TestApp::new();

    let (status, body) = app
        .send(Method::PUT, "/api/v1/titles/", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["status"], 405);

    let (status, body) = app.get("/api/v1/nowhere/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["status"], 404);

    let (status, _) = app.get("/api/v1/titles/abc/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pagination_links_and_out_of_range_page() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    for slug in ["a", "b", "c"] {
        app.post(
            "/api/v1/genres/",
            Some(&admin),
            json!({ "name": format!("Genre {slug}"), "slug": slug }),
        )
        .await;
    }

    let (status, body) = app.get("/api/v1/genres/?page=2&page_size=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["previous"], 1);
    assert_eq!(body["next"], Value::Null);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);

    let (status, _) = app.get("/api/v1/genres/?page=3&page_size=2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/signup/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_probe() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}
