use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::Utc;

use nexsy_api::auth::{login, register};
use nexsy_api::health::health;
use nexsy_api::messages::get_messages;
use nexsy_api::users::list_users;
use nexsy_api::{AppState, AppStateInner, Credentials};
use nexsy_db::Database;
use nexsy_types::api::{Claims, LoginRequest, RegisterRequest};
use nexsy_types::models::Message;

fn state() -> AppState {
    let db = Arc::new(Database::open_in_memory().unwrap());
    AppStateInner::new(db, Credentials::new("handlers-test-secret", 7))
}

fn register_req(username: &str, password: &str) -> Json<RegisterRequest> {
    Json(RegisterRequest {
        username: username.into(),
        password: password.into(),
        email: None,
    })
}

fn login_req(username: &str, password: &str) -> Json<LoginRequest> {
    Json(LoginRequest {
        username: username.into(),
        password: password.into(),
    })
}

#[tokio::test]
async fn register_then_login_issues_a_token_for_the_username() {
    let state = state();

    let (status, Json(body)) = register(State(state.clone()), register_req("amy", "secret1"))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.success);

    let Json(session) = login(State(state.clone()), login_req("amy", "secret1"))
        .await
        .unwrap();
    assert!(session.success);
    assert_eq!(session.user.username, "amy");
    assert_eq!(state.credentials.verify(&session.token).unwrap().sub, "amy");

    // Login stamps presence the same way a socket registration does.
    let amy = state.db.get_user_by_username("amy").unwrap().unwrap();
    assert!(amy.is_online);
}

#[tokio::test]
async fn register_validates_input() {
    let state = state();

    let cases = [
        ("", "secret1", "Username and password required"),
        ("amy", "", "Username and password required"),
        ("am", "secret1", "Username must be at least 3 characters"),
        ("amy", "12345", "Password must be at least 6 characters"),
    ];
    for (username, password, expected) in cases {
        let err = register(State(state.clone()), register_req(username, password))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), expected);
    }

    register(State(state.clone()), register_req("amy", "secret1"))
        .await
        .unwrap();
    let err = register(State(state.clone()), register_req("amy", "other-pass"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.message(), "Username already taken");
}

#[tokio::test]
async fn registration_losing_the_insert_race_is_a_conflict() {
    let state = state();

    // Both lookups are issued before either insert, so the second insert
    // finds the name already taken.
    let (a, b) = tokio::join!(
        register(State(state.clone()), register_req("amy", "secret1")),
        register(State(state.clone()), register_req("amy", "secret2")),
    );

    let mut outcomes = [a, b];
    outcomes.sort_by_key(|r| r.is_err());
    let [winner, loser] = outcomes;
    assert_eq!(winner.unwrap().0, StatusCode::CREATED);
    let err = loser.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.message(), "Username already taken");
}

#[tokio::test]
async fn login_rejects_unknown_user_and_wrong_password_alike() {
    let state = state();
    register(State(state.clone()), register_req("amy", "secret1"))
        .await
        .unwrap();

    for (username, password) in [("nobody", "secret1"), ("amy", "wrong-pass")] {
        let err = login(State(state.clone()), login_req(username, password))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Invalid username or password");
    }

    let amy = state.db.get_user_by_username("amy").unwrap().unwrap();
    assert!(!amy.is_online);
}

#[tokio::test]
async fn history_has_only_the_callers_live_messages() {
    let state = state();
    for user in ["amy", "bob", "carol"] {
        state.db.create_user(user, None, "x", Utc::now()).unwrap();
    }
    let first = Message::new("bob", "amy", "first", Utc::now());
    let second = Message::new("amy", "bob", "second", Utc::now());
    let unrelated = Message::new("bob", "carol", "not for amy", Utc::now());
    let gone = Message::new("bob", "amy", "deleted", Utc::now());
    for m in [&first, &second, &unrelated, &gone] {
        state.db.insert_message(m).unwrap();
    }
    state.db.soft_delete(gone.id, Utc::now()).unwrap();

    let claims = Claims {
        sub: "amy".into(),
        exp: usize::MAX,
    };
    let Json(body) = get_messages(State(state.clone()), Extension(claims))
        .await
        .unwrap();
    assert!(body.success);
    let texts: Vec<_> = body.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn roster_is_sorted_and_health_reports_database() {
    let state = state();
    for user in ["zed", "amy", "mia"] {
        state.db.create_user(user, None, "x", Utc::now()).unwrap();
    }

    let Json(users) = list_users(State(state.clone())).await.unwrap();
    let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["amy", "mia", "zed"]);
    assert!(users.iter().all(|u| !u.is_online));

    let Json(report) = health(State(state)).await;
    assert_eq!(report.status, "OK");
    assert_eq!(report.database, "connected");
}
