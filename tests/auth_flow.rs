mod common;

use common::app;
use creatorspace_lib::application::ports::SignUpOutcome;
use creatorspace_lib::application::services::SignUpRequest;
use creatorspace_lib::shared::error::RemoteErrorKind;

fn request(email: &str, username: &str) -> SignUpRequest {
    SignUpRequest {
        email: email.into(),
        password: "correct horse".into(),
        password_confirmation: "correct horse".into(),
        username: username.into(),
    }
}

#[tokio::test]
async fn sign_up_sign_out_sign_in() {
    let (state, backend) = app().await;

    let outcome = state
        .auth
        .sign_up(request("ada@example.com", "ada_l"))
        .await
        .unwrap();
    let SignUpOutcome::SignedIn(session) = outcome else {
        panic!("expected an immediate session");
    };
    assert_eq!(state.auth.current_user().await, Some(session.user.clone()));
    assert_eq!(backend.rows("profiles").await.len(), 4);

    state.auth.sign_out().await.unwrap();
    assert!(state.auth.current_session().await.is_none());
    // signing out twice is a no-op
    state.auth.sign_out().await.unwrap();

    let err = state
        .auth
        .sign_in("ada@example.com", "wrong password")
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Auth));

    let again = state
        .auth
        .sign_in("ada@example.com", "correct horse")
        .await
        .unwrap();
    assert_eq!(again.user.id, session.user.id);
}

#[tokio::test]
async fn sign_up_validation_collects_every_field() {
    let (state, backend) = app().await;
    let mut bad = request("not-an-email", "No Spaces!");
    bad.password_confirmation = "different".into();

    let err = state.auth.sign_up(bad).await.unwrap_err();
    assert!(err.is_validation());
    let rendered = err.to_string();
    assert!(rendered.contains("email"), "{rendered}");
    assert!(rendered.contains("username"), "{rendered}");
    assert_eq!(backend.rows("profiles").await.len(), 3);
}

#[tokio::test]
async fn confirmation_required_leaves_no_session() {
    let (state, backend) = app().await;
    backend.require_email_confirmation(true);

    let outcome = state
        .auth
        .sign_up(request("grace@example.com", "grace_h"))
        .await
        .unwrap();
    assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired(_)));
    assert!(state.auth.current_session().await.is_none());
}

#[tokio::test]
async fn password_reset_and_change() {
    let (state, backend) = app().await;
    state
        .auth
        .request_password_reset("ada@example.com", None)
        .await
        .unwrap();
    assert_eq!(backend.password_resets().await, vec!["ada@example.com".to_string()]);

    // changing the password needs a session
    assert!(state
        .auth
        .update_password("battery staple", "battery staple")
        .await
        .is_err());

    state
        .auth
        .sign_up(request("ada@example.com", "ada_l"))
        .await
        .unwrap();
    state
        .auth
        .update_password("battery staple", "battery staple")
        .await
        .unwrap();
    state.auth.sign_out().await.unwrap();
    state
        .auth
        .sign_in("ada@example.com", "battery staple")
        .await
        .unwrap();
}
