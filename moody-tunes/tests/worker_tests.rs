//! Background tasks: top artists, song suggestions, OAuth linking

mod helpers;

use chrono::Utc;
use helpers::*;
use moody_common::db::{SCOPE_PLAYLIST_MODIFY, SCOPE_TOP_ARTIST_READ};
use moody_common::{Emotion, Error, VoteContext};
use moody_tunes::db::{oauth_states, provider_auth, songs, tasks, tasks::TaskStatus};
use moody_tunes::services::fetch_song::{fetch_song, FetchOutcome};
use moody_tunes::services::oauth::{CallbackOutcome, CallbackParams};
use moody_tunes::services::provider::AudioFeatures;
use moody_tunes::services::suggest::suggest_song;
use moody_tunes::services::top_artists::refresh_top_artists;
use moody_tunes::services::votes::CastVote;
use moody_tunes::workers::task::Task;

fn features(valence: f64, energy: f64, danceability: Option<f64>) -> Option<AudioFeatures> {
    Some(AudioFeatures {
        valence: Some(valence),
        energy: Some(energy),
        danceability,
    })
}

#[tokio::test]
async fn test_top_artists_refresh_stores_capped_list() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let auth = app.link_all_scopes(&alice).await;
    app.provider.with_state(|s| {
        s.top_artists = (1..=8).map(|i| format!("Artist {}", i)).collect();
    });

    let stored = refresh_top_artists(
        app.db(),
        app.provider.as_ref(),
        &app.state.auth_store,
        auth.id,
        5,
    )
    .await
    .unwrap();

    assert_eq!(stored, 5);
    let data = provider_auth::load_user_data(app.db(), auth.id).await.unwrap();
    assert_eq!(data.top_artists[0], "Artist 1");
    assert_eq!(data.top_artists.len(), 5);
}

#[tokio::test]
async fn test_top_artist_worker_refreshes_stale_token_first() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let auth = app.link_all_scopes(&alice).await;
    app.age_auth(auth.id, 7).await;
    app.provider.with_state(|s| s.top_artists = vec!["Madlib".to_string()]);

    app.state
        .queue
        .enqueue(&Task::RefreshTopArtists { auth_id: auth.id })
        .await
        .unwrap();
    assert_eq!(app.run_pending().await, 1);

    assert_eq!(
        app.provider.calls(),
        vec![
            ProviderCall::RefreshToken("refresh-initial".to_string()),
            ProviderCall::TopArtists(5),
        ]
    );
    assert_eq!(
        app.provider.with_state(|s| s.tokens_used.clone()),
        vec!["access-refreshed-1".to_string()]
    );
    let stored = app.state.auth_store.peek_user(alice.id).await.unwrap().unwrap();
    assert!(Utc::now() - stored.last_refreshed < chrono::Duration::minutes(1));
}

#[tokio::test]
async fn test_top_artists_without_scope_fail_permanently() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let auth = app.link(&alice, &[SCOPE_PLAYLIST_MODIFY]).await;

    let err = refresh_top_artists(
        app.db(),
        app.provider.as_ref(),
        &app.state.auth_store,
        auth.id,
        5,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Permission(_)));
    assert_eq!(app.provider.count(|c| matches!(c, ProviderCall::TopArtists(_))), 0);
}

#[tokio::test]
async fn test_top_artists_for_revoked_auth_is_noop() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let auth = app.link_all_scopes(&alice).await;
    app.state.oauth.revoke(alice.id).await.unwrap();

    let stored = refresh_top_artists(
        app.db(),
        app.provider.as_ref(),
        &app.state.auth_store,
        auth.id,
        5,
    )
    .await
    .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_weekly_fan_out_refreshes_scoped_auths() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let carol = app.user("carol").await;
    let alice_auth = app.link(&alice, &[SCOPE_TOP_ARTIST_READ]).await;
    let bob_auth = app.link_all_scopes(&bob).await;
    app.link(&carol, &[SCOPE_PLAYLIST_MODIFY]).await;
    app.provider.with_state(|s| s.top_artists = vec!["Nujabes".to_string()]);

    app.state.queue.enqueue(&Task::RefreshAllTopArtists).await.unwrap();
    // Fan-out task plus one refresh per scoped auth
    assert_eq!(app.run_pending().await, 3);

    let refreshes = tasks::list_by_kind(app.db(), "refresh_top_artists").await.unwrap();
    assert_eq!(refreshes.len(), 2);
    assert!(refreshes.iter().all(|t| t.status == TaskStatus::Completed));

    for auth_id in [alice_auth.id, bob_auth.id] {
        let data = provider_auth::load_user_data(app.db(), auth_id).await.unwrap();
        assert_eq!(data.top_artists, vec!["Nujabes"]);
    }
}

#[tokio::test]
async fn test_suggestion_fetches_song_in_background() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let code = track_code(42);
    app.provider
        .add_track(&code, "Shook Ones", "Mobb Deep", features(0.4, 0.7, None));

    suggest_song(
        app.db(),
        &app.state.queue,
        &app.state.suggest_limiter,
        &alice,
        &code,
    )
    .await
    .unwrap();
    assert!(!songs::song_exists(app.db(), &code).await.unwrap());

    assert_eq!(app.run_pending().await, 1);
    let song = songs::load_song_by_code(app.db(), &code).await.unwrap().unwrap();
    assert_eq!(song.name, "Shook Ones");
    assert_eq!(song.artist, "Mobb Deep");
    assert_eq!(song.genre, "");
    assert_close(song.valence, 0.4);
    assert_close(song.energy, 0.7);
    assert_close(song.danceability, 0.0);

    let err = suggest_song(
        app.db(),
        &app.state.queue,
        &app.state.suggest_limiter,
        &alice,
        &code,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_unset_danceability_takes_emotion_default_in_center() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let code = track_code(43);
    app.provider
        .add_track(&code, "No Groove", "Someone", features(0.4, 0.7, None));

    let outcome = fetch_song(app.db(), app.provider.as_ref(), &code, "alice").await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Inserted(ref s) if s.danceability == 0.0));

    app.state
        .votes
        .cast_vote(
            alice.id,
            &CastVote {
                song_code: code.clone(),
                emotion: Emotion::Happy,
                vote: true,
                context: VoteContext::Unspecified,
                description: String::new(),
            },
        )
        .await
        .unwrap();

    let center = center_of(app.db(), &alice, Emotion::Happy).await;
    assert_close(center.valence, 0.4);
    assert_close(center.energy, 0.7);
    assert_close(center.danceability, Emotion::Happy.default_attributes().danceability);
}

#[tokio::test]
async fn test_fetch_song_outcomes() {
    let app = test_app().await;
    let present = track_code(1);
    let silent = track_code(2);
    insert_songs(app.db(), &[song(&present, "Band", "pop", 0.5, 0.5, 0.5)]).await;
    app.provider.add_track(&silent, "Untitled", "Nobody", None);

    assert_eq!(
        fetch_song(app.db(), app.provider.as_ref(), &present, "alice").await.unwrap(),
        FetchOutcome::AlreadyPresent
    );
    assert_eq!(
        fetch_song(app.db(), app.provider.as_ref(), &silent, "alice").await.unwrap(),
        FetchOutcome::MissingFeatures
    );
    assert!(!songs::song_exists(app.db(), &silent).await.unwrap());
    // The already-present song never reached the provider
    assert_eq!(
        app.provider.count(|c| matches!(c, ProviderCall::Track(t) if *t == present)),
        0
    );
}

#[tokio::test]
async fn test_fetch_song_retries_provider_faults() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let code = track_code(43);
    app.provider
        .add_track(&code, "Track", "Artist", features(0.5, 0.5, Some(0.5)));
    app.provider.fail_next("audio_features", 1);

    let task_id = suggest_song(
        app.db(),
        &app.state.queue,
        &app.state.suggest_limiter,
        &alice,
        &code,
    )
    .await
    .unwrap();
    app.run_pending().await;
    assert_eq!(
        tasks::load_task(app.db(), task_id).await.unwrap().unwrap().status,
        TaskStatus::Pending
    );

    app.make_tasks_due().await;
    app.run_pending().await;
    assert_eq!(
        tasks::load_task(app.db(), task_id).await.unwrap().unwrap().status,
        TaskStatus::Completed
    );
    assert!(songs::song_exists(app.db(), &code).await.unwrap());
}

#[tokio::test]
async fn test_suggestions_are_rate_limited_per_user() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;

    for i in 0..3 {
        suggest_song(
            app.db(),
            &app.state.queue,
            &app.state.suggest_limiter,
            &alice,
            &track_code(200 + i),
        )
        .await
        .unwrap();
    }
    let err = suggest_song(
        app.db(),
        &app.state.queue,
        &app.state.suggest_limiter,
        &alice,
        &track_code(300),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::RateLimited(_)));

    suggest_song(
        app.db(),
        &app.state.queue,
        &app.state.suggest_limiter,
        &bob,
        &track_code(301),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_oauth_callback_links_account() {
    let app = test_app().await;
    let alice = app.user("alice").await;

    let url = app.state.oauth.authorize(alice.id).await.unwrap();
    let state = url
        .split("state=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap()
        .to_string();
    assert_eq!(state.len(), 16);

    let outcome = app
        .state
        .oauth
        .callback(
            alice.id,
            &CallbackParams {
                code: Some("auth-code".to_string()),
                state: Some(state),
                error: None,
            },
        )
        .await
        .unwrap();

    let auth = match outcome {
        CallbackOutcome::Linked(auth) => auth,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(auth.provider_user_id, "spotify-user");
    assert!(auth.has_scope(SCOPE_TOP_ARTIST_READ));
    assert!(auth.has_scope(SCOPE_PLAYLIST_MODIFY));

    let stored = app.state.auth_store.peek_user(alice.id).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-initial");
    assert_eq!(stored.refresh_token, "refresh-initial");

    // Initial top-artist refresh is queued with a delay
    let queued = tasks::list_by_kind(app.db(), "refresh_top_artists").await.unwrap();
    assert_eq!(queued.len(), 1);
    assert!(queued[0].run_after > Utc::now().timestamp_millis());
    assert_eq!(app.run_pending().await, 0);

    // A second callback for a linked user is a no-op
    let again = app
        .state
        .oauth
        .callback(alice.id, &CallbackParams::default())
        .await
        .unwrap();
    assert!(matches!(again, CallbackOutcome::AlreadyAuthenticated));
}

#[tokio::test]
async fn test_oauth_callback_rejects_bad_state() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    app.state.oauth.authorize(alice.id).await.unwrap();

    let err = app
        .state
        .oauth
        .callback(
            alice.id,
            &CallbackParams {
                code: Some("auth-code".to_string()),
                state: Some("forged".to_string()),
                error: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    // The state is single-use, even after a failed attempt
    assert!(oauth_states::take_state(app.db(), alice.id).await.unwrap().is_none());
    assert!(!app.state.auth_store.exists_for_user(alice.id).await.unwrap());
    assert_eq!(app.provider.count(|c| matches!(c, ProviderCall::ExchangeCode(_))), 0);
}

#[tokio::test]
async fn test_oauth_callback_reports_provider_refusal() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    app.state.oauth.authorize(alice.id).await.unwrap();

    let err = app
        .state
        .oauth
        .callback(
            alice.id,
            &CallbackParams {
                code: None,
                state: None,
                error: Some("access_denied".to_string()),
            },
        )
        .await
        .unwrap_err();
    match err {
        Error::InvalidInput(message) => assert!(message.contains("access_denied")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_recompute_task_rebuilds_center() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let code = track_code(5);
    insert_songs(app.db(), &[song(&code, "Band", "pop", 0.9, 0.9, 0.9)]).await;

    // A vote row written without the inline recompute
    sqlx::query(
        "INSERT INTO user_song_votes (user_id, song_id, emotion, context, description, vote, created_at) \
         SELECT ?, id, 'HPY', '', '', 1, 0 FROM songs WHERE code = ?",
    )
    .bind(alice.id.to_string())
    .bind(&code)
    .execute(app.db())
    .await
    .unwrap();
    assert_eq!(
        center_of(app.db(), &alice, Emotion::Happy).await,
        Emotion::Happy.default_attributes()
    );

    app.state
        .queue
        .enqueue(&Task::RecomputeUserEmotion {
            user_id: alice.id,
            emotion: Emotion::Happy,
        })
        .await
        .unwrap();
    assert_eq!(app.run_pending().await, 1);

    let center = center_of(app.db(), &alice, Emotion::Happy).await;
    assert_close(center.energy, 0.9);
    assert_close(center.valence, 0.9);
}
