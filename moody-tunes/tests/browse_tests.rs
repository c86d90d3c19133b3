//! Browse sampling, personalization and the last-playlist cache

mod helpers;

use helpers::*;
use moody_common::{Emotion, Error, VoteContext};
use moody_tunes::db::provider_auth;
use moody_tunes::services::browse::{BrowseRequest, CenterSource};
use moody_tunes::services::votes::CastVote;
use std::collections::HashSet;

fn happy(jitter: f64, limit: usize) -> BrowseRequest {
    BrowseRequest {
        emotion: Some(Emotion::Happy),
        jitter: Some(jitter),
        limit: Some(limit),
        ..BrowseRequest::default()
    }
}

async fn upvote(app: &TestApp, user_id: uuid::Uuid, code: &str, context: VoteContext) {
    app.state
        .votes
        .cast_vote(
            user_id,
            &CastVote {
                song_code: code.to_string(),
                emotion: Emotion::Happy,
                vote: true,
                context,
                description: String::new(),
            },
        )
        .await
        .unwrap();
}

/// Forty songs spread evenly over the attribute space
async fn seed_grid(app: &TestApp) -> Vec<String> {
    let catalog: Vec<_> = (0..40)
        .map(|i| {
            let step = i as f64 / 40.0;
            song(
                &track_code(100 + i),
                &format!("Artist {}", i % 7),
                if i % 2 == 0 { "pop" } else { "rock" },
                0.3 + step * 0.5,
                0.45 + step * 0.5,
                0.35 + step * 0.5,
            )
        })
        .collect();
    insert_songs(app.db(), &catalog).await;
    catalog.into_iter().map(|s| s.code).collect()
}

#[tokio::test]
async fn test_browse_never_returns_voted_songs() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let (a, b, c) = (track_code(1), track_code(2), track_code(3));
    insert_songs(
        app.db(),
        &[
            song(&a, "Artist A", "pop", 0.6, 0.8, 0.5),
            song(&b, "Artist B", "pop", 0.4, 0.6, 0.7),
            song(&c, "Artist C", "rock", 0.5, 0.7, 0.6),
        ],
    )
    .await;
    seed_grid(&app).await;

    for code in [&a, &b, &c] {
        upvote(&app, alice.id, code, VoteContext::Unspecified).await;
    }

    let voted: HashSet<&String> = [&a, &b, &c].into_iter().collect();
    for _ in 0..25 {
        let result = app.state.browse.browse(alice.id, &happy(0.05, 9)).await.unwrap();
        assert!(result.songs.iter().all(|s| !voted.contains(&s.code)));
    }
}

#[tokio::test]
async fn test_browse_results_stay_inside_window() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    seed_grid(&app).await;

    for jitter in [0.0, 0.05, 0.1, 0.3] {
        for _ in 0..10 {
            let result = app.state.browse.browse(alice.id, &happy(jitter, 6)).await.unwrap();
            assert!(result.songs.len() <= 6);
            assert_eq!(result.center_source, CenterSource::UserEmotion);
            let center = result.center.axis(result.axis);
            for song in &result.songs {
                let value = song.attributes().axis(result.axis);
                assert!(
                    (value - center).abs() <= jitter + 1e-9,
                    "{} on {:?} is outside {} ± {}",
                    value,
                    result.axis,
                    center,
                    jitter
                );
            }
        }
    }
}

#[tokio::test]
async fn test_zero_jitter_finds_song_at_center() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let center = Emotion::Happy.default_attributes();
    let exact = track_code(7);
    insert_songs(
        app.db(),
        &[
            song(&exact, "Exact", "pop", center.energy, center.valence, center.danceability),
            song(&track_code(8), "Other", "pop", 0.11, 0.12, 0.13),
            song(&track_code(9), "Other", "pop", 0.91, 0.92, 0.93),
        ],
    )
    .await;

    let result = app.state.browse.browse(alice.id, &happy(0.0, 9)).await.unwrap();
    let codes: Vec<&str> = result.songs.iter().map(|s| s.code.as_str()).collect();
    assert_eq!(codes, vec![exact.as_str()]);
}

#[tokio::test]
async fn test_top_artists_are_preferred() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let auth = app.link_all_scopes(&alice).await;
    provider_auth::save_top_artists(app.db(), auth.id, &["Favourite".to_string()])
        .await
        .unwrap();

    let center = Emotion::Happy.default_attributes();
    let mut catalog = Vec::new();
    for i in 0..3 {
        catalog.push(song(
            &track_code(10 + i),
            "Favourite",
            "pop",
            center.energy,
            center.valence,
            center.danceability,
        ));
    }
    for i in 0..12 {
        catalog.push(song(
            &track_code(20 + i),
            "Somebody Else",
            "pop",
            center.energy,
            center.valence,
            center.danceability,
        ));
    }
    insert_songs(app.db(), &catalog).await;

    let result = app.state.browse.browse(alice.id, &happy(0.1, 3)).await.unwrap();
    assert_eq!(result.songs.len(), 3);
    assert!(result.songs.iter().all(|s| s.artist == "Favourite"));

    // Short top-artist pass is filled from the rest of the catalog
    let result = app.state.browse.browse(alice.id, &happy(0.1, 8)).await.unwrap();
    assert_eq!(result.songs.len(), 8);
    assert_eq!(result.songs.iter().filter(|s| s.artist == "Favourite").count(), 3);
    let unique: HashSet<&str> = result.songs.iter().map(|s| s.code.as_str()).collect();
    assert_eq!(unique.len(), 8);
}

#[tokio::test]
async fn test_context_upvotes_drive_center() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let party_song = track_code(1);
    insert_songs(app.db(), &[song(&party_song, "DJ", "dance", 0.9, 0.9, 0.9)]).await;
    seed_grid(&app).await;
    upvote(&app, alice.id, &party_song, VoteContext::Party).await;

    let request = BrowseRequest {
        context: Some(VoteContext::Party),
        ..happy(0.1, 5)
    };
    let result = app.state.browse.browse(alice.id, &request).await.unwrap();
    assert_eq!(result.center_source, CenterSource::ContextUpvotes);
    assert_close(result.center.energy, 0.9);
    assert_eq!(result.context, VoteContext::Party);
    assert!(result.songs.iter().all(|s| s.code != party_song));

    // No up-votes in this context: fall back to the emotion center
    let request = BrowseRequest {
        context: Some(VoteContext::Work),
        ..happy(0.1, 5)
    };
    let result = app.state.browse.browse(alice.id, &request).await.unwrap();
    assert_eq!(result.center_source, CenterSource::UserEmotion);
}

#[tokio::test]
async fn test_genre_filter_narrows_results() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    seed_grid(&app).await;

    let request = BrowseRequest {
        genre: Some("rock".to_string()),
        ..happy(0.5, 25)
    };
    let result = app.state.browse.browse(alice.id, &request).await.unwrap();
    assert!(!result.songs.is_empty());
    assert!(result.songs.iter().all(|s| s.genre == "rock"));
}

#[tokio::test]
async fn test_browse_rejects_bad_parameters() {
    let app = test_app().await;
    let alice = app.user("alice").await;

    let cases = [
        BrowseRequest::default(),
        happy(0.6, 9),
        happy(-0.1, 9),
        happy(0.1, 0),
        happy(0.1, 26),
        BrowseRequest {
            description: Some("no <tags>".to_string()),
            ..happy(0.1, 9)
        },
    ];
    for request in &cases {
        let err = app.state.browse.browse(alice.id, request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{:?} accepted", request);
    }
}

#[tokio::test]
async fn test_last_playlist_drops_songs_voted_since() {
    let app = test_app().await;
    let alice = app.user("alice").await;
    let center = Emotion::Happy.default_attributes();
    let catalog: Vec<_> = (0..4)
        .map(|i| {
            song(
                &track_code(30 + i),
                "Band",
                "pop",
                center.energy,
                center.valence,
                center.danceability,
            )
        })
        .collect();
    insert_songs(app.db(), &catalog).await;

    assert!(app
        .state
        .browse_cache
        .last_playlist(app.db(), alice.id)
        .await
        .unwrap()
        .is_none());

    let request = BrowseRequest {
        description: Some("sunny day".to_string()),
        ..happy(0.0, 4)
    };
    let result = app.state.browse.browse(alice.id, &request).await.unwrap();
    assert_eq!(result.songs.len(), 4);

    let voted = result.songs[0].code.clone();
    upvote(&app, alice.id, &voted, VoteContext::Unspecified).await;

    let last = app
        .state
        .browse_cache
        .last_playlist(app.db(), alice.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.emotion, Emotion::Happy);
    assert_eq!(last.description, "sunny day");
    assert_eq!(last.songs.len(), 3);
    assert!(last.songs.iter().all(|s| s.code != voted));

    // Another user's cache entry is independent
    let bob = app.user("bob").await;
    assert!(app
        .state
        .browse_cache
        .last_playlist(app.db(), bob.id)
        .await
        .unwrap()
        .is_none());
}
