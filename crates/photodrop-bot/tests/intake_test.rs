//! Message intake integration tests.

mod helpers;

use helpers::{setup_test_app, thumbs_up, IMAGE_URL, PAYLOAD, VIDEO_URL, WATCHED_CHANNEL};
use photodrop_bot::{Emoji, Reaction};
use photodrop_core::Attachment;

#[tokio::test]
async fn test_thread_message_is_uploaded_into_thread_folder() {
    let app = setup_test_app().await;
    let parent = app.platform.add_text_channel(1, WATCHED_CHANNEL);
    app.platform.add_thread(10, "Trip: Day 1", 1);
    app.platform.add_emoji(5, "glump_photo");
    let message = app
        .platform
        .post(10, 100, "look at this", &[IMAGE_URL, VIDEO_URL]);
    let thread = app.platform.channel_snapshot(10);

    assert!(
        app.state
            .intake
            .on_thread_message(&message, &thread, &parent)
            .await
    );
    app.drain().await;

    let uploads = app.backend.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(app.backend.create_calls(), 1);

    let folder = app.folder_id("Trip_ Day 1").await.unwrap();
    assert!(uploads.iter().all(|u| u.parent_id == folder));
    assert!(uploads.iter().all(|u| u.data.as_ref() == PAYLOAD));

    let mut names: Vec<_> = uploads.iter().map(|u| u.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["BEACH.PNG", "CLIP.MP4"]);

    assert_eq!(
        app.platform.reactions(),
        vec![(
            100,
            Reaction::Custom(Emoji {
                id: 5,
                name: "glump_photo".to_string()
            })
        )]
    );
}

#[tokio::test]
async fn test_opted_out_message_is_ignored() {
    let app = setup_test_app().await;
    let parent = app.platform.add_text_channel(1, WATCHED_CHANNEL);
    let thread = app.platform.add_thread(10, "Trip", 1);
    let message = app.platform.post(10, 100, "No Upload, thanks", &[IMAGE_URL]);

    assert!(
        !app.state
            .intake
            .on_thread_message(&message, &thread, &parent)
            .await
    );
    app.drain().await;

    assert!(app.backend.uploads().is_empty());
    assert!(app.platform.reactions().is_empty());
}

#[tokio::test]
async fn test_threads_under_other_channels_are_ignored() {
    let app = setup_test_app().await;
    let other = app.platform.add_text_channel(2, "general");
    let thread = app.platform.add_thread(20, "Chat", 2);
    let message = app.platform.post(20, 200, "pic", &[IMAGE_URL]);

    assert!(
        !app.state
            .intake
            .on_thread_message(&message, &thread, &other)
            .await
    );
    app.drain().await;
    assert!(app.backend.uploads().is_empty());
}

#[tokio::test]
async fn test_missing_custom_emoji_falls_back_to_thumbs_up() {
    let app = setup_test_app().await;
    let channel = app.platform.add_text_channel(1, WATCHED_CHANNEL);
    let message = app.platform.post(1, 100, "", &[IMAGE_URL]);

    assert!(
        app.state
            .intake
            .process_message(&message, &channel, None, None)
            .await
    );
    app.drain().await;

    assert_eq!(app.platform.reactions(), vec![(100, thumbs_up())]);
}

#[tokio::test]
async fn test_rejected_custom_reaction_falls_back_to_thumbs_up() {
    let app = setup_test_app().await;
    let channel = app.platform.add_text_channel(1, WATCHED_CHANNEL);
    app.platform.add_emoji(5, "glump_photo");
    app.platform.reject_custom_reactions();
    let message = app.platform.post(1, 100, "", &[IMAGE_URL]);

    app.state
        .intake
        .process_message(&message, &channel, None, None)
        .await;
    app.drain().await;

    assert_eq!(app.platform.reactions(), vec![(100, thumbs_up())]);
}

#[tokio::test]
async fn test_folder_override_skips_folder_resolution() {
    let app = setup_test_app().await;
    let channel = app.platform.add_text_channel(1, WATCHED_CHANNEL);
    let message = app.platform.post(1, 100, "", &[IMAGE_URL]);

    app.state
        .intake
        .process_message(&message, &channel, None, Some("fixed-folder".to_string()))
        .await;
    app.drain().await;

    let uploads = app.backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].parent_id, "fixed-folder");
    assert_eq!(app.backend.find_calls(), 0);
    assert_eq!(app.backend.create_calls(), 0);
}

#[tokio::test]
async fn test_unsupported_attachments_are_not_queued() {
    let app = setup_test_app().await;
    let attachments = vec![
        Attachment::new("https://cdn.discordapp.com/attachments/1/2/notes.pdf"),
        Attachment::new(IMAGE_URL),
    ];

    let queued = app
        .state
        .intake
        .queue_attachments("Album", &attachments, None);
    app.drain().await;

    assert_eq!(queued, 1);
    assert_eq!(app.backend.uploads().len(), 1);
}
