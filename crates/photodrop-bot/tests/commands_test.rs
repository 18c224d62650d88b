//! Command surface integration tests.

mod helpers;

use helpers::{setup_test_app, ADMIN_ROLE, IMAGE_URL, ROOT_FOLDER, WATCHED_CHANNEL};
use photodrop_bot::Command;

const ADMIN: u64 = 7;
const MEMBER: u64 = 8;

#[tokio::test]
async fn test_help_lists_commands() {
    let app = setup_test_app().await;
    let reply = app.state.commands.execute(Command::Help, MEMBER).await;

    assert!(reply.ephemeral);
    for name in ["threadimages", "messageimages", "changefolder"] {
        assert!(reply.content.contains(name), "{name} missing from help");
    }
}

#[tokio::test]
async fn test_thread_images_rejects_bad_ids() {
    let app = setup_test_app().await;
    app.platform.add_text_channel(1, WATCHED_CHANNEL);

    let reply = app.state.commands.thread_images("abc").await;
    assert_eq!(reply.content, "Given ID was not an integer");

    let reply = app.state.commands.thread_images("404").await;
    assert_eq!(reply.content, "Thread not found. Please check the thread ID.");

    let reply = app.state.commands.thread_images("1").await;
    assert_eq!(
        reply.content,
        "The provided ID does not correspond to a thread."
    );
}

#[tokio::test]
async fn test_thread_images_processes_whole_history() {
    let app = setup_test_app().await;
    app.platform.add_text_channel(1, WATCHED_CHANNEL);
    app.platform.add_thread(10, "Wedding", 1);
    app.platform.post(10, 101, "first", &[IMAGE_URL]);
    app.platform.post(10, 102, "just text", &[]);
    app.platform.post(10, 103, "no upload", &[IMAGE_URL]);

    let reply = app
        .state
        .commands
        .execute(
            Command::ThreadImages {
                thread_id: "10".to_string(),
            },
            MEMBER,
        )
        .await;
    app.drain().await;

    assert!(reply.ephemeral);
    assert!(reply.content.contains("Wedding"));
    assert!(reply.content.contains("1 of 3"));
    let uploads = app.backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        Some(uploads[0].parent_id.clone()),
        app.folder_id("Wedding").await
    );
}

#[tokio::test]
async fn test_message_images_searches_readable_channels() {
    let app = setup_test_app().await;
    app.platform.add_text_channel(1, "private");
    app.platform.add_text_channel(2, "general");
    app.platform.add_text_channel(3, WATCHED_CHANNEL);
    app.platform.forbid(1);
    app.platform.post(3, 300, "", &[IMAGE_URL]);

    let reply = app.state.commands.message_images("300", "Summer").await;
    app.drain().await;

    assert_eq!(reply.content, "Photo/Videos being uploaded to Summer");
    let uploads = app.backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        Some(uploads[0].parent_id.clone()),
        app.folder_id("Summer").await
    );
}

#[tokio::test]
async fn test_message_images_reports_missing_message() {
    let app = setup_test_app().await;
    app.platform.add_text_channel(1, "general");

    let reply = app.state.commands.message_images("999", "Summer").await;
    assert!(reply.content.starts_with("Message could not be found"));

    let reply = app.state.commands.message_images("x9", "Summer").await;
    assert_eq!(reply.content, "Given ID was not an integer");
}

#[tokio::test]
async fn test_change_folder_requires_admin_role() {
    let app = setup_test_app().await;
    let target = app.backend.seed_folder("drive", "Uploads");
    app.platform.grant_role(MEMBER, "Member");

    let reply = app.state.commands.change_folder(MEMBER, &target).await;

    assert!(reply.content.contains(ADMIN_ROLE));
    assert_eq!(app.state.admin.current(), ROOT_FOLDER);
    assert!(app.store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_change_folder_swaps_root_and_clears_cache() {
    let app = setup_test_app().await;
    let target = app.backend.seed_folder("drive", "Uploads");
    app.platform.grant_role(ADMIN, ADMIN_ROLE);
    app.state.folders.resolve_or_create("Trip").await.unwrap();
    assert_eq!(app.state.folders.len(), 1);

    let reply = app
        .state
        .commands
        .execute(
            Command::ChangeFolder {
                folder_id: target.clone(),
            },
            ADMIN,
        )
        .await;

    assert_eq!(
        reply.content,
        format!("Upload folder changed from {} to {}", ROOT_FOLDER, target)
    );
    assert_eq!(app.state.admin.current(), target);
    assert!(app.state.folders.is_empty());
    let saved = app.store.load().await.unwrap().unwrap();
    assert_eq!(saved.parent_folder_id, target);

    // Later folders are created under the new root.
    app.state.folders.resolve_or_create("Trip").await.unwrap();
    assert_eq!(app.backend.create_calls(), 2);
}

#[tokio::test]
async fn test_change_folder_rejects_unknown_or_malformed_ids() {
    let app = setup_test_app().await;
    app.platform.grant_role(ADMIN, ADMIN_ROLE);

    let reply = app.state.commands.change_folder(ADMIN, "nope").await;
    assert_eq!(reply.content, "Folder nope was not found or is not a folder");

    let reply = app.state.commands.change_folder(ADMIN, "bad/id").await;
    assert_eq!(reply.content, "'bad/id' is not a valid folder ID");

    assert_eq!(app.state.admin.current(), ROOT_FOLDER);
}
