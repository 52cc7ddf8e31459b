use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use daybook_remote::{Document, ImageLoad, MemoryBackend};
use daybook_shared::{DateKey, Identity, JournalEntry, JournalImage, UserId};
use daybook_store::GuestStore;
use daybook_sync::{spawn_engine, EngineConfig, EngineDeps, JournalHandle, ReminderNotifier, SyncError};

const MARCH_1: DateKey = DateKey::new(2024, 3, 1);
const JAN_1: DateKey = DateKey::new(2024, 1, 1);
const JAN_2: DateKey = DateKey::new(2024, 1, 2);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingNotifier {
    updates: Mutex<Vec<(Identity, bool)>>,
    badge_clears: AtomicUsize,
}

impl RecordingNotifier {
    fn last(&self) -> Option<(Identity, bool)> {
        self.updates.lock().unwrap().last().cloned()
    }
}

impl ReminderNotifier for RecordingNotifier {
    fn on_entry_updated(&self, identity: &Identity, completed_today: bool) {
        self.updates
            .lock()
            .unwrap()
            .push((identity.clone(), completed_today));
    }

    fn clear_badge(&self) {
        self.badge_clears.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    handle: JournalHandle,
    backend: MemoryBackend,
    notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let guest = GuestStore::open_at(dir.path()).unwrap();
    let backend = MemoryBackend::new();
    let notifier = Arc::new(RecordingNotifier::default());

    let deps = EngineDeps::with_backend(backend.clone(), guest, notifier.clone());
    let handle = spawn_engine(deps, EngineConfig::default());

    Harness {
        handle,
        backend,
        notifier,
        _dir: dir,
    }
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn png() -> Vec<u8> {
    use image::{ImageBuffer, Rgb};
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(32, 16, |x, y| Rgb([x as u8 * 8, y as u8 * 16, 90]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn fields(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

/// Wait until the published entry list satisfies `pred`.
async fn wait_for(
    handle: &JournalHandle,
    pred: impl Fn(&[JournalEntry]) -> bool,
) -> Vec<JournalEntry> {
    let mut rx = handle.subscribe();
    timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.to_vec();
                }
            }
            rx.changed().await.expect("engine stopped");
        }
    })
    .await
    .expect("entry list never reached the expected state")
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

fn day(entries: &[JournalEntry], date: DateKey) -> Option<&JournalEntry> {
    entries.iter().find(|entry| entry.date == date)
}

// ---------------------------------------------------------------------------
// Guest mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn guest_add_image_is_persisted() {
    let h = harness();
    h.handle.attach(Identity::Guest).await.unwrap();

    let image = h.handle.add_image(JAN_1, png()).await.unwrap();
    let path = image.url.clone().unwrap();

    let entry = h.handle.entry(JAN_1).unwrap();
    assert_eq!(entry.images, vec![path.clone()]);
    assert!(entry.local_images.is_empty());
    assert!(matches!(h.handle.load_image(&path).await, ImageLoad::Loaded(_)));

    // A fresh load from the entry store sees the same entry.
    h.handle.detach().await.unwrap();
    assert!(h.handle.entries().is_empty());
    h.handle.attach(Identity::Guest).await.unwrap();
    let reloaded = h.handle.entry(JAN_1).unwrap();
    assert_eq!(reloaded.images, vec![path]);
    assert!(reloaded.id.is_some());
}

#[tokio::test]
async fn guest_rejects_undecodable_image() {
    let h = harness();
    h.handle.attach(Identity::Guest).await.unwrap();

    let err = h.handle.add_image(JAN_1, b"not an image".to_vec()).await;
    assert!(matches!(err, Err(SyncError::Media(_))));
    assert!(h.handle.entry(JAN_1).is_none());
}

#[tokio::test]
async fn guest_delete_image_twice() {
    let h = harness();
    h.handle.attach(Identity::Guest).await.unwrap();
    let image = h.handle.add_image(JAN_1, png()).await.unwrap();
    let path = image.url.clone().unwrap();

    h.handle.delete_image(JAN_1, image.clone()).await.unwrap();
    let after_first = h.handle.entries();
    h.handle.delete_image(JAN_1, image).await.unwrap();

    assert_eq!(h.handle.entries(), after_first);
    // Emptied days stay in the list.
    let entry = h.handle.entry(JAN_1).unwrap();
    assert!(entry.images.is_empty());
    assert_eq!(h.handle.load_image(&path).await, ImageLoad::Unavailable);
}

#[tokio::test]
async fn guest_delete_on_wrong_day_keeps_file() {
    let h = harness();
    h.handle.attach(Identity::Guest).await.unwrap();
    let image = h.handle.add_image(MARCH_1, png()).await.unwrap();
    let path = image.url.clone().unwrap();
    let march_2 = DateKey::new(2024, 3, 2);

    h.handle
        .delete_image(march_2, JournalImage::confirmed(path.clone()))
        .await
        .unwrap();

    assert_eq!(h.handle.entry(MARCH_1).unwrap().images, vec![path.clone()]);
    assert!(h.handle.entry(march_2).is_none());
    assert!(matches!(h.handle.load_image(&path).await, ImageLoad::Loaded(_)));
}

#[tokio::test]
async fn guest_audio_replace_and_delete() {
    let h = harness();
    h.handle.attach(Identity::Guest).await.unwrap();

    h.handle.set_audio(JAN_2, b"take-1".to_vec()).await.unwrap();
    let first = h.handle.entry(JAN_2).unwrap().audio_url.unwrap();

    h.handle.append_audio(JAN_2, b"take-1+2".to_vec()).await.unwrap();
    let second = h.handle.entry(JAN_2).unwrap().audio_url.unwrap();
    assert_ne!(first, second);
    assert!(!std::path::Path::new(&first).exists());

    h.handle.delete_audio(JAN_2).await.unwrap();
    let entry = h.handle.entry(JAN_2).unwrap();
    assert!(entry.audio_url.is_none());
    assert!(!std::path::Path::new(&second).exists());
}

#[tokio::test]
async fn delete_audio_without_audio_is_noop() {
    let h = harness();
    h.handle.attach(Identity::Guest).await.unwrap();
    h.handle.add_image(JAN_1, png()).await.unwrap();
    let before = h.handle.entries();

    h.handle.delete_audio(JAN_1).await.unwrap();
    h.handle.delete_audio(JAN_2).await.unwrap();

    assert_eq!(h.handle.entries(), before);
    assert!(h.handle.entry(JAN_1).is_some());
}

#[tokio::test]
async fn completing_today_clears_badge() {
    let h = harness();
    h.handle.attach(Identity::Guest).await.unwrap();
    assert_eq!(h.notifier.last(), Some((Identity::Guest, false)));

    let today = DateKey::today();
    h.handle.add_image(today, png()).await.unwrap();
    assert_eq!(h.notifier.badge_clears.load(Ordering::SeqCst), 0);

    h.handle.set_audio(today, b"voice".to_vec()).await.unwrap();
    assert_eq!(h.notifier.last(), Some((Identity::Guest, true)));
    assert_eq!(h.notifier.badge_clears.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn guest_profile_image_requires_guest_mode() {
    let h = harness();
    assert!(matches!(
        h.handle.set_guest_profile_image(png()).await,
        Err(SyncError::GuestModeRequired)
    ));

    h.handle.attach(Identity::Guest).await.unwrap();
    let path = h.handle.set_guest_profile_image(png()).await.unwrap();
    assert!(matches!(h.handle.load_image(&path).await, ImageLoad::Loaded(_)));
}

#[tokio::test]
async fn mutations_need_an_identity() {
    let h = harness();
    assert!(matches!(
        h.handle.add_image(JAN_1, png()).await,
        Err(SyncError::NotAttached)
    ));
    assert!(matches!(
        h.handle.delete_audio(JAN_1).await,
        Err(SyncError::NotAttached)
    ));
}

// ---------------------------------------------------------------------------
// Signed-in mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn optimistic_image_converges_without_duplicates() {
    let h = harness();
    let u1 = user("U1");
    h.backend.put_document(
        &u1,
        MARCH_1,
        fields(json!({"year": 2024, "month": 3, "day": 1, "images": ["urlA"]})),
    );
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();
    wait_for(&h.handle, |entries| entries.len() == 1).await;

    h.backend.hold_uploads();
    let pending = h.handle.add_image(MARCH_1, png()).await.unwrap();
    assert!(!pending.is_confirmed());

    // Visible right away, before any upload finished.
    let entry = h.handle.entry(MARCH_1).unwrap();
    assert_eq!(entry.display_images().len(), 2);
    assert_eq!(entry.local_images[0].id, pending.id);
    assert_eq!(h.backend.blob_count(), 0);

    h.backend.release_uploads(1);
    let entries = wait_for(&h.handle, |entries| {
        day(entries, MARCH_1).is_some_and(|e| e.images.len() == 2 && e.local_images.is_empty())
    })
    .await;

    let entry = day(&entries, MARCH_1).unwrap();
    assert_eq!(entry.images[0], "urlA");
    assert!(entry.images[1].starts_with("memory://users/U1/images/"));
    assert_eq!(entry.display_images().len(), 2);
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn concurrent_uploads_for_one_day_both_land() {
    let h = harness();
    let u1 = user("U1");
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();

    h.backend.hold_uploads();
    h.handle.add_image(MARCH_1, png()).await.unwrap();
    h.handle.add_image(MARCH_1, png()).await.unwrap();
    assert_eq!(h.handle.entry(MARCH_1).unwrap().display_images().len(), 2);

    h.backend.release_uploads(2);
    let entries = wait_for(&h.handle, |entries| {
        day(entries, MARCH_1).is_some_and(|e| e.images.len() == 2 && e.local_images.is_empty())
    })
    .await;
    assert_eq!(entries.len(), 1);
    assert_eq!(h.backend.document_count(&u1), 1);
}

#[tokio::test]
async fn failed_upload_keeps_pending_image() {
    let h = harness();
    h.handle.attach(Identity::User(user("U1"))).await.unwrap();
    h.backend.fail_uploads(true);

    h.handle.add_image(MARCH_1, png()).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let entry = h.handle.entry(MARCH_1).unwrap();
    assert!(entry.images.is_empty());
    assert_eq!(entry.local_images.len(), 1);
    assert!(entry.local_images[0].url.is_none());
}

#[tokio::test]
async fn delete_confirmed_image_clears_blob_and_reference() {
    let h = harness();
    let u1 = user("U1");
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();
    h.handle.add_image(MARCH_1, png()).await.unwrap();
    let entries = wait_for(&h.handle, |entries| {
        day(entries, MARCH_1).is_some_and(|e| e.images.len() == 1 && e.local_images.is_empty())
    })
    .await;
    let url = day(&entries, MARCH_1).unwrap().images[0].clone();
    assert!(matches!(h.handle.load_image(&url).await, ImageLoad::Loaded(_)));

    let image = JournalImage::confirmed(url.clone());
    h.handle.delete_image(MARCH_1, image.clone()).await.unwrap();
    assert!(h.handle.entry(MARCH_1).unwrap().images.is_empty());

    eventually(|| {
        h.backend.blob(&url).is_none()
            && h.backend.document(&u1, MARCH_1).unwrap()["images"] == json!([])
    })
    .await;

    // Second delete: blob is gone (not-found) and the document is unchanged.
    h.handle.delete_image(MARCH_1, image).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    let entry = h.handle.entry(MARCH_1).unwrap();
    assert!(entry.images.is_empty());
    assert_eq!(h.handle.load_image(&url).await, ImageLoad::Unavailable);
}

#[tokio::test]
async fn delete_pending_image_is_local_only() {
    let h = harness();
    let u1 = user("U1");
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();
    h.backend.hold_uploads();

    let pending = h.handle.add_image(MARCH_1, png()).await.unwrap();
    h.handle.delete_image(MARCH_1, pending).await.unwrap();

    let entry = h.handle.entry(MARCH_1).unwrap();
    assert!(entry.display_images().is_empty());
    assert_eq!(h.backend.document_count(&u1), 0);
}

#[tokio::test]
async fn user_audio_set_replace_delete() {
    let h = harness();
    let u1 = user("U1");
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();

    h.handle.set_audio(JAN_2, b"take-1".to_vec()).await.unwrap();
    let entries = wait_for(&h.handle, |entries| {
        day(entries, JAN_2).is_some_and(|e| e.audio_url.is_some())
    })
    .await;
    let first = day(&entries, JAN_2).unwrap().audio_url.clone().unwrap();
    assert!(first.ends_with(".m4a"));

    h.handle.set_audio(JAN_2, b"take-2".to_vec()).await.unwrap();
    let entries = wait_for(&h.handle, |entries| {
        day(entries, JAN_2).is_some_and(|e| e.audio_url.as_deref() != Some(first.as_str()))
    })
    .await;
    let second = day(&entries, JAN_2).unwrap().audio_url.clone().unwrap();
    eventually(|| h.backend.blob(&first).is_none()).await;

    h.handle.delete_audio(JAN_2).await.unwrap();
    assert!(h.handle.entry(JAN_2).unwrap().audio_url.is_none());
    eventually(|| {
        h.backend.blob(&second).is_none()
            && !h
                .backend
                .document(&u1, JAN_2)
                .unwrap()
                .contains_key("audioURL")
    })
    .await;
}

#[tokio::test]
async fn overlapping_audio_takes_leave_one_blob() {
    let h = harness();
    let u1 = user("U1");
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();

    h.backend.hold_uploads();
    h.handle.set_audio(JAN_2, b"take-1".to_vec()).await.unwrap();
    h.handle.set_audio(JAN_2, b"take-2".to_vec()).await.unwrap();
    h.backend.resume_uploads();

    let referenced = || {
        h.backend
            .document(&u1, JAN_2)
            .and_then(|doc| doc.get("audioURL").and_then(|v| v.as_str()).map(str::to_string))
    };
    eventually(|| referenced().is_some() && h.backend.blob_count() == 1).await;
    // Let both upload tasks run to completion before checking again.
    sleep(Duration::from_millis(100)).await;

    assert_eq!(h.backend.blob_count(), 1);
    let url = referenced().unwrap();
    assert!(h.backend.blob(&url).is_some());
    wait_for(&h.handle, |entries| {
        day(entries, JAN_2).is_some_and(|e| e.audio_url.as_deref() == Some(url.as_str()))
    })
    .await;
}

#[tokio::test]
async fn feed_changes_from_another_device() {
    let h = harness();
    let u1 = user("U1");
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();

    h.backend.put_document(
        &u1,
        JAN_1,
        fields(json!({"year": 2024, "month": 1, "day": 1, "images": ["a"], "audioURL": "b"})),
    );
    let entries = wait_for(&h.handle, |entries| entries.len() == 1).await;
    assert!(entries[0].is_completed());

    // Legacy documents only carry a combined date.
    h.backend.put_document(&u1, JAN_2, fields(json!({"date": "2024-01-02", "images": []})));
    wait_for(&h.handle, |entries| day(entries, JAN_2).is_some()).await;

    h.backend.remove_document(&u1, JAN_1);
    let entries = wait_for(&h.handle, |entries| day(entries, JAN_1).is_none()).await;
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn attach_same_identity_is_noop_and_switch_resets() {
    let h = harness();
    let u1 = user("U1");
    let u2 = user("U2");
    h.backend.put_document(&u1, JAN_1, fields(json!({"year": 2024, "month": 1, "day": 1})));

    h.handle.attach(Identity::User(u1.clone())).await.unwrap();
    wait_for(&h.handle, |entries| entries.len() == 1).await;
    h.handle.attach(Identity::User(u1.clone())).await.unwrap();
    assert_eq!(h.backend.subscriber_count(&u1), 1);
    assert_eq!(h.handle.entries().len(), 1);

    h.handle.attach(Identity::User(u2.clone())).await.unwrap();
    assert!(h.handle.entries().is_empty());
    assert_eq!(h.backend.subscriber_count(&u1), 0);
    assert_eq!(h.backend.subscriber_count(&u2), 1);
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

async fn seed_guest(handle: &JournalHandle) {
    handle.attach(Identity::Guest).await.unwrap();
    handle.add_image(JAN_1, png()).await.unwrap();
    handle.set_audio(JAN_2, b"voice".to_vec()).await.unwrap();
}

#[tokio::test]
async fn migration_moves_guest_data_upstream() {
    let h = harness();
    seed_guest(&h.handle).await;
    let u1 = user("U1");

    let report = h.handle.migrate_guest(u1.clone()).await.unwrap();
    assert_eq!(report.entries, 2);
    assert_eq!(report.blobs_uploaded, 2);
    assert!(h.handle.entries().is_empty());

    h.handle.attach(Identity::User(u1.clone())).await.unwrap();
    let entries = wait_for(&h.handle, |entries| entries.len() == 2).await;
    let jan1 = day(&entries, JAN_1).unwrap();
    assert!(jan1.images[0].starts_with("memory://"));
    assert!(day(&entries, JAN_2).unwrap().audio_url.is_some());

    // Guest store is empty afterwards.
    h.handle.attach(Identity::Guest).await.unwrap();
    assert!(h.handle.entries().is_empty());
}

#[tokio::test]
async fn failed_migration_keeps_guest_data() {
    let h = harness();
    seed_guest(&h.handle).await;
    let before = h.handle.entries();
    h.backend.fail_writes_for(JAN_2);

    assert!(h.handle.migrate_guest(user("U1")).await.is_err());

    // Still attached as guest with both entries.
    assert_eq!(h.handle.entries(), before);
    h.handle.detach().await.unwrap();
    h.handle.attach(Identity::Guest).await.unwrap();
    assert_eq!(h.handle.entries().len(), 2);
}

#[tokio::test]
async fn engine_stops_on_shutdown() {
    let h = harness();
    h.handle.shutdown().await;
    eventually(|| h.handle.subscribe().has_changed().is_err()).await;
    assert!(matches!(
        h.handle.attach(Identity::Guest).await,
        Err(SyncError::EngineClosed)
    ));
}
