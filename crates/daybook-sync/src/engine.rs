//! The journal engine task.
//!
//! [`spawn_engine`] moves the entry list, the guest store and the feed
//! subscription into a dedicated tokio task. Everything else talks to it
//! through a [`JournalHandle`]: mutations are typed commands with a oneshot
//! reply, and the current list is published on a watch channel after every
//! change.
//!
//! Uploads and remote deletes run in detached tasks. They hold only a weak
//! sender back to the engine and report with the session number they were
//! started under, so results that outlive an identity switch are ignored.

use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use daybook_remote::{
    apply_field_ops, date_update, DirectFetch, Document, EntryFeed, FeedBatch, FeedSubscription, FieldOp,
    HttpFetcher, ImageLoad, ImageLoader, RemoteStore, Transaction,
};
use daybook_shared::constants::{audio_blob_path, image_blob_path, FIELD_AUDIO_URL, FIELD_IMAGES};
use daybook_shared::{DateKey, Identity, JournalEntry, JournalImage, UserId};
use daybook_store::{BlobStore, GuestStore};

use crate::config::EngineConfig;
use crate::entries::EntryList;
use crate::error::{Result, SyncError};
use crate::media::{self, MediaError};
use crate::migration::{self, MigrationReport};
use crate::notify::ReminderNotifier;

/// Immutable view of the entry list as of one change.
pub type Snapshot = Arc<Vec<JournalEntry>>;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    Attach {
        identity: Identity,
        reply: oneshot::Sender<Result<()>>,
    },
    Detach {
        reply: oneshot::Sender<()>,
    },
    AddImage {
        date: DateKey,
        data: Bytes,
        reply: oneshot::Sender<Result<JournalImage>>,
    },
    DeleteImage {
        date: DateKey,
        image: JournalImage,
        reply: oneshot::Sender<Result<()>>,
    },
    SetAudio {
        date: DateKey,
        data: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteAudio {
        date: DateKey,
        reply: oneshot::Sender<Result<()>>,
    },
    SetGuestProfileImage {
        data: Bytes,
        reply: oneshot::Sender<Result<String>>,
    },
    MigrateGuest {
        user: UserId,
        reply: oneshot::Sender<Result<MigrationReport>>,
    },
    Shutdown,

    // Posted back by background tasks.
    ImageUploaded {
        session: u64,
        date: DateKey,
        image_id: Uuid,
        url: String,
    },
    ImageCommitted {
        session: u64,
        date: DateKey,
        image_id: Uuid,
    },
    AudioCommitted {
        session: u64,
        date: DateKey,
        url: String,
        /// The reference the commit overwrote remotely.
        replaced: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Collaborators injected into the engine.
pub struct EngineDeps {
    pub remote: Arc<dyn RemoteStore>,
    pub feed: Arc<dyn EntryFeed>,
    pub guest: GuestStore,
    pub notifier: Arc<dyn ReminderNotifier>,
    /// Fallback for images the blob store cannot serve. Plain HTTP if unset.
    pub direct_fetch: Option<Arc<dyn DirectFetch>>,
}

impl EngineDeps {
    /// Use one backend as both the remote store and the entry feed.
    pub fn with_backend<B>(backend: B, guest: GuestStore, notifier: Arc<dyn ReminderNotifier>) -> Self
    where
        B: RemoteStore + EntryFeed + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            remote: backend.clone(),
            feed: backend,
            guest,
            notifier,
            direct_fetch: None,
        }
    }
}

/// Start the engine task. Must be called from within a tokio runtime.
///
/// The task stops when [`JournalHandle::shutdown`] is called or the last
/// handle is dropped.
pub fn spawn_engine(deps: EngineDeps, config: EngineConfig) -> JournalHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(config.command_buffer);
    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());

    let direct = deps
        .direct_fetch
        .unwrap_or_else(|| Arc::new(HttpFetcher::default()) as Arc<dyn DirectFetch>);
    let loader = Arc::new(
        ImageLoader::new(deps.remote.clone())
            .with_direct_fetch(direct)
            .with_attempts(config.image_load_attempts)
            .with_cache_capacity(config.image_cache_capacity),
    );
    let blobs = deps.guest.blobs.clone();

    let engine = Engine {
        config,
        remote: deps.remote,
        feed: deps.feed,
        guest: deps.guest,
        notifier: deps.notifier,
        loader: loader.clone(),
        mailbox: cmd_tx.downgrade(),
        snapshots: snapshot_tx,
        entries: EntryList::new(),
        identity: None,
        subscription: None,
        initial_received: false,
        session: 0,
    };
    tokio::spawn(engine.run(cmd_rx));
    info!("Journal engine started");

    JournalHandle {
        commands: cmd_tx,
        snapshots: snapshot_rx,
        loader,
        blobs,
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable client of the engine task.
#[derive(Clone)]
pub struct JournalHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    loader: Arc<ImageLoader>,
    blobs: BlobStore,
}

impl JournalHandle {
    /// Switch the engine to `identity`. A no-op if it is already attached
    /// with a live data source.
    pub async fn attach(&self, identity: Identity) -> Result<()> {
        self.request(|reply| Command::Attach { identity, reply })
            .await?
    }

    /// Drop the current identity and its entries.
    pub async fn detach(&self) -> Result<()> {
        self.request(|reply| Command::Detach { reply }).await
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.snapshots.borrow().to_vec()
    }

    pub fn entry(&self, date: DateKey) -> Option<JournalEntry> {
        self.snapshots
            .borrow()
            .iter()
            .find(|entry| entry.date == date)
            .cloned()
    }

    /// Watch the entry list; a new snapshot is published after every change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Add an image to `date`. Returns once the image is visible in the
    /// entry list; for a signed-in user the upload continues in the
    /// background.
    pub async fn add_image(&self, date: DateKey, data: impl Into<Bytes>) -> Result<JournalImage> {
        let data = data.into();
        self.request(|reply| Command::AddImage { date, data, reply })
            .await?
    }

    pub async fn delete_image(&self, date: DateKey, image: JournalImage) -> Result<()> {
        self.request(|reply| Command::DeleteImage { date, image, reply })
            .await?
    }

    /// Replace the day's audio with `data`.
    pub async fn set_audio(&self, date: DateKey, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.request(|reply| Command::SetAudio { date, data, reply })
            .await?
    }

    /// Same as [`set_audio`](Self::set_audio): takes are combined by the
    /// recorder before they reach the engine.
    pub async fn append_audio(&self, date: DateKey, data: impl Into<Bytes>) -> Result<()> {
        self.set_audio(date, data).await
    }

    pub async fn delete_audio(&self, date: DateKey) -> Result<()> {
        self.request(|reply| Command::DeleteAudio { date, reply })
            .await?
    }

    /// Resolve an image reference (remote URL or guest file path) to bytes.
    pub async fn load_image(&self, reference: &str) -> ImageLoad {
        if reference.contains("://") {
            return self.loader.load(reference).await;
        }
        match self.blobs.load(reference) {
            Ok(Some(data)) => match media::decode(&data) {
                Ok(_) => ImageLoad::Loaded(Bytes::from(data)),
                Err(e) => {
                    warn!(reference, error = %e, "Failed to decode local image");
                    ImageLoad::Failed
                }
            },
            Ok(None) => ImageLoad::Unavailable,
            Err(e) => {
                warn!(reference, error = %e, "Failed to read local image");
                ImageLoad::Unavailable
            }
        }
    }

    /// Store a new guest avatar and return its local path.
    pub async fn set_guest_profile_image(&self, data: impl Into<Bytes>) -> Result<String> {
        let data = data.into();
        self.request(|reply| Command::SetGuestProfileImage { data, reply })
            .await?
    }

    /// Move all guest data to `user`. See [`migration::migrate_guest`].
    pub async fn migrate_guest(&self, user: UserId) -> Result<MigrationReport> {
        self.request(|reply| Command::MigrateGuest { user, reply })
            .await?
    }

    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            debug!("Journal engine already stopped");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SyncError::EngineClosed)?;
        rx.await.map_err(|_| SyncError::EngineClosed)
    }
}

// ---------------------------------------------------------------------------
// Engine task
// ---------------------------------------------------------------------------

struct Engine {
    config: EngineConfig,
    remote: Arc<dyn RemoteStore>,
    feed: Arc<dyn EntryFeed>,
    guest: GuestStore,
    notifier: Arc<dyn ReminderNotifier>,
    loader: Arc<ImageLoader>,
    mailbox: mpsc::WeakSender<Command>,
    snapshots: watch::Sender<Snapshot>,
    entries: EntryList,
    identity: Option<Identity>,
    subscription: Option<FeedSubscription>,
    /// Whether the current subscription already delivered its initial batch.
    initial_received: bool,
    /// Bumped whenever the entry list is reset.
    session: u64,
}

impl Engine {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd).await,
                },
                batch = next_feed_batch(&mut self.subscription) => match batch {
                    Some(batch) => self.apply_feed_batch(batch),
                    None => {
                        warn!(identity = ?self.identity, "Entry feed closed");
                        self.subscription = None;
                    }
                },
            }
        }
        info!("Journal engine stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Attach { identity, reply } => {
                let _ = reply.send(self.attach(identity).await);
            }
            Command::Detach { reply } => {
                info!(identity = ?self.identity, "Detaching");
                self.reset(None);
                self.publish();
                let _ = reply.send(());
            }
            Command::AddImage { date, data, reply } => {
                let _ = reply.send(self.add_image(date, data));
            }
            Command::DeleteImage { date, image, reply } => {
                let _ = reply.send(self.delete_image(date, image));
            }
            Command::SetAudio { date, data, reply } => {
                let _ = reply.send(self.set_audio(date, data));
            }
            Command::DeleteAudio { date, reply } => {
                let _ = reply.send(self.delete_audio(date));
            }
            Command::SetGuestProfileImage { data, reply } => {
                let _ = reply.send(self.set_guest_profile_image(data));
            }
            Command::MigrateGuest { user, reply } => {
                let _ = reply.send(self.migrate_guest(user).await);
            }
            Command::ImageUploaded {
                session,
                date,
                image_id,
                url,
            } => {
                if self.is_current(session) && self.entries.mark_uploaded(date, image_id, &url) {
                    self.publish();
                }
            }
            Command::ImageCommitted {
                session,
                date,
                image_id,
            } => {
                if self.is_current(session) && self.entries.resolve_pending(date, image_id) {
                    self.publish();
                }
            }
            Command::AudioCommitted {
                session,
                date,
                url,
                replaced,
            } => {
                if !self.is_current(session) {
                    return;
                }
                let current = self.entries.get(date).and_then(|entry| entry.audio_url.clone());
                // The feed may already carry a later take.
                if current != replaced {
                    debug!(date = %date, url = %url, "Audio superseded before commit was applied");
                    return;
                }
                self.entries.update(date, |entry| entry.audio_url = Some(url));
                self.publish();
                self.evaluate_reminder();
            }
            // Intercepted by the run loop.
            Command::Shutdown => {}
        }
    }

    // -- identity -----------------------------------------------------------

    async fn attach(&mut self, identity: Identity) -> Result<()> {
        if self.identity.as_ref() == Some(&identity) && self.source_active() {
            debug!(identity = %identity, "Already attached");
            return Ok(());
        }

        info!(identity = %identity, "Attaching");
        self.reset(Some(identity.clone()));
        self.publish();

        match identity {
            Identity::Guest => {
                if let Err(e) = self.load_guest() {
                    error!(error = %e, "Failed to load guest entries");
                    self.identity = None;
                    return Err(e);
                }
                self.publish();
                self.evaluate_reminder();
            }
            Identity::User(user) => match self.feed.subscribe(&user).await {
                Ok(subscription) => self.subscription = Some(subscription),
                Err(e) => {
                    warn!(user = %user, error = %e, "Failed to open entry feed");
                    self.identity = None;
                    return Err(e.into());
                }
            },
        }
        Ok(())
    }

    fn load_guest(&mut self) -> Result<()> {
        self.guest.db.set_guest_active(true)?;
        let entries = self.guest.db.list_entries()?;
        info!(count = entries.len(), "Loaded guest entries");
        self.entries.replace_all(entries);
        Ok(())
    }

    fn source_active(&self) -> bool {
        match &self.identity {
            Some(Identity::Guest) => true,
            Some(Identity::User(_)) => self.subscription.is_some(),
            None => false,
        }
    }

    fn reset(&mut self, identity: Option<Identity>) {
        self.entries.clear();
        self.subscription = None;
        self.initial_received = false;
        self.session += 1;
        self.identity = identity;
    }

    fn attached(&self) -> Result<Identity> {
        self.identity.clone().ok_or(SyncError::NotAttached)
    }

    fn is_current(&self, session: u64) -> bool {
        if session != self.session {
            debug!(session, current = self.session, "Dropping stale background result");
            return false;
        }
        true
    }

    // -- feed ---------------------------------------------------------------

    fn apply_feed_batch(&mut self, batch: FeedBatch) {
        let applied = if self.initial_received {
            self.entries.apply_batch(&batch)
        } else {
            self.initial_received = true;
            self.entries.apply_initial_batch(&batch)
        };
        debug!(changes = batch.len(), applied, "Applied feed batch");
        if applied > 0 {
            self.publish();
        }
        self.evaluate_reminder();
    }

    // -- images -------------------------------------------------------------

    fn add_image(&mut self, date: DateKey, data: Bytes) -> Result<JournalImage> {
        let identity = self.attached()?;
        let decoded = media::decode(&data)?;

        match identity {
            Identity::Guest => {
                let encoded = media::prepare_for_storage(
                    &decoded,
                    self.config.max_image_dimension,
                    self.config.jpeg_quality,
                )?;
                let path = self.guest.blobs.save_image(&encoded, date)?;
                let entry = self.entries.update(date, |entry| entry.images.push(path.clone()));
                self.persist_guest(entry);
                self.publish();
                self.evaluate_reminder();
                Ok(JournalImage::confirmed(path))
            }
            Identity::User(user) => {
                let pending = JournalImage::pending(data);
                self.entries.add_pending_image(date, pending.clone());
                self.publish();
                self.spawn_image_upload(user, date, pending.id, decoded);
                Ok(pending)
            }
        }
    }

    fn spawn_image_upload(&self, user: UserId, date: DateKey, image_id: Uuid, decoded: DynamicImage) {
        let remote = self.remote.clone();
        let mailbox = self.mailbox.clone();
        let session = self.session;
        let max_dimension = self.config.max_image_dimension;
        let quality = self.config.jpeg_quality;

        tokio::spawn(async move {
            let encoded = match tokio::task::spawn_blocking(move || {
                media::prepare_for_storage(&decoded, max_dimension, quality)
            })
            .await
            {
                Ok(Ok(encoded)) => encoded,
                Ok(Err(e)) => {
                    warn!(date = %date, error = %e, "Failed to encode image");
                    return;
                }
                Err(e) => {
                    error!(date = %date, error = %e, "Image encode task failed");
                    return;
                }
            };

            let path = image_blob_path(&user, &Uuid::new_v4());
            let url = match remote.upload_blob(&path, encoded).await {
                Ok(url) => url,
                Err(e) => {
                    warn!(date = %date, error = %e, "Image upload failed, keeping pending image");
                    return;
                }
            };
            debug!(date = %date, url = %url, "Image uploaded");
            post(
                &mailbox,
                Command::ImageUploaded {
                    session,
                    date,
                    image_id,
                    url: url.clone(),
                },
            )
            .await;

            let mut update = date_update(date);
            update.push((
                FIELD_IMAGES.to_string(),
                FieldOp::ArrayUnion(vec![Value::String(url.clone())]),
            ));
            match remote.upsert_merge(&user, date, update).await {
                Ok(()) => {
                    post(
                        &mailbox,
                        Command::ImageCommitted {
                            session,
                            date,
                            image_id,
                        },
                    )
                    .await;
                }
                Err(e) => warn!(date = %date, url = %url, error = %e, "Failed to record image"),
            }
        });
    }

    fn delete_image(&mut self, date: DateKey, image: JournalImage) -> Result<()> {
        let identity = self.attached()?;

        let removed = self
            .entries
            .update_existing(date, |entry| entry.remove_image(&image))
            .unwrap_or(false);
        if removed {
            self.publish();
        }

        match identity {
            Identity::Guest => {
                if !removed {
                    debug!(date = %date, "Image not on this day, keeping its file");
                    return Ok(());
                }
                if let Some(entry) = self.entries.get(date).cloned() {
                    self.persist_guest(entry);
                }
                self.evaluate_reminder();
                if let Some(path) = &image.url {
                    self.discard_guest_blob(path);
                }
            }
            Identity::User(user) => {
                let Some(url) = image.url else {
                    debug!(date = %date, "Pending image dropped locally");
                    return Ok(());
                };
                self.loader.evict(&url);
                self.spawn_remote_image_delete(user, date, url);
            }
        }
        Ok(())
    }

    fn spawn_remote_image_delete(&self, user: UserId, date: DateKey, url: String) {
        let remote = self.remote.clone();

        tokio::spawn(async move {
            match remote.delete_blob(&url).await {
                Ok(()) => debug!(url = %url, "Deleted image blob"),
                Err(e) if e.is_not_found() => debug!(url = %url, "Image blob already gone"),
                Err(e) => warn!(url = %url, error = %e, "Failed to delete image blob"),
            }

            // The reference goes regardless of what happened to the blob.
            let remove = vec![(
                FIELD_IMAGES.to_string(),
                FieldOp::ArrayRemove(vec![Value::String(url.clone())]),
            )];
            let update: Transaction = Box::new(move |doc: &mut Document| apply_field_ops(doc, remove));
            if let Err(e) = remote.run_transaction(&user, date, update).await {
                warn!(date = %date, url = %url, error = %e, "Failed to remove image reference");
            }
        });
    }

    // -- audio --------------------------------------------------------------

    fn set_audio(&mut self, date: DateKey, data: Bytes) -> Result<()> {
        let identity = self.attached()?;
        if data.is_empty() {
            return Err(MediaError::Empty.into());
        }
        match identity {
            Identity::Guest => {
                let previous = self.entries.get(date).and_then(|entry| entry.audio_url.clone());
                let path = self.guest.blobs.save_audio(&data, date)?;
                let entry = self.entries.update(date, |entry| entry.audio_url = Some(path.clone()));
                self.persist_guest(entry);
                if let Some(old) = previous {
                    self.discard_guest_blob(&old);
                }
                self.publish();
                self.evaluate_reminder();
            }
            Identity::User(user) => self.spawn_audio_upload(user, date, data),
        }
        Ok(())
    }

    fn spawn_audio_upload(&self, user: UserId, date: DateKey, data: Bytes) {
        let remote = self.remote.clone();
        let mailbox = self.mailbox.clone();
        let session = self.session;

        tokio::spawn(async move {
            let path = audio_blob_path(&user, &Uuid::new_v4());
            let url = match remote.upload_blob(&path, data).await {
                Ok(url) => url,
                Err(e) => {
                    warn!(date = %date, error = %e, "Audio upload failed");
                    return;
                }
            };

            let replaced = match record_audio(remote.as_ref(), &user, date, &url).await {
                Ok(Some(replaced)) => replaced,
                Ok(None) => {
                    warn!(date = %date, url = %url, "Entry vanished before audio was recorded");
                    discard_remote_blob(remote.as_ref(), &url, "unrecorded audio").await;
                    return;
                }
                Err(e) => {
                    warn!(date = %date, url = %url, error = %e, "Failed to record audio");
                    return;
                }
            };
            post(
                &mailbox,
                Command::AudioCommitted {
                    session,
                    date,
                    url: url.clone(),
                    replaced: replaced.clone(),
                },
            )
            .await;

            if let Some(old) = replaced.filter(|old| *old != url) {
                discard_remote_blob(remote.as_ref(), &old, "replaced audio").await;
            }
        });
    }

    fn delete_audio(&mut self, date: DateKey) -> Result<()> {
        let identity = self.attached()?;
        let Some(url) = self.entries.get(date).and_then(|entry| entry.audio_url.clone()) else {
            debug!(date = %date, "No audio to delete");
            return Ok(());
        };

        let entry = self.entries.update(date, |entry| entry.audio_url = None);
        self.publish();

        match identity {
            Identity::Guest => {
                self.persist_guest(entry);
                self.discard_guest_blob(&url);
                self.evaluate_reminder();
            }
            Identity::User(user) => {
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    match remote.delete_blob(&url).await {
                        Ok(()) => debug!(url = %url, "Deleted audio blob"),
                        Err(e) if e.is_not_found() => debug!(url = %url, "Audio blob already gone"),
                        Err(e) => warn!(url = %url, error = %e, "Failed to delete audio blob"),
                    }
                    if let Err(e) = remote.delete_field(&user, date, FIELD_AUDIO_URL).await {
                        warn!(date = %date, error = %e, "Failed to remove audio reference");
                    }
                });
            }
        }
        Ok(())
    }

    // -- guest profile and migration -----------------------------------------

    fn set_guest_profile_image(&mut self, data: Bytes) -> Result<String> {
        if self.identity != Some(Identity::Guest) {
            return Err(SyncError::GuestModeRequired);
        }
        let decoded = media::decode(&data)?;
        let encoded = media::prepare_for_storage(
            &decoded,
            self.config.max_image_dimension,
            self.config.jpeg_quality,
        )?;

        let path = self.guest.blobs.save_profile_image(&encoded)?;
        let previous = self.guest.db.guest_profile_image()?;
        self.guest.db.set_guest_profile_image(Some(&path))?;
        if let Some(old) = previous {
            self.discard_guest_blob(&old);
        }
        info!(path = %path, "Guest profile image updated");
        Ok(path)
    }

    async fn migrate_guest(&mut self, user: UserId) -> Result<MigrationReport> {
        let report = migration::migrate_guest(&mut self.guest, self.remote.as_ref(), &user).await?;
        if self.identity == Some(Identity::Guest) {
            self.reset(None);
            self.publish();
        }
        Ok(report)
    }

    // -- helpers ------------------------------------------------------------

    // The in-memory version stands even if the write fails.
    fn persist_guest(&mut self, entry: JournalEntry) {
        match self.guest.db.save_entry(&entry) {
            Ok(saved) if entry.id.is_none() => {
                self.entries
                    .update_existing(entry.date, |current| current.id = saved.id);
            }
            Ok(_) => {}
            Err(e) => warn!(date = %entry.date, error = %e, "Failed to persist guest entry"),
        }
    }

    fn discard_guest_blob(&self, path: &str) {
        if !self.guest.blobs.owns(path) {
            return;
        }
        if let Err(e) = self.guest.blobs.delete(path) {
            warn!(path, error = %e, "Failed to delete guest blob");
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.entries.snapshot()));
    }

    fn evaluate_reminder(&self) {
        let Some(identity) = &self.identity else {
            return;
        };
        let completed = self.entries.is_completed(DateKey::today());
        self.notifier.on_entry_updated(identity, completed);
        if completed {
            self.notifier.clear_badge();
        }
    }
}

async fn next_feed_batch(subscription: &mut Option<FeedSubscription>) -> Option<FeedBatch> {
    match subscription {
        Some(subscription) => subscription.next_batch().await,
        None => std::future::pending().await,
    }
}

/// Point the day's `audioURL` at `url` and return what it replaced.
///
/// The swap runs as a transaction so overlapping takes each learn exactly
/// which reference they superseded. `Ok(None)` means the document was gone
/// by the time the transaction ran.
async fn record_audio(
    remote: &dyn RemoteStore,
    user: &UserId,
    date: DateKey,
    url: &str,
) -> daybook_remote::Result<Option<Option<String>>> {
    // Creates the document if the day has none yet.
    remote.upsert_merge(user, date, date_update(date)).await?;

    let (tx, rx) = oneshot::channel();
    let value = Value::String(url.to_string());
    let update: Transaction = Box::new(move |doc: &mut Document| {
        let old = doc.insert(FIELD_AUDIO_URL.to_string(), value);
        let _ = tx.send(old.and_then(|old| old.as_str().map(str::to_string)));
    });
    remote.run_transaction(user, date, update).await?;
    Ok(rx.await.ok())
}

async fn discard_remote_blob(remote: &dyn RemoteStore, url: &str, what: &str) {
    match remote.delete_blob(url).await {
        Ok(()) => debug!(url, what, "Deleted remote blob"),
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!(url, what, error = %e, "Failed to delete remote blob"),
    }
}

async fn post(mailbox: &mpsc::WeakSender<Command>, command: Command) {
    let Some(tx) = mailbox.upgrade() else {
        debug!("Journal engine gone, dropping background result");
        return;
    };
    if tx.send(command).await.is_err() {
        debug!("Journal engine gone, dropping background result");
    }
}
