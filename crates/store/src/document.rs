//! In-memory JSON document with crash-safe periodic persistence.

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    serde::{Serialize, de::DeserializeOwned},
    tokio::{fs, io::AsyncWriteExt, task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    Result,
    error::{Context, Error},
};

/// Sidecar path used as the write target of every flush: `<file>.bak`.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".bak");
    PathBuf::from(raw)
}

struct StoreState<T> {
    document: T,
    /// Serialized form written by the last successful flush.
    last_flushed: String,
}

/// Handle to a persisted document.
///
/// All access goes through [`read`](Self::read) and [`update`](Self::update),
/// whose closures run to completion without yielding, so a flush never
/// observes a half-applied mutation.
pub struct PersistentStore<T> {
    path: PathBuf,
    backup: PathBuf,
    state: Mutex<StoreState<T>>,
    /// Serializes file operations between the periodic and the final flush.
    flush_lock: tokio::sync::Mutex<()>,
}

impl<T> PersistentStore<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    /// Load the document at `path`, recovering from an interrupted flush.
    ///
    /// - primary present: parse it; if it is corrupted, load the backup and
    ///   move it over the primary;
    /// - only the backup present: the process died between the backup write and
    ///   the rename, so finish the rename and load it;
    /// - neither present: start from `T::default()`.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let backup = backup_path(&path);

        let document = if exists(&path).await {
            info!(path = %path.display(), "reading store");
            match read_document::<T>(&path).await {
                Ok(doc) => doc,
                Err(primary_err) => {
                    warn!(
                        path = %path.display(),
                        error = %primary_err,
                        "store file unreadable, falling back to backup"
                    );
                    let doc = read_document::<T>(&backup)
                        .await
                        .map_err(|e| Error::corrupted(&path, e))?;
                    // The next flush starts by removing the backup, so it
                    // must not be the only readable copy.
                    fs::rename(&backup, &path)
                        .await
                        .with_context(|| format!("restore {}", backup.display()))?;
                    doc
                },
            }
        } else if exists(&backup).await {
            warn!(
                path = %path.display(),
                "found only the backup of an interrupted flush, restoring it"
            );
            fs::rename(&backup, &path)
                .await
                .with_context(|| format!("restore {}", backup.display()))?;
            read_document::<T>(&path).await?
        } else {
            info!(path = %path.display(), "creating store");
            T::default()
        };

        Ok(Self {
            path,
            backup,
            state: Mutex::new(StoreState {
                document,
                last_flushed: String::new(),
            }),
            flush_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the current document.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&state.document)
    }

    /// Mutate the document. Changes reach disk on the next flush.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state.document)
    }

    /// Write the document to disk if it changed since the last flush.
    ///
    /// Returns `true` when a write happened.
    pub async fn flush(&self) -> Result<bool> {
        let _guard = self.flush_lock.lock().await;

        let serialized = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let serialized = serde_json::to_string(&state.document)?;
            if serialized == state.last_flushed {
                return Ok(false);
            }
            serialized
        };

        self.write_atomically(&serialized).await?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_flushed = serialized;
        debug!(path = %self.path.display(), "store flushed");
        Ok(true)
    }

    /// backup write -> primary removal -> backup rename.
    async fn write_atomically(&self, serialized: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        remove_if_present(&self.backup).await?;
        let mut file = fs::File::create(&self.backup)
            .await
            .with_context(|| format!("create {}", self.backup.display()))?;
        file.write_all(serialized.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        remove_if_present(&self.path).await?;
        fs::rename(&self.backup, &self.path)
            .await
            .with_context(|| format!("rename {} into place", self.backup.display()))?;
        Ok(())
    }

    /// Flush every `every` until `cancel` fires, then flush one last time.
    pub fn spawn_flush_task(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            error!(path = %store.path.display(), error = %e, "store flush failed");
                        }
                    },
                }
            }

            match store.flush().await {
                Ok(written) => debug!(written, "final store flush"),
                Err(e) => error!(path = %store.path.display(), error = %e, "final store flush failed"),
            }
        })
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
