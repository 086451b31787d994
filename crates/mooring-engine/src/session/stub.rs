use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mooring_core::{
    AddRequest, EngineError, EngineEvent, EngineHandle, EngineResult, EngineSession, EngineState,
    FilePriority, InfoHash, LiveFile, LiveStatus, Metainfo, SessionSettings,
};

use crate::magnet::MagnetLink;

/// Control call recorded by [`StubSession`] for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    /// A task was admitted.
    Add {
        /// Fingerprint of the admitted task.
        info_hash: InfoHash,
    },
    /// Pause was requested.
    Pause {
        /// Target task.
        info_hash: InfoHash,
    },
    /// Resume was requested.
    Resume {
        /// Target task.
        info_hash: InfoHash,
    },
    /// Queue management was toggled.
    SetAutoManaged {
        /// Target task.
        info_hash: InfoHash,
        /// Requested flag.
        enabled: bool,
    },
    /// The priority vector was replaced.
    SetFilePriorities {
        /// Target task.
        info_hash: InfoHash,
        /// Applied vector.
        levels: Vec<u8>,
    },
    /// The task was removed.
    Remove {
        /// Target task.
        info_hash: InfoHash,
        /// Whether payload deletion was requested.
        delete_files: bool,
    },
    /// Resume data was requested.
    SaveResumeData {
        /// Target task.
        info_hash: InfoHash,
    },
}

/// In-memory engine used by tests and by the binary when no native engine
/// is linked.
///
/// Behaves like a cooperative engine by default; test hooks inject the
/// instabilities a real engine shows (stale handles, lookup misses, failed
/// calls, ignored pauses).
#[derive(Default)]
pub struct StubSession {
    state: Mutex<StubState>,
}

#[derive(Default)]
struct StubState {
    started: bool,
    settings: Option<SessionSettings>,
    torrents: HashMap<InfoHash, StubTorrent>,
    next_generation: u64,
    catalog: HashMap<InfoHash, Metainfo>,
    pending_events: Vec<EngineEvent>,
    calls: Vec<StubCall>,
    hidden: HashSet<InfoHash>,
    failures: HashMap<&'static str, String>,
    resume_saved: Vec<InfoHash>,
    ignore_pause_while_auto_managed: bool,
}

struct StubTorrent {
    generation: u64,
    status: LiveStatus,
    files: Vec<StubFile>,
    save_path: PathBuf,
}

struct StubFile {
    path: String,
    size: u64,
    downloaded: u64,
    priority: u8,
}

impl StubState {
    fn take_failure(&mut self, operation: &'static str) -> EngineResult<()> {
        self.failures
            .remove(operation)
            .map_or(Ok(()), |message| {
                Err(EngineError::Rejected { operation, message })
            })
    }

    fn require_started(&self, operation: &'static str) -> EngineResult<()> {
        if self.started {
            Ok(())
        } else {
            Err(EngineError::NotStarted { operation })
        }
    }

    fn torrent(
        &mut self,
        operation: &'static str,
        handle: &EngineHandle,
    ) -> EngineResult<&mut StubTorrent> {
        self.take_failure(operation)?;
        match self.torrents.get_mut(&handle.info_hash) {
            Some(torrent) if torrent.generation == handle.generation => Ok(torrent),
            _ => Err(EngineError::InvalidHandle {
                operation,
                info_hash: handle.info_hash.clone(),
            }),
        }
    }
}

impl StubSession {
    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make metadata for a magnet identity resolvable. Unregistered
    /// identities never resolve.
    pub fn register_metadata(&self, metainfo: Metainfo) {
        self.lock()
            .catalog
            .insert(metainfo.info_hash.clone(), metainfo);
    }

    /// Mutate the live status of a task.
    pub fn update_status(&self, info_hash: &InfoHash, apply: impl FnOnce(&mut LiveStatus)) {
        if let Some(torrent) = self.lock().torrents.get_mut(info_hash) {
            apply(&mut torrent.status);
        }
    }

    /// Set downloaded bytes for the file at engine position `index`.
    pub fn set_file_progress(&self, info_hash: &InfoHash, index: usize, downloaded: u64) {
        if let Some(file) = self
            .lock()
            .torrents
            .get_mut(info_hash)
            .and_then(|torrent| torrent.files.get_mut(index))
        {
            file.downloaded = downloaded.min(file.size);
        }
    }

    /// Reverse the engine file order, as engines may after a metadata
    /// refresh.
    pub fn reverse_file_order(&self, info_hash: &InfoHash) {
        if let Some(torrent) = self.lock().torrents.get_mut(info_hash) {
            torrent.files.reverse();
        }
    }

    /// Drop every file from the engine view, as before metadata arrives.
    pub fn clear_files(&self, info_hash: &InfoHash) {
        if let Some(torrent) = self.lock().torrents.get_mut(info_hash) {
            torrent.files.clear();
        }
    }

    /// Mark a task as fully downloaded and seeding, queueing a finished
    /// event.
    pub fn complete(&self, info_hash: &InfoHash) {
        let mut state = self.lock();
        let Some(torrent) = state.torrents.get_mut(info_hash) else {
            return;
        };
        for file in &mut torrent.files {
            if file.priority != FilePriority::SKIP.level() {
                file.downloaded = file.size;
            }
        }
        let status = &mut torrent.status;
        status.finished = true;
        status.seeding = true;
        status.state = EngineState::Seeding;
        status.progress = 1.0;
        status.total_done = status.total_wanted;
        status.all_time_download = status.total_wanted;
        status.download_rate = 0;
        state.pending_events.push(EngineEvent::Finished {
            info_hash: info_hash.clone(),
        });
    }

    /// Forget a task without emitting an event; its handles go stale.
    pub fn drop_silently(&self, info_hash: &InfoHash) {
        self.lock().torrents.remove(info_hash);
    }

    /// Make direct lookup miss for `info_hash` while scans still see it.
    pub fn hide_from_lookup(&self, info_hash: &InfoHash) {
        self.lock().hidden.insert(info_hash.clone());
    }

    /// Fail the next call of `operation` with `message`.
    pub fn fail_next(&self, operation: &'static str, message: impl Into<String>) {
        self.lock().failures.insert(operation, message.into());
    }

    /// Ignore pause requests while the task is auto-managed.
    pub fn set_ignore_pause_while_auto_managed(&self, ignore: bool) {
        self.lock().ignore_pause_while_auto_managed = ignore;
    }

    /// Queue an event for the next poll.
    pub fn push_event(&self, event: EngineEvent) {
        self.lock().pending_events.push(event);
    }

    /// Control calls seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StubCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded control calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Identities whose resume data was saved.
    #[must_use]
    pub fn resume_data_saved(&self) -> Vec<InfoHash> {
        self.lock().resume_saved.clone()
    }

    /// Settings applied by the last successful start.
    #[must_use]
    pub fn settings(&self) -> Option<SessionSettings> {
        self.lock().settings.clone()
    }

    /// Whether the session is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// Directory the task was admitted with.
    #[must_use]
    pub fn save_path(&self, info_hash: &InfoHash) -> Option<PathBuf> {
        self.lock()
            .torrents
            .get(info_hash)
            .map(|torrent| torrent.save_path.clone())
    }

    /// Current live status of a task, bypassing handles.
    #[must_use]
    pub fn peek_status(&self, info_hash: &InfoHash) -> Option<LiveStatus> {
        self.lock()
            .torrents
            .get(info_hash)
            .map(|torrent| torrent.status.clone())
    }
}

#[async_trait]
impl EngineSession for StubSession {
    async fn start(&self, settings: &SessionSettings) -> EngineResult<()> {
        let mut state = self.lock();
        state.take_failure("start")?;
        state.started = true;
        state.settings = Some(settings.clone());
        Ok(())
    }

    async fn stop(&self) -> EngineResult<()> {
        let mut state = self.lock();
        state.take_failure("stop")?;
        state.started = false;
        Ok(())
    }

    async fn find(&self, info_hash: &InfoHash) -> EngineResult<Option<EngineHandle>> {
        let mut state = self.lock();
        state.require_started("find")?;
        state.take_failure("find")?;
        if state.hidden.contains(info_hash) {
            return Ok(None);
        }
        Ok(state.torrents.get(info_hash).map(|torrent| EngineHandle {
            info_hash: info_hash.clone(),
            generation: torrent.generation,
        }))
    }

    async fn handles(&self) -> EngineResult<Vec<EngineHandle>> {
        let mut state = self.lock();
        state.require_started("handles")?;
        state.take_failure("handles")?;
        Ok(state
            .torrents
            .iter()
            .map(|(info_hash, torrent)| EngineHandle {
                info_hash: info_hash.clone(),
                generation: torrent.generation,
            })
            .collect())
    }

    fn is_valid(&self, handle: &EngineHandle) -> bool {
        self.lock()
            .torrents
            .get(&handle.info_hash)
            .is_some_and(|torrent| torrent.generation == handle.generation)
    }

    async fn fetch_metadata(&self, magnet: &str) -> EngineResult<Metainfo> {
        let link = MagnetLink::parse(magnet)?;
        let resolved = {
            let mut state = self.lock();
            state.require_started("fetch_metadata")?;
            state.take_failure("fetch_metadata")?;
            state.catalog.get(&link.info_hash).cloned()
        };
        match resolved {
            Some(metainfo) => Ok(metainfo),
            None => std::future::pending().await,
        }
    }

    async fn add(&self, request: AddRequest) -> EngineResult<EngineHandle> {
        let mut state = self.lock();
        state.require_started("add")?;
        state.take_failure("add")?;
        let info_hash = request.metainfo.info_hash.clone();
        if state.torrents.contains_key(&info_hash) {
            return Err(EngineError::Duplicate { info_hash });
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let total_wanted = request.metainfo.total_size();
        let files = request
            .metainfo
            .files
            .iter()
            .map(|file| StubFile {
                path: file.path.clone(),
                size: file.size,
                downloaded: 0,
                priority: FilePriority::NORMAL.level(),
            })
            .collect();
        state.torrents.insert(
            info_hash.clone(),
            StubTorrent {
                generation,
                status: LiveStatus {
                    auto_managed: true,
                    state: EngineState::Downloading,
                    total_wanted,
                    ..LiveStatus::default()
                },
                files,
                save_path: request.save_path,
            },
        );
        state.hidden.remove(&info_hash);
        state.calls.push(StubCall::Add {
            info_hash: info_hash.clone(),
        });
        state.pending_events.push(EngineEvent::Added {
            info_hash: info_hash.clone(),
        });
        Ok(EngineHandle {
            info_hash,
            generation,
        })
    }

    async fn status(&self, handle: &EngineHandle) -> EngineResult<LiveStatus> {
        let mut state = self.lock();
        Ok(state.torrent("status", handle)?.status.clone())
    }

    async fn files(&self, handle: &EngineHandle) -> EngineResult<Vec<LiveFile>> {
        let mut state = self.lock();
        let torrent = state.torrent("files", handle)?;
        Ok(torrent
            .files
            .iter()
            .enumerate()
            .map(|(index, file)| LiveFile {
                index,
                path: file.path.clone(),
                size: file.size,
                downloaded: if file.priority == FilePriority::SKIP.level() {
                    0
                } else {
                    file.downloaded
                },
            })
            .collect())
    }

    async fn file_priorities(&self, handle: &EngineHandle) -> EngineResult<Vec<u8>> {
        let mut state = self.lock();
        let torrent = state.torrent("file_priorities", handle)?;
        Ok(torrent.files.iter().map(|file| file.priority).collect())
    }

    async fn set_file_priorities(&self, handle: &EngineHandle, levels: &[u8]) -> EngineResult<()> {
        let mut state = self.lock();
        let torrent = state.torrent("set_file_priorities", handle)?;
        if levels.len() != torrent.files.len() {
            return Err(EngineError::Rejected {
                operation: "set_file_priorities",
                message: format!(
                    "expected {} priorities, got {}",
                    torrent.files.len(),
                    levels.len()
                ),
            });
        }
        for (file, level) in torrent.files.iter_mut().zip(levels) {
            file.priority = *level;
        }
        state.calls.push(StubCall::SetFilePriorities {
            info_hash: handle.info_hash.clone(),
            levels: levels.to_vec(),
        });
        Ok(())
    }

    async fn pause(&self, handle: &EngineHandle) -> EngineResult<()> {
        let mut state = self.lock();
        let ignore = state.ignore_pause_while_auto_managed;
        let status = &mut state.torrent("pause", handle)?.status;
        if !(ignore && status.auto_managed) {
            status.paused = true;
            status.download_rate = 0;
            status.upload_rate = 0;
        }
        state.calls.push(StubCall::Pause {
            info_hash: handle.info_hash.clone(),
        });
        Ok(())
    }

    async fn resume(&self, handle: &EngineHandle) -> EngineResult<()> {
        let mut state = self.lock();
        state.torrent("resume", handle)?.status.paused = false;
        state.calls.push(StubCall::Resume {
            info_hash: handle.info_hash.clone(),
        });
        Ok(())
    }

    async fn set_auto_managed(&self, handle: &EngineHandle, enabled: bool) -> EngineResult<()> {
        let mut state = self.lock();
        state.torrent("set_auto_managed", handle)?.status.auto_managed = enabled;
        state.calls.push(StubCall::SetAutoManaged {
            info_hash: handle.info_hash.clone(),
            enabled,
        });
        Ok(())
    }

    async fn remove(&self, handle: &EngineHandle, delete_files: bool) -> EngineResult<()> {
        let mut state = self.lock();
        state.torrent("remove", handle)?;
        state.torrents.remove(&handle.info_hash);
        state.calls.push(StubCall::Remove {
            info_hash: handle.info_hash.clone(),
            delete_files,
        });
        state.pending_events.push(EngineEvent::Removed {
            info_hash: handle.info_hash.clone(),
        });
        Ok(())
    }

    async fn save_resume_data(&self, handle: &EngineHandle) -> EngineResult<()> {
        let mut state = self.lock();
        state.torrent("save_resume_data", handle)?;
        state.resume_saved.push(handle.info_hash.clone());
        state.calls.push(StubCall::SaveResumeData {
            info_hash: handle.info_hash.clone(),
        });
        Ok(())
    }

    async fn poll_events(&self) -> EngineResult<Vec<EngineEvent>> {
        Ok(std::mem::take(&mut self.lock().pending_events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mooring_core::MetaFile;

    fn hash(ch: char) -> InfoHash {
        InfoHash::parse(&ch.to_string().repeat(40)).expect("valid hash")
    }

    fn request(ch: char) -> AddRequest {
        AddRequest {
            metainfo: Metainfo {
                info_hash: hash(ch),
                name: "pack".into(),
                files: vec![
                    MetaFile {
                        path: "pack/a.mkv".into(),
                        size: 100,
                    },
                    MetaFile {
                        path: "pack/b.nfo".into(),
                        size: 20,
                    },
                ],
                comment: None,
                created_by: None,
                creation_date: None,
            },
            save_path: PathBuf::from("/downloads"),
        }
    }

    async fn started() -> anyhow::Result<StubSession> {
        let session = StubSession::default();
        session.start(&SessionSettings::default()).await?;
        Ok(session)
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_emits_added() -> anyhow::Result<()> {
        let session = started().await?;
        let handle = session.add(request('a')).await?;
        assert!(matches!(
            session.add(request('a')).await,
            Err(EngineError::Duplicate { .. })
        ));
        let events = session.poll_events().await?;
        assert_eq!(events, vec![EngineEvent::Added { info_hash: hash('a') }]);

        let status = session.status(&handle).await?;
        assert!(status.auto_managed);
        assert_eq!(status.total_wanted, 120);
        assert_eq!(session.file_priorities(&handle).await?, vec![4, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn stale_handles_are_rejected_after_readd() -> anyhow::Result<()> {
        let session = started().await?;
        let first = session.add(request('a')).await?;
        session.drop_silently(&hash('a'));
        let second = session.add(request('a')).await?;

        assert!(!session.is_valid(&first));
        assert!(session.is_valid(&second));
        assert!(matches!(
            session.pause(&first).await,
            Err(EngineError::InvalidHandle { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn pause_can_be_ignored_while_auto_managed() -> anyhow::Result<()> {
        let session = started().await?;
        let handle = session.add(request('a')).await?;
        session.set_ignore_pause_while_auto_managed(true);

        session.pause(&handle).await?;
        assert!(!session.status(&handle).await?.paused);

        session.set_auto_managed(&handle, false).await?;
        session.pause(&handle).await?;
        assert!(session.status(&handle).await?.paused);
        Ok(())
    }

    #[tokio::test]
    async fn priority_vector_length_is_enforced() -> anyhow::Result<()> {
        let session = started().await?;
        let handle = session.add(request('a')).await?;
        assert!(session.set_file_priorities(&handle, &[7]).await.is_err());
        session.set_file_priorities(&handle, &[7, 0]).await?;
        session.set_file_progress(&hash('a'), 1, 15);
        let files = session.files(&handle).await?;
        assert_eq!(files[1].downloaded, 0);
        Ok(())
    }

    #[tokio::test]
    async fn operations_require_started_session() {
        let session = StubSession::default();
        assert!(matches!(
            session.add(request('a')).await,
            Err(EngineError::NotStarted { .. })
        ));
    }
}
