use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use stowage_core::ObjectLocation;

use crate::progress::ProgressBoard;
use crate::source::UploadFile;
use crate::transport::UploadTransport;
use crate::uploader::Uploader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub id: Uuid,
    pub file_name: String,
    pub location: ObjectLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub id: Uuid,
    pub file_name: String,
    pub message: String,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<(Uuid, UploadFile)>,
    active: Option<(Uuid, CancellationToken)>,
    completed: Vec<CompletedUpload>,
    failed: Vec<FailedUpload>,
}

/// Uploads queued files one after another, each in its own session with its own progress entry.
pub struct UploadQueue<T> {
    uploader: Uploader<T>,
    progress: ProgressBoard,
    state: Mutex<QueueState>,
}

impl<T: UploadTransport> UploadQueue<T> {
    pub fn new(uploader: Uploader<T>) -> Self {
        Self {
            uploader,
            progress: ProgressBoard::new(),
            state: Mutex::new(QueueState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn uploader(&self) -> &Uploader<T> {
        &self.uploader
    }

    /// Progress of every upload that is queued or running.
    pub fn progress(&self) -> &ProgressBoard {
        &self.progress
    }

    /// Queue `file`, returning the id its progress and outcome are reported under.
    pub fn enqueue(&self, file: UploadFile) -> Uuid {
        let id = Uuid::new_v4();
        self.progress.insert(id);
        self.state().pending.push_back((id, file));
        id
    }

    /// Cancel an upload. A queued upload is dropped from the queue without any network call, the
    /// running upload is stopped and its session aborted. Returns `false` for unknown ids.
    pub fn cancel(&self, id: &Uuid) -> bool {
        let mut state = self.state();
        if let Some(index) = state.pending.iter().position(|(queued, _)| queued == id) {
            state.pending.remove(index);
            self.progress.remove(id);
            tracing::debug!("removed upload {id} from the queue");
            return true;
        }
        match &state.active {
            Some((active, token)) if active == id => {
                token.cancel();
                tracing::debug!("cancelling upload {id}");
                true
            }
            _ => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }

    pub fn completed(&self) -> Vec<CompletedUpload> {
        self.state().completed.clone()
    }

    pub fn failed(&self) -> Vec<FailedUpload> {
        self.state().failed.clone()
    }

    /// Forget the outcomes of finished uploads. Queued and running uploads are unaffected.
    pub fn clear_history(&self) {
        let mut state = self.state();
        state.completed.clear();
        state.failed.clear();
    }

    fn next(&self) -> Option<(Uuid, UploadFile, CancellationToken)> {
        let mut state = self.state();
        let (id, file) = state.pending.pop_front()?;
        let token = CancellationToken::new();
        state.active = Some((id, token.clone()));
        Some((id, file, token))
    }

    /// Upload everything queued, including files queued while running, until the queue is
    /// empty.
    pub async fn run(&self) {
        while let Some((id, file, cancel)) = self.next() {
            let progress = self.progress.clone();
            let on_progress = move |percent: u8| progress.update(id, percent);
            let result = self.uploader.upload(&file, &on_progress, &cancel).await;

            self.progress.remove(&id);
            let mut state = self.state();
            state.active = None;
            match result {
                Ok(location) => state.completed.push(CompletedUpload {
                    id,
                    file_name: file.name().to_string(),
                    location,
                }),
                Err(e) => {
                    tracing::warn!("upload of {} failed: {e}", file.name());
                    state.failed.push(FailedUpload {
                        id,
                        file_name: file.name().to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}
