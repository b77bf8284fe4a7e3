//! Comment thread state for one post: loading, tree building and throttled
//! submission.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{info, warn};

use crate::blog_client::RecordStore;
use crate::cache::Clock;
use crate::comment_tree::build_comment_tree;
use crate::models::{CommentNode, CommentRecord, NewComment};
use crate::rate_limit::{RateLimitError, SubmissionLimiter};
use crate::validation::{CommentForm, ValidationError};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error("A comment is already being posted")]
    Busy,
}

enum Event {
    Loaded {
        generation: u64,
        result: Result<Vec<CommentRecord>, String>,
    },
    /// `post` is the serial of the post the write was made against, so
    /// reloads of the same thread never orphan it.
    Submitted {
        post: u64,
        submitted_at: i64,
        result: Result<(), String>,
    },
}

pub struct CommentSection {
    post_id: String,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    limiter: SubmissionLimiter,
    tree: Vec<CommentNode>,
    loading: bool,
    submitting: bool,
    error: Option<String>,
    alert: Option<String>,
    generation: u64,
    post_serial: u64,
    tx: mpsc::Sender<Event>,
    rx: Receiver<Event>,
}

impl CommentSection {
    pub fn new(post_id: &str, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, limiter: SubmissionLimiter) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut section = Self {
            post_id: post_id.to_string(),
            store,
            clock,
            limiter,
            tree: Vec::new(),
            loading: false,
            submitting: false,
            error: None,
            alert: None,
            generation: 0,
            post_serial: 0,
            tx,
            rx,
        };
        section.load();
        section
    }

    pub fn tree(&self) -> &[CommentNode] {
        &self.tree
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn submitting(&self) -> bool {
        self.submitting
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn submit_count(&self) -> u64 {
        self.limiter.count()
    }

    /// Pending user-facing message, consumed by the caller.
    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }

    /// Switches to another post, dropping the old thread and limiter state.
    pub fn set_post(&mut self, post_id: &str) {
        if self.post_id == post_id {
            return;
        }
        self.post_id = post_id.to_string();
        self.post_serial += 1;
        self.limiter.reset();
        self.submitting = false;
        self.tree.clear();
        self.load();
    }

    pub fn load(&mut self) {
        self.generation += 1;
        self.loading = true;
        self.error = None;

        let generation = self.generation;
        let store = self.store.clone();
        let post_id = self.post_id.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = store.list_comments(&post_id).map_err(|e| e.to_string());
            let _ = tx.send(Event::Loaded { generation, result });
        });
    }

    /// Clears the submission throttle and reloads the thread.
    pub fn reset(&mut self) {
        self.limiter.reset();
        self.load();
    }

    /// Validates and throttles synchronously; the write itself runs on a
    /// worker thread and is reported through [`CommentSection::poll`].
    pub fn submit(&mut self, form: &CommentForm, parent_id: Option<&str>) -> Result<(), SubmitError> {
        if self.submitting {
            return Err(SubmitError::Busy);
        }

        let comment = form.validate(&self.post_id, parent_id)?;
        let now = self.clock.now_ms();
        self.limiter.check(now)?;

        self.submitting = true;
        self.spawn_insert(comment, now);
        Ok(())
    }

    fn spawn_insert(&self, comment: NewComment, submitted_at: i64) {
        let post = self.post_serial;
        let store = self.store.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = store.insert_comment(&comment).map_err(|e| e.to_string());
            let _ = tx.send(Event::Submitted {
                post,
                submitted_at,
                result,
            });
        });
    }

    /// Applies finished loads and writes. Returns true when state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Event::Loaded { generation, result } => {
                    if generation != self.generation {
                        continue;
                    }
                    self.loading = false;
                    match result.map(build_comment_tree) {
                        Ok(Ok(tree)) => self.tree = tree,
                        Ok(Err(e)) => {
                            warn!(post_id = %self.post_id, error = %e, "comment thread rejected");
                            self.error = Some("Comments could not be displayed".to_string());
                        }
                        Err(e) => {
                            warn!(post_id = %self.post_id, error = %e, "loading comments failed");
                            self.error = Some("Failed to load comments, please refresh".to_string());
                        }
                    }
                }
                Event::Submitted { post, .. } if post != self.post_serial => {
                    // Written against a post that is no longer shown.
                    continue;
                }
                Event::Submitted { submitted_at, result, .. } => {
                    self.submitting = false;
                    match result {
                        Ok(()) => {
                            info!(post_id = %self.post_id, "comment accepted");
                            self.limiter.record(submitted_at);
                            self.load();
                        }
                        Err(e) => {
                            warn!(post_id = %self.post_id, error = %e, "posting comment failed");
                            self.alert = Some("Failed to post comment, please retry".to_string());
                        }
                    }
                }
            }
            changed = true;
        }
        changed
    }
}
