//! Background thread worker for text normalization.
//!
//! Markdown stripping and stemming run off the caller's thread. Requests are
//! handled strictly in arrival order by a single thread, so two updates for
//! the same card never interleave. Results are applied to the index by the
//! owner of the [`SearchIndex`], which stays single-writer.

use std::collections::HashMap;
use std::panic;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::index::SearchIndex;
use super::normalize::{Normalizer, TermVector, WeightScheme};
use crate::error::{CardError, CardResult};
use crate::store::CardId;

#[derive(Debug)]
pub struct IndexRequest {
    pub id: CardId,
    pub contents: String,
    pub version: u64,
}

#[derive(Debug)]
pub struct IndexResult {
    pub id: CardId,
    pub version: u64,
    pub features: CardResult<TermVector>,
}

/// Handle to the background normalization worker
pub struct IndexWorker {
    request_sender: Sender<IndexRequest>,
    result_receiver: Receiver<IndexResult>,
    /// Latest version requested per card; older results are stale
    versions: HashMap<CardId, u64>,
    next_version: u64,
    #[allow(dead_code)]
    thread_handle: JoinHandle<()>,
}

impl IndexWorker {
    pub fn new(scheme: WeightScheme, max_bytes: usize) -> CardResult<Self> {
        let (request_tx, request_rx) = mpsc::channel::<IndexRequest>();
        let (result_tx, result_rx) = mpsc::channel::<IndexResult>();

        let thread_handle = thread::Builder::new()
            .name("index-worker".into())
            .spawn(move || {
                let normalizer = Normalizer::new(scheme, max_bytes);
                worker_thread_loop(&normalizer, request_rx, result_tx);
            })?;

        Ok(Self {
            request_sender: request_tx,
            result_receiver: result_rx,
            versions: HashMap::new(),
            next_version: 0,
            thread_handle,
        })
    }

    /// Queue `contents` for normalization and return the request version.
    pub fn request(&mut self, id: &str, contents: String) -> u64 {
        self.next_version += 1;
        let version = self.next_version;
        self.versions.insert(id.to_string(), version);

        let request = IndexRequest {
            id: id.to_string(),
            contents,
            version,
        };
        if self.request_sender.send(request).is_err() {
            warn!(id, "index worker is gone, request dropped");
        }
        version
    }

    /// Requests whose results have not been applied yet
    pub fn pending(&self) -> usize {
        self.versions.len()
    }

    /// Next result that is still current. Stale results are discarded.
    pub fn try_recv(&mut self) -> Option<IndexResult> {
        loop {
            let result = match self.result_receiver.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            };
            if self.versions.get(&result.id) == Some(&result.version) {
                self.versions.remove(&result.id);
                return Some(result);
            }
            debug!(id = %result.id, version = result.version, "dropping stale index result");
        }
    }

    /// Block until the next current result arrives.
    pub fn recv(&mut self) -> Option<IndexResult> {
        while !self.versions.is_empty() {
            let result = self.result_receiver.recv().ok()?;
            if self.versions.get(&result.id) == Some(&result.version) {
                self.versions.remove(&result.id);
                return Some(result);
            }
        }
        None
    }

    /// Apply every finished result to `index`. A failed normalization leaves
    /// the card's previous postings untouched. Returns how many were applied.
    pub fn apply_ready(&mut self, index: &mut SearchIndex) -> usize {
        let mut applied = 0;
        while let Some(result) = self.try_recv() {
            if apply_result(index, result) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for every queued request and apply it.
    pub fn finish(&mut self, index: &mut SearchIndex) -> usize {
        let mut applied = 0;
        while let Some(result) = self.recv() {
            if apply_result(index, result) {
                applied += 1;
            }
        }
        applied
    }
}

fn apply_result(index: &mut SearchIndex, result: IndexResult) -> bool {
    match result.features {
        Ok(vector) => {
            index.add_to_index(&result.id, &vector);
            true
        }
        Err(e) => {
            warn!(id = %result.id, error = %e, "index update abandoned");
            false
        }
    }
}

fn worker_thread_loop(
    normalizer: &Normalizer,
    receiver: Receiver<IndexRequest>,
    sender: Sender<IndexResult>,
) {
    while let Ok(request) = receiver.recv() {
        let features = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            normalizer.features(&request.contents)
        }))
        .unwrap_or_else(|_| {
            Err(CardError::FormatStrip(
                "normalizer panicked on this document".to_string(),
            ))
        });

        let result = IndexResult {
            id: request.id,
            version: request.version,
            features,
        };
        if sender.send(result).is_err() {
            break;
        }
    }
}
