//! PDF render worker - runs in a dedicated thread
//!
//! The worker owns the document session, so native handles never leave the
//! thread. Requests are served strictly in order, one rasterization at a time.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};

use super::cancel::CancelToken;
use super::engine::PdfEngine;
use super::error::ViewerError;
use super::fetch::Fetch;
use super::request::{RenderRequest, RenderResponse, RequestId};
use super::session::DocumentSession;

/// Handle to a running render worker thread
pub struct RenderWorker {
    requests: Sender<RenderRequest>,
    responses: Receiver<RenderResponse>,
    thread: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Spawn the worker thread
    pub fn spawn(
        engine: Arc<dyn PdfEngine>,
        fetcher: Option<Arc<dyn Fetch>>,
    ) -> Result<Self, ViewerError> {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let thread = std::thread::Builder::new()
            .name("pageturn-render".into())
            .spawn(move || render_worker(engine, fetcher, request_rx, response_tx))
            .map_err(|e| ViewerError::Worker {
                reason: e.to_string(),
            })?;

        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            thread: Some(thread),
        })
    }

    /// Sender for queueing requests
    #[must_use]
    pub fn sender(&self) -> Sender<RenderRequest> {
        self.requests.clone()
    }

    pub fn send(&self, request: RenderRequest) {
        if self.requests.send(request).is_err() {
            error!("Render worker is gone; request dropped");
        }
    }

    /// Next response if one is ready
    #[must_use]
    pub fn try_recv(&self) -> Option<RenderResponse> {
        self.responses.try_recv().ok()
    }

    /// Block up to `timeout` for the next response
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RenderResponse> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Render worker disconnected");
                None
            }
        }
    }

    /// Stop the worker and wait for it to release the document
    pub fn shutdown(&mut self) {
        let _ = self.requests.send(RenderRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Render worker panicked");
            }
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(
    engine: Arc<dyn PdfEngine>,
    fetcher: Option<Arc<dyn Fetch>>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
) {
    let mut session: Option<DocumentSession> = None;
    let mut generation = 0u64;

    for request in requests {
        match request {
            RenderRequest::Open {
                generation: next,
                source,
            } => {
                // Old handle goes before the new one is created
                if let Some(mut old) = session.take() {
                    old.destroy();
                }
                generation = next;

                let opened = DocumentSession::open(engine.clone(), fetcher.as_deref(), source)
                    .and_then(|mut s| {
                        let info = s.info()?;
                        Ok((s, info))
                    });
                match opened {
                    Ok((s, info)) => {
                        session = Some(s);
                        let _ = responses.send(RenderResponse::DocumentInfo { generation, info });
                    }
                    Err(error) => {
                        warn!("Load failed: {error}");
                        let _ = responses.send(RenderResponse::LoadFailed { generation, error });
                    }
                }
            }

            RenderRequest::Close { generation: closing } => {
                if closing == generation {
                    if let Some(mut old) = session.take() {
                        old.destroy();
                    }
                }
            }

            RenderRequest::Page {
                id,
                generation: requested,
                page,
                scale,
                cancel,
            } => {
                let live = session.as_mut().filter(|_| requested == generation);
                let response = handle_page_request(live, id, page, scale, &cancel);
                let _ = responses.send(response);
            }

            RenderRequest::Shutdown => break,
        }
    }

    if let Some(mut s) = session.take() {
        s.destroy();
    }
    debug!("Render worker stopped");
}

fn handle_page_request(
    session: Option<&mut DocumentSession>,
    id: RequestId,
    page: usize,
    scale: f32,
    cancel: &CancelToken,
) -> RenderResponse {
    if cancel.is_cancelled() {
        return RenderResponse::Cancelled(id);
    }

    let Some(session) = session else {
        // Request outlived its document
        return RenderResponse::Cancelled(id);
    };

    match session.render(page, scale, cancel) {
        // Finished after being superseded: drop it here rather than ship pixels
        Ok(_) if cancel.is_cancelled() => RenderResponse::Cancelled(id),
        Ok(entry) => {
            debug!(
                "Rendered page {page} @ {scale}: {} bytes",
                entry.raster.byte_len()
            );
            RenderResponse::Page { id, entry }
        }
        Err(error) if error.is_cancelled() && cancel.is_cancelled() => {
            RenderResponse::Cancelled(id)
        }
        Err(error) if error.is_cancelled() => {
            debug!("Engine dropped page {page} without being cancelled");
            RenderResponse::Error {
                id,
                error: ViewerError::render(page, "cancelled by engine"),
            }
        }
        Err(error) => {
            debug!("Render of page {page} failed: {error}");
            RenderResponse::Error { id, error }
        }
    }
}
