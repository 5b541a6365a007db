//! PDF rendering infrastructure
//!
//! Documents are opened and rasterized on a render worker thread; the
//! `PdfViewer` schedules page renders, buffers the results and presents
//! them either as a continuous scroll or one page at a time.

mod cache;
mod cancel;
mod canvas;
mod engine;
mod error;
mod fetch;
#[cfg(feature = "pdf")]
mod mupdf_engine;
mod presenter;
mod request;
mod scheduler;
mod session;
mod state;
mod types;
mod viewer;
mod visibility;
mod worker;
mod zoom;

pub use cache::{CacheKey, PageBuffer};
pub use cancel::CancelToken;
pub use canvas::Canvas;
pub use engine::{EngineError, PdfDocument, PdfEngine, SourceData};
pub use error::ViewerError;
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{DocumentSource, Fetch};
#[cfg(feature = "pdf")]
pub use mupdf_engine::MupdfEngine;
pub use presenter::{PresenterState, TransitionPresenter};
pub use request::{RenderRequest, RenderResponse, RequestId, Slot};
pub use scheduler::{Completion, Dispatch, RenderScheduler, SchedulerStats};
pub use session::{DocumentSession, PageHandle};
pub use state::{Command, Effect, RenderState};
pub use types::*;
pub use viewer::{PageState, PdfViewer, ViewerEvent, ViewerPhase};
pub use visibility::{PageLayout, ScrollThrottle, VisibilityEvent, VisibilityTracker};
pub use worker::RenderWorker;
pub use zoom::*;
