pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the viewer surface
pub use pdf::{DocumentSource, PdfViewer, ViewerError, ViewerEvent, ViewerPhase};
pub use settings::{ViewerMode, ViewerSettings};
