//! Double-buffered page presentation for single-page mode
//!
//! Frames are drawn into a hidden secondary canvas and faded in. When the
//! fade completes the secondary canvas is committed onto the primary one in
//! a single step and hidden again, so the primary canvas only ever holds a
//! complete frame of one page.

use std::time::{Duration, Instant};

use log::debug;

use super::cache::CacheKey;
use super::canvas::Canvas;
use super::types::{SharedEntry, scale_key};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PresenterState {
    Idle,
    /// Waiting for a frame of `page` at `scale`
    Rendering { page: usize, scale: f32 },
    /// Secondary canvas holds the frame and is fading in
    Transitioning {
        page: usize,
        scale: f32,
        started: Instant,
    },
}

pub struct TransitionPresenter {
    state: PresenterState,
    primary: Canvas,
    secondary: Canvas,
    fade: Duration,
}

impl TransitionPresenter {
    #[must_use]
    pub fn new(fade: Duration) -> Self {
        let mut secondary = Canvas::new();
        secondary.set_opacity(0.0);
        Self {
            state: PresenterState::Idle,
            primary: Canvas::new(),
            secondary,
            fade,
        }
    }

    /// Start presenting `page` at `scale`.
    ///
    /// Returns false when nothing needs rendering: the page is already on
    /// the primary canvas and idle, or it is the page already on its way.
    pub fn show_page(&mut self, page: usize, scale: f32) -> bool {
        match self.state {
            PresenterState::Idle if self.primary.shows(page, scale) => return false,
            PresenterState::Rendering { page: p, scale: s }
            | PresenterState::Transitioning { page: p, scale: s, .. }
                if p == page && scale_key(s) == scale_key(scale) =>
            {
                return false;
            }
            _ => {}
        }

        self.hide_secondary();
        self.state = PresenterState::Rendering { page, scale };
        true
    }

    /// Accept a rendered frame. Frames for anything but the awaited page and
    /// scale are rejected.
    pub fn frame_ready(&mut self, entry: SharedEntry, now: Instant) -> bool {
        let PresenterState::Rendering { page, scale } = self.state else {
            return false;
        };
        if !entry.matches(page, scale) {
            debug!(
                "Presenter ignoring page {} @ {} while waiting for {page} @ {scale}",
                entry.page, entry.scale
            );
            return false;
        }

        self.secondary.draw(entry);
        self.secondary.set_opacity(0.0);
        self.state = PresenterState::Transitioning {
            page,
            scale,
            started: now,
        };
        true
    }

    /// Advance the fade. Returns the page number when a frame is committed.
    pub fn tick(&mut self, now: Instant) -> Option<usize> {
        let PresenterState::Transitioning { page, started, .. } = self.state else {
            return None;
        };

        let elapsed = now.saturating_duration_since(started);
        if elapsed < self.fade {
            self.secondary
                .set_opacity(elapsed.as_secs_f32() / self.fade.as_secs_f32());
            return None;
        }

        self.primary.copy_from(&self.secondary);
        self.hide_secondary();
        self.state = PresenterState::Idle;
        Some(page)
    }

    /// Give up on `page`. Returns true if it was the awaited page.
    pub fn render_failed(&mut self, page: usize) -> bool {
        match self.state {
            PresenterState::Rendering { page: p, .. } if p == page => {
                self.state = PresenterState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drop everything, including the presented frame
    pub fn reset(&mut self) {
        self.hide_secondary();
        self.primary.clear();
        self.state = PresenterState::Idle;
    }

    /// When the running fade finishes
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PresenterState::Transitioning { started, .. } => Some(started + self.fade),
            _ => None,
        }
    }

    /// Buffer keys of frames on screen
    #[must_use]
    pub fn displayed_keys(&self) -> Vec<CacheKey> {
        self.primary
            .key()
            .into_iter()
            .chain(self.secondary.key())
            .collect()
    }

    #[must_use]
    pub fn state(&self) -> PresenterState {
        self.state
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == PresenterState::Idle
    }

    /// The visible canvas
    #[must_use]
    pub fn primary(&self) -> &Canvas {
        &self.primary
    }

    #[must_use]
    pub fn secondary(&self) -> &Canvas {
        &self.secondary
    }

    fn hide_secondary(&mut self) {
        self.secondary.set_opacity(0.0);
        self.secondary.clear();
    }
}
