//! Zoom state for PDF rendering
//!
//! The effective render scale is the fit-to-width base scale multiplied by
//! the user's zoom factor. Only the zoom factor is clamped.

/// Zoom factor bounds and step size
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: Zoom::MIN_FACTOR,
            max: Zoom::MAX_FACTOR,
            step: Zoom::STEP,
        }
    }
}

/// Zoom state for PDF viewing
#[derive(Clone, Debug, PartialEq)]
pub struct Zoom {
    /// Current zoom factor (1.0 = 100%)
    pub factor: f32,

    /// Fit-to-width multiplier applied under the zoom factor
    pub base_scale: f32,

    pub limits: ZoomLimits,
}

impl Default for Zoom {
    fn default() -> Self {
        Self::new(ZoomLimits::default())
    }
}

impl Zoom {
    /// Minimum allowed zoom factor
    pub const MIN_FACTOR: f32 = 0.5;
    /// Maximum allowed zoom factor
    pub const MAX_FACTOR: f32 = 3.0;
    /// Zoom change per step
    pub const STEP: f32 = 0.25;

    #[must_use]
    pub fn new(limits: ZoomLimits) -> Self {
        Self {
            factor: 1.0_f32.clamp(limits.min, limits.max),
            base_scale: 1.0,
            limits,
        }
    }

    /// Returns the current zoom factor
    #[must_use]
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Scale pages are rasterized at
    #[must_use]
    pub fn effective_scale(&self) -> f32 {
        self.base_scale * self.factor
    }

    /// Zoom in by one step
    pub fn step_in(&mut self) {
        self.set_factor(self.factor + self.limits.step);
    }

    /// Zoom out by one step
    pub fn step_out(&mut self) {
        self.set_factor(self.factor - self.limits.step);
    }

    pub fn set_factor(&mut self, factor: f32) {
        self.factor = self.clamp_factor(factor);
    }

    /// Back to 100% of the current base scale
    pub fn reset(&mut self) {
        self.set_factor(1.0);
    }

    /// Fit `native_width` into `container_width`.
    ///
    /// Ignored when either width is not a positive finite number.
    pub fn fit_to_width(&mut self, container_width: f32, native_width: f32) {
        let base = container_width / native_width;
        if base.is_finite() && base > 0.0 {
            self.base_scale = base;
        }
    }

    /// Clamp factor to valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp_factor(&self, factor: f32) -> f32 {
        if !factor.is_finite() {
            1.0_f32.clamp(self.limits.min, self.limits.max)
        } else {
            factor.clamp(self.limits.min, self.limits.max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_clamped() {
        let mut zoom = Zoom::default();
        for _ in 0..20 {
            zoom.step_in();
        }
        assert!((zoom.factor() - 3.0).abs() < f32::EPSILON);

        for _ in 0..20 {
            zoom.step_out();
        }
        assert!((zoom.factor() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn non_finite_factor_falls_back_to_one() {
        let mut zoom = Zoom::default();
        zoom.set_factor(f32::NAN);
        assert!((zoom.factor() - 1.0).abs() < f32::EPSILON);
        zoom.set_factor(f32::INFINITY);
        assert!((zoom.factor() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn fit_to_width_sets_base_under_factor() {
        let mut zoom = Zoom::default();
        zoom.step_in();
        zoom.fit_to_width(900.0, 600.0);

        assert!((zoom.base_scale - 1.5).abs() < 1e-6);
        assert!((zoom.effective_scale() - 1.5 * 1.25).abs() < 1e-6);

        zoom.reset();
        assert!((zoom.effective_scale() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_fit_is_ignored() {
        let mut zoom = Zoom::default();
        zoom.fit_to_width(800.0, 0.0);
        zoom.fit_to_width(0.0, 600.0);
        assert!((zoom.base_scale - 1.0).abs() < f32::EPSILON);
    }
}
