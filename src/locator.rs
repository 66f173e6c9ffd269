//! Template location by normalized cross-correlation.
//!
//! The matcher is fixed: zero-mean NCC over all RGB samples, best
//! alignment wins. A miss is a normal negative result, never an error.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::capture::{CaptureEngine, Frame};
use crate::error::Result;

/// Outcome of one locate call. `center` is the template's bounding-box
/// center in frame coordinates, valid when `found`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub found: bool,
    pub center: (u32, u32),
    pub score: f64,
}

impl MatchResult {
    fn miss() -> Self {
        Self {
            found: false,
            center: (0, 0),
            score: 0.0,
        }
    }
}

/// A reference image loaded from disk.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub pixels: RgbImage,
}

impl Template {
    /// Load a reference image. A missing or undecodable file is a
    /// caller-visible error, never a silent skip.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pixels = image::open(path)?.to_rgb8();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, pixels })
    }

    pub fn from_image(name: impl Into<String>, pixels: RgbImage) -> Self {
        Self {
            name: name.into(),
            pixels,
        }
    }
}

pub struct Locator {
    pub default_threshold: f64,
}

impl Locator {
    pub fn new(default_threshold: f64) -> Self {
        Self { default_threshold }
    }

    /// Correlate `template` against `frame` and report the best alignment.
    pub fn locate(&self, frame: &Frame, template: &Template, threshold: f64) -> MatchResult {
        let result = best_match(&frame.pixels, &template.pixels, threshold);
        if result.found {
            tracing::debug!(
                template = %template.name,
                x = result.center.0,
                y = result.center.1,
                score = result.score,
                "template located"
            );
        }
        result
    }

    /// Poll (capture, locate) until the template appears or the deadline
    /// elapses. `Ok(false)` on timeout; capture failures propagate.
    pub fn wait_for(
        &self,
        capture: &mut CaptureEngine,
        template: &Template,
        threshold: f64,
        timeout: Duration,
        poll: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = capture.capture()?;
            let result = self.locate(&frame, template, threshold);
            if result.found {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::debug!(template = %template.name, "timed out waiting for template");
                return Ok(false);
            }
            thread::sleep(poll);
        }
    }
}

/// Zero-mean normalized cross-correlation, evaluated at every alignment.
/// Flat (zero-variance) windows score 0. A template that does not fit
/// inside the frame is never found.
fn best_match(frame: &RgbImage, template: &RgbImage, threshold: f64) -> MatchResult {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > fw || th > fh {
        return MatchResult::miss();
    }

    let f = frame.as_raw();
    let t = template.as_raw();
    let n = (tw * th * 3) as f64;

    let t_mean = t.iter().map(|&v| v as f64).sum::<f64>() / n;
    let t_centered: Vec<f64> = t.iter().map(|&v| v as f64 - t_mean).collect();
    let t_var: f64 = t_centered.iter().map(|v| v * v).sum();

    let f_stride = (fw * 3) as usize;
    let t_stride = (tw * 3) as usize;

    let mut best_score = f64::NEG_INFINITY;
    let mut best_pos = (0u32, 0u32);

    for oy in 0..=(fh - th) {
        for ox in 0..=(fw - tw) {
            let mut sum_f = 0.0;
            let mut sum_ff = 0.0;
            let mut sum_ft = 0.0;
            for ty in 0..th {
                let f_row = ((oy + ty) as usize) * f_stride + (ox * 3) as usize;
                let t_row = (ty as usize) * t_stride;
                for i in 0..t_stride {
                    let fv = f[f_row + i] as f64;
                    sum_f += fv;
                    sum_ff += fv * fv;
                    sum_ft += fv * t_centered[t_row + i];
                }
            }
            // sum_ft already equals the centered cross term because the
            // centered template sums to zero.
            let f_var = sum_ff - sum_f * sum_f / n;
            let denom = (f_var * t_var).sqrt();
            let score = if denom > f64::EPSILON {
                sum_ft / denom
            } else {
                0.0
            };
            if score > best_score {
                best_score = score;
                best_pos = (ox, oy);
            }
        }
    }

    MatchResult {
        found: best_score >= threshold,
        center: (best_pos.0 + tw / 2, best_pos.1 + th / 2),
        score: best_score,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::capture::Frame;
    use crate::error::DriverError;

    fn noise(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(width, height, |_, _| {
            Rgb([rng.gen(), rng.gen(), rng.gen()])
        })
    }

    fn frame_of(pixels: RgbImage) -> Frame {
        Frame {
            pixels,
            captured_at: Utc::now(),
        }
    }

    fn crop(src: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> RgbImage {
        image::imageops::crop_imm(src, x, y, w, h).to_image()
    }

    #[test]
    fn test_locate_finds_crop_at_known_offset() {
        let screen = noise(40, 30, 7);
        let template = Template::from_image("button", crop(&screen, 12, 8, 10, 10));
        let locator = Locator::new(0.8);

        let result = locator.locate(&frame_of(screen), &template, 0.9);
        assert!(result.found, "crop must match its source, got {result:?}");
        assert!(result.score > 0.99);
        assert!((result.center.0 as i64 - 17).abs() <= 1);
        assert!((result.center.1 as i64 - 13).abs() <= 1);
    }

    #[test]
    fn test_threshold_above_one_never_matches() {
        let screen = noise(40, 30, 7);
        let template = Template::from_image("button", crop(&screen, 12, 8, 10, 10));
        let locator = Locator::new(0.8);

        let result = locator.locate(&frame_of(screen), &template, 1.01);
        assert!(!result.found, "no real score reaches 1.01");
    }

    #[test]
    fn test_threshold_zero_always_matches_nonempty_frame() {
        let screen = noise(40, 30, 11);
        let template = Template::from_image("button", crop(&screen, 0, 0, 8, 8));
        let locator = Locator::new(0.8);

        let result = locator.locate(&frame_of(screen), &template, 0.0);
        assert!(result.found);
    }

    #[test]
    fn test_flat_template_scores_zero() {
        let screen = noise(40, 30, 13);
        let template = Template::from_image("flat", RgbImage::from_pixel(8, 8, Rgb([90, 90, 90])));
        let locator = Locator::new(0.8);

        let result = locator.locate(&frame_of(screen), &template, 0.5);
        assert!(!result.found);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_oversized_template_is_never_found() {
        let screen = noise(20, 20, 17);
        let template = Template::from_image("big", noise(30, 30, 17));
        let locator = Locator::new(0.8);

        let result = locator.locate(&frame_of(screen), &template, 0.0);
        assert!(!result.found);
    }

    #[test]
    fn test_absent_template_does_not_match_at_high_threshold() {
        let screen = noise(40, 30, 19);
        let template = Template::from_image("elsewhere", noise(10, 10, 23));
        let locator = Locator::new(0.8);

        let result = locator.locate(&frame_of(screen), &template, 0.9);
        assert!(!result.found, "unrelated noise must not correlate at 0.9");
    }

    #[test]
    fn test_template_load_missing_file_is_an_error() {
        let err = Template::load("/nonexistent/ref.png").expect_err("must fail");
        assert!(matches!(err, DriverError::Decode(_)));
    }
}
