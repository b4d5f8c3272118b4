//! Reference-image template matching via normalized cross-correlation.
//!
//! Templates are small reference crops of UI controls. Matching slides the
//! template over the captured frame (or a restricted region) and scores
//! each placement with NCC, which is robust to uniform brightness changes
//! such as hover highlights and dimmed/disabled states.

use image::imageops;
use image::GrayImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::Region;
use crate::capture::Frame;
use crate::error::{AutomationError, Result};

/// A named reference image. Confidence thresholds belong to the detection
/// tiers, not the template. Immutable once loaded; invalidated only by an
/// explicit store reload.
pub struct Template {
    pub name: String,
    gray: GrayImage,
}

impl Template {
    pub fn from_gray(name: &str, gray: GrayImage) -> Self {
        Self {
            name: name.to_string(),
            gray,
        }
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// In-memory cache of templates keyed by name, loaded from a directory of
/// PNG files. The file stem is the template name.
pub struct TemplateStore {
    dir: PathBuf,
    templates: HashMap<String, Template>,
}

impl TemplateStore {
    /// Loads every readable PNG in `dir`. A missing directory yields an
    /// empty store; the OCR tiers still function without templates.
    pub fn load(dir: &Path) -> Self {
        let mut store = Self {
            dir: dir.to_path_buf(),
            templates: HashMap::new(),
        };
        store.scan();
        store
    }

    /// An empty store, for callers that locate purely by text.
    pub fn empty() -> Self {
        Self {
            dir: PathBuf::new(),
            templates: HashMap::new(),
        }
    }

    fn scan(&mut self) {
        self.templates.clear();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                crate::log(&format!(
                    "Template dir {} not readable: {}",
                    self.dir.display(),
                    e
                ));
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match image::open(&path) {
                Ok(img) => {
                    self.templates.insert(
                        name.to_string(),
                        Template {
                            name: name.to_string(),
                            gray: img.to_luma8(),
                        },
                    );
                }
                Err(e) => {
                    crate::log(&format!("Failed to load template {}: {}", path.display(), e));
                }
            }
        }
        crate::log(&format!(
            "Template store: {} templates from {}",
            self.templates.len(),
            self.dir.display()
        ));
    }

    /// Re-reads the template directory, picking up added or changed files.
    pub fn reload(&mut self) {
        self.scan();
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Normalized cross-correlation matcher.
pub struct TemplateMatcher;

impl TemplateMatcher {
    /// Finds the best placement of `template` in `frame`, optionally
    /// restricted to `region`. Returns the best score (0.0-1.0) and the
    /// matched rectangle, or an error only if the template cannot fit.
    pub fn best_match(
        &self,
        frame: &Frame,
        template: &Template,
        region: Option<Region>,
    ) -> Result<(f32, Region)> {
        let frame_gray = rgba_to_gray(frame);
        let (fw, fh) = frame_gray.dimensions();
        let (tw, th) = (template.width(), template.height());

        let (rx, ry, rw, rh) = match region {
            Some(r) => {
                let rx = r.x.min(fw);
                let ry = r.y.min(fh);
                (rx, ry, r.width.min(fw - rx), r.height.min(fh - ry))
            }
            None => (0, 0, fw, fh),
        };

        if tw == 0 || th == 0 || tw > rw || th > rh {
            return Err(AutomationError::Capture(format!(
                "template {} ({}x{}) does not fit search area {}x{}",
                template.name, tw, th, rw, rh
            )));
        }

        // Precompute the mean-subtracted template and its denominator term.
        let t_pixels: Vec<f64> = template.gray.pixels().map(|p| p[0] as f64).collect();
        let t_mean = t_pixels.iter().sum::<f64>() / t_pixels.len() as f64;
        let t_delta: Vec<f64> = t_pixels.iter().map(|v| v - t_mean).collect();
        let t_denom: f64 = t_delta.iter().map(|v| v * v).sum();

        let mut best_score = -1.0f64;
        let mut best_pos = (rx, ry);

        for oy in ry..=(ry + rh - th) {
            for ox in rx..=(rx + rw - tw) {
                let mut patch_sum = 0.0f64;
                for y in 0..th {
                    for x in 0..tw {
                        patch_sum += frame_gray.get_pixel(ox + x, oy + y)[0] as f64;
                    }
                }
                let patch_mean = patch_sum / (tw * th) as f64;

                let mut numerator = 0.0f64;
                let mut patch_denom = 0.0f64;
                let mut idx = 0;
                for y in 0..th {
                    for x in 0..tw {
                        let fv = frame_gray.get_pixel(ox + x, oy + y)[0] as f64 - patch_mean;
                        numerator += fv * t_delta[idx];
                        patch_denom += fv * fv;
                        idx += 1;
                    }
                }

                let denom = (t_denom * patch_denom).sqrt();
                if denom <= f64::EPSILON {
                    // Flat patch or flat template: correlation undefined.
                    continue;
                }
                let score = numerator / denom;
                if score > best_score {
                    best_score = score;
                    best_pos = (ox, oy);
                }
            }
        }

        let score = best_score.max(0.0) as f32;
        Ok((
            score,
            Region {
                x: best_pos.0,
                y: best_pos.1,
                width: tw,
                height: th,
            },
        ))
    }

}

fn rgba_to_gray(frame: &Frame) -> GrayImage {
    imageops::grayscale(frame)
}
