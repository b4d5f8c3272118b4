//! Tiered element location and login-state classification.
//!
//! Detection tiers, in fixed order of decreasing precision:
//!   1. exact OCR text match
//!   2. template match at the strict confidence threshold
//!   3. template match at the relaxed confidence threshold
//!   4. fuzzy OCR text match
//!   5. fixed fallback coordinate
//! Each tier runs only if the previous one missed; the first hit
//! short-circuits the chain.

use super::template::{TemplateMatcher, TemplateStore};
use super::text::{OcrEngine, TextLocator};
use super::{MatchMethod, MatchResult, Point, Region};
use crate::capture::Frame;
use crate::config::{AutomationConfig, ElementSpec, RelativeRect};

/// Login status of the target application, derived fresh on every check.
/// `Unclear` is a legitimate terminal classification, not an error;
/// callers must handle it explicitly rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    LoggedIn,
    LoggedOut,
    Unclear,
}

impl std::fmt::Display for ScreenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScreenState::LoggedIn => write!(f, "logged in"),
            ScreenState::LoggedOut => write!(f, "logged out"),
            ScreenState::Unclear => write!(f, "unclear"),
        }
    }
}

pub struct UIStateDetector<'a> {
    templates: &'a TemplateStore,
    matcher: TemplateMatcher,
    text: TextLocator<'a>,
    high_threshold: f32,
    low_threshold: f32,
}

impl<'a> UIStateDetector<'a> {
    pub fn new(
        templates: &'a TemplateStore,
        ocr: &'a dyn OcrEngine,
        config: &AutomationConfig,
    ) -> Self {
        Self {
            templates,
            matcher: TemplateMatcher,
            text: TextLocator::new(ocr, config.fuzzy_min_similarity),
            high_threshold: config.template_high_threshold,
            low_threshold: config.template_low_threshold,
        }
    }

    /// Locates a UI element through the tier chain. Tiers the element spec carries
    /// no data for are skipped. A miss on every tier returns not-found with
    /// the best confidence any tier achieved.
    pub fn locate(&self, spec: &ElementSpec, frame: &Frame) -> MatchResult {
        let mut best_confidence = 0.0f32;

        // Tier 1: exact OCR.
        if let Some(query) = &spec.ocr_text {
            let result = self.text.find_text(frame, query, false);
            if result.found {
                return result;
            }
        }

        // Tiers 2 and 3: one correlation pass, two thresholds.
        if let Some(template_name) = &spec.template {
            if let Some(template) = self.templates.get(template_name) {
                let region = spec
                    .search_region
                    .map(|r| to_pixel_region(&r, frame.width(), frame.height()));
                if let Ok((confidence, matched)) =
                    self.matcher.best_match(frame, template, region)
                {
                    if confidence >= self.high_threshold {
                        return MatchResult::found_at(
                            matched.center(),
                            confidence,
                            MatchMethod::TemplateHigh,
                        );
                    }
                    if confidence >= self.low_threshold {
                        return MatchResult::found_at(
                            matched.center(),
                            confidence,
                            MatchMethod::TemplateLow,
                        );
                    }
                    best_confidence = best_confidence.max(confidence);
                }
            }
        }

        // Tier 4: fuzzy OCR.
        if let Some(query) = &spec.ocr_text {
            let result = self.text.find_text(frame, query, true);
            if result.found {
                return result;
            }
            best_confidence = best_confidence.max(result.confidence);
        }

        // Tier 5: fixed fallback coordinate. Confidence stays zero; the
        // caller knows this is a blind click position.
        if let Some(fallback) = &spec.fallback {
            let point = Point {
                x: (fallback.x * frame.width() as f32) as i32,
                y: (fallback.y * frame.height() as f32) as i32,
            };
            return MatchResult::found_at(point, 0.0, MatchMethod::FallbackCoord);
        }

        MatchResult::not_found_with_confidence(best_confidence)
    }

    /// Classifies login state from a frame: a logged-in marker wins, then a
    /// login form, otherwise `Unclear`. Fallback coordinates are ignored
    /// here; a blind position cannot confirm a state.
    pub fn classify_login_state(
        &self,
        frame: &Frame,
        logged_in_marker: &ElementSpec,
        login_form: &ElementSpec,
    ) -> ScreenState {
        if self.locate(&without_fallback(logged_in_marker), frame).found {
            return ScreenState::LoggedIn;
        }
        if self.locate(&without_fallback(login_form), frame).found {
            return ScreenState::LoggedOut;
        }
        ScreenState::Unclear
    }

    /// Lists the text currently visible on the frame, for diagnostics when
    /// a lookup fails (e.g. "none of these matched the target page").
    pub fn visible_text(&self, frame: &Frame) -> Vec<String> {
        match self.text.words(frame) {
            Ok(words) => words.into_iter().map(|w| w.text).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn without_fallback(spec: &ElementSpec) -> ElementSpec {
    let mut spec = spec.clone();
    spec.fallback = None;
    spec
}

fn to_pixel_region(rect: &RelativeRect, width: u32, height: u32) -> Region {
    Region {
        x: (rect.x * width as f32) as u32,
        y: (rect.y * height as f32) as u32,
        width: (rect.width * width as f32) as u32,
        height: (rect.height * height as f32) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelativePoint;
    use crate::detect::template::Template;
    use crate::detect::text::OcrWord;
    use crate::error::AutomationError;
    use image::{GrayImage, Luma, Rgba};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeOcr {
        words: Vec<OcrWord>,
        fail: bool,
        calls: AtomicU32,
    }

    impl FakeOcr {
        fn with_words(words: Vec<OcrWord>) -> Self {
            Self {
                words,
                fail: false,
                calls: AtomicU32::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                words: Vec::new(),
                fail: true,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl OcrEngine for FakeOcr {
        fn recognize(&self, _frame: &Frame) -> crate::error::Result<Vec<OcrWord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AutomationError::Ocr("unavailable".into()));
            }
            Ok(self.words.clone())
        }
    }

    fn word(text: &str, x: u32, y: u32) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            line: y,
            bbox: Region {
                x,
                y,
                width: 40,
                height: 10,
            },
            confidence: 90.0,
        }
    }

    fn config() -> AutomationConfig {
        AutomationConfig::default()
    }

    /// A 4x1 frame whose pixel ramp either matches the ramp template
    /// exactly (confidence 1.0) or approximately (confidence ~0.90).
    fn ramp_frame(values: [u8; 4]) -> Frame {
        let mut frame = Frame::new(4, 1);
        for (i, v) in values.iter().enumerate() {
            frame.put_pixel(i as u32, 0, Rgba([*v, *v, *v, 255]));
        }
        frame
    }

    fn ramp_store() -> TemplateStore {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([(x * 80) as u8]));
        let mut store = TemplateStore::empty();
        store.insert(Template::from_gray("marker", gray));
        store
    }

    fn all_tier_spec() -> ElementSpec {
        ElementSpec {
            name: "marker".into(),
            template: Some("marker".into()),
            ocr_text: Some("Upload".into()),
            search_region: None,
            fallback: Some(RelativePoint { x: 0.5, y: 0.5 }),
        }
    }

    #[test]
    fn test_exact_ocr_short_circuits_lower_tiers() {
        let ocr = FakeOcr::with_words(vec![word("Upload", 10, 10)]);
        let store = ramp_store();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        let result = detector.locate(&all_tier_spec(), &ramp_frame([0, 80, 160, 240]));
        assert!(result.found);
        assert_eq!(result.method, Some(MatchMethod::ExactOcr));
        // One recognize call: the fuzzy tier never ran.
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_template_high_tier() {
        let ocr = FakeOcr::with_words(vec![word("unrelated", 10, 10)]);
        let store = ramp_store();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        let result = detector.locate(&all_tier_spec(), &ramp_frame([0, 80, 160, 240]));
        assert!(result.found);
        assert_eq!(result.method, Some(MatchMethod::TemplateHigh));
        assert!(result.confidence >= 0.97);
    }

    #[test]
    fn test_template_relaxed_tier() {
        let ocr = FakeOcr::with_words(vec![word("unrelated", 10, 10)]);
        let store = ramp_store();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        // Distorted ramp: correlation ~0.90, between the two thresholds.
        let result = detector.locate(&all_tier_spec(), &ramp_frame([0, 80, 160, 140]));
        assert!(result.found);
        assert_eq!(result.method, Some(MatchMethod::TemplateLow));
        assert!(result.confidence >= 0.85 && result.confidence < 0.97);
    }

    #[test]
    fn test_fuzzy_tier_after_template_miss() {
        let ocr = FakeOcr::with_words(vec![word("Uploads", 10, 10)]);
        let store = TemplateStore::empty();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        // Queries must not be substrings of "Uploads", or the exact tier
        // would hit before fuzzy gets a chance.
        let mut spec = ElementSpec::text_only("x", "Unloads");
        spec.fallback = None;
        // "unloads" vs "uploads": 1 edit in 7 = 0.857 -> miss.
        let miss = detector.locate(&spec, &ramp_frame([0, 0, 0, 0]));
        assert!(!miss.found);

        let spec = ElementSpec::text_only("x", "Uploadss");
        // "uploadss" vs "uploads": 1 edit in 8 = 0.875 -> still a miss.
        let miss = detector.locate(&spec, &ramp_frame([0, 0, 0, 0]));
        assert!(!miss.found);

        let ocr = FakeOcr::with_words(vec![word("Dashboards", 10, 10)]);
        let detector = UIStateDetector::new(&store, &ocr, &cfg);
        let spec = ElementSpec::text_only("x", "Dashboard5");
        // 1 edit in 10 chars = 0.9 -> fuzzy hit.
        let hit = detector.locate(&spec, &ramp_frame([0, 0, 0, 0]));
        assert!(hit.found);
        assert_eq!(hit.method, Some(MatchMethod::FuzzyOcr));
    }

    #[test]
    fn test_fallback_coordinate_is_last_resort() {
        let ocr = FakeOcr::unavailable();
        let store = TemplateStore::empty();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        let frame = Frame::from_pixel(100, 200, Rgba([0, 0, 0, 255]));
        let result = detector.locate(&all_tier_spec(), &frame);
        assert!(result.found);
        assert_eq!(result.method, Some(MatchMethod::FallbackCoord));
        assert_eq!(result.location, Some(Point { x: 50, y: 100 }));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_all_tiers_miss() {
        let ocr = FakeOcr::with_words(vec![word("nothing", 10, 10)]);
        let store = TemplateStore::empty();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        let mut spec = all_tier_spec();
        spec.fallback = None;
        spec.template = None;
        let result = detector.locate(&spec, &ramp_frame([0, 0, 0, 0]));
        assert!(!result.found);
    }

    #[test]
    fn test_classify_logged_in() {
        let ocr = FakeOcr::with_words(vec![word("My", 10, 10), word("profile", 40, 10)]);
        let store = TemplateStore::empty();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        let logged_in = ElementSpec::text_only("profile_menu", "My profile");
        let login_form = ElementSpec::text_only("login_form", "Sign in");
        let frame = Frame::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        assert_eq!(
            detector.classify_login_state(&frame, &logged_in, &login_form),
            ScreenState::LoggedIn
        );
    }

    #[test]
    fn test_classify_logged_out() {
        let ocr = FakeOcr::with_words(vec![word("Sign", 10, 10), word("in", 50, 10)]);
        let store = TemplateStore::empty();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        let logged_in = ElementSpec::text_only("profile_menu", "My profile");
        let login_form = ElementSpec::text_only("login_form", "Sign in");
        let frame = Frame::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        assert_eq!(
            detector.classify_login_state(&frame, &logged_in, &login_form),
            ScreenState::LoggedOut
        );
    }

    #[test]
    fn test_classify_unclear_ignores_fallback() {
        let ocr = FakeOcr::with_words(vec![word("something", 10, 10)]);
        let store = TemplateStore::empty();
        let cfg = config();
        let detector = UIStateDetector::new(&store, &ocr, &cfg);

        // Even with fallback coordinates configured, classification must
        // not treat a blind position as evidence of state.
        let mut logged_in = ElementSpec::text_only("profile_menu", "My profile");
        logged_in.fallback = Some(RelativePoint { x: 0.5, y: 0.1 });
        let mut login_form = ElementSpec::text_only("login_form", "Sign in");
        login_form.fallback = Some(RelativePoint { x: 0.5, y: 0.5 });

        let frame = Frame::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        assert_eq!(
            detector.classify_login_state(&frame, &logged_in, &login_form),
            ScreenState::Unclear
        );
    }
}
