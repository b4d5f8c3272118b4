//! UI element detection: template matching, OCR text location, and the
//! tiered state detector that composes them.

pub mod state;
pub mod template;
pub mod text;

pub use state::{ScreenState, UIStateDetector};
pub use template::{Template, TemplateMatcher, TemplateStore};
pub use text::{OcrEngine, OcrWord, TextLocator};

/// A pixel position in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A pixel rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn center(&self) -> Point {
        Point {
            x: (self.x + self.width / 2) as i32,
            y: (self.y + self.height / 2) as i32,
        }
    }
}

/// Which detection tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    ExactOcr,
    TemplateHigh,
    TemplateLow,
    FuzzyOcr,
    FallbackCoord,
}

/// Result of one detection lookup. Produced fresh per lookup and never
/// mutated. A not-found result still carries the best confidence achieved,
/// which is useful for threshold diagnostics.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub found: bool,
    pub location: Option<Point>,
    pub confidence: f32,
    pub method: Option<MatchMethod>,
}

impl MatchResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            location: None,
            confidence: 0.0,
            method: None,
        }
    }

    pub fn not_found_with_confidence(confidence: f32) -> Self {
        Self {
            found: false,
            location: None,
            confidence,
            method: None,
        }
    }

    pub fn found_at(location: Point, confidence: f32, method: MatchMethod) -> Self {
        Self {
            found: true,
            location: Some(location),
            confidence,
            method: Some(method),
        }
    }
}
