//! Text location via OCR.
//!
//! The OCR engine runs as an external Tesseract subprocess emitting TSV,
//! which carries word text, bounding box, and confidence. `TextLocator`
//! searches the recognized words for a query string, either as a
//! case-insensitive exact substring or with a fuzzy similarity floor, and
//! fails closed (a plain not-found result) when the engine itself is
//! unavailable so callers can fall through to other detection tiers.

use std::path::PathBuf;
use std::process::Command;

use tempfile::NamedTempFile;

use super::{MatchMethod, MatchResult, Region};
use crate::capture::Frame;
use crate::error::{AutomationError, Result};

/// Page segmentation mode: sparse text, suited to scattered UI labels.
const TESSERACT_PSM: &str = "11";

/// A single recognized word with its position.
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    /// Sequential line index in reading order; words sharing an index were
    /// recognized on the same text line.
    pub line: u32,
    pub bbox: Region,
    pub confidence: f32,
}

/// Optical character recognition over a captured frame.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, frame: &Frame) -> Result<Vec<OcrWord>>;
}

/// Tesseract invoked as a subprocess with TSV output.
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
}

impl TesseractEngine {
    /// Locates the Tesseract executable: a bundled copy next to the
    /// executable wins, otherwise whatever is on PATH.
    pub fn new() -> Self {
        let bundled = crate::paths::get_exe_dir()
            .join("tesseract")
            .join(if cfg!(windows) {
                "tesseract.exe"
            } else {
                "tesseract"
            });
        if bundled.exists() {
            let tessdata = bundled.parent().map(|p| p.join("tessdata"));
            Self {
                executable: bundled,
                tessdata: tessdata.filter(|p| p.exists()),
            }
        } else {
            Self {
                executable: PathBuf::from("tesseract"),
                tessdata: None,
            }
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, frame: &Frame) -> Result<Vec<OcrWord>> {
        let gray = image::imageops::grayscale(frame);

        let temp_input = NamedTempFile::with_suffix(".png")
            .map_err(|e| AutomationError::Ocr(e.to_string()))?;
        gray.save(temp_input.path())
            .map_err(|e| AutomationError::Ocr(e.to_string()))?;

        let temp_output =
            NamedTempFile::new().map_err(|e| AutomationError::Ocr(e.to_string()))?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut cmd = Command::new(&self.executable);
        cmd.arg(temp_input.path())
            .arg(&output_base)
            .arg("-l")
            .arg("eng")
            .arg("--psm")
            .arg(TESSERACT_PSM)
            .arg("tsv");
        if let Some(tessdata) = &self.tessdata {
            cmd.arg("--tessdata-dir").arg(tessdata);
        }

        let output = cmd
            .output()
            .map_err(|e| AutomationError::Ocr(format!("failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutomationError::Ocr(format!("tesseract failed: {}", stderr)));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| AutomationError::Ocr(format!("failed to read tesseract output: {}", e)))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

/// Parses Tesseract TSV output into positioned words.
fn parse_tsv_output(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();
    let mut line_index: u32 = 0;
    let mut current_line_key: Option<(i32, i32, i32)> = None;

    for row in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num,
        //             word_num, left, top, width, height, conf, text
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        if conf < 0.0 {
            continue;
        }

        let block: i32 = fields[2].parse().unwrap_or(0);
        let par: i32 = fields[3].parse().unwrap_or(0);
        let line: i32 = fields[4].parse().unwrap_or(0);
        let key = (block, par, line);
        if current_line_key.is_some() && current_line_key != Some(key) {
            line_index += 1;
        }
        current_line_key = Some(key);

        words.push(OcrWord {
            text: text.to_string(),
            line: line_index,
            bbox: Region {
                x: fields[6].parse().unwrap_or(0),
                y: fields[7].parse().unwrap_or(0),
                width: fields[8].parse().unwrap_or(0),
                height: fields[9].parse().unwrap_or(0),
            },
            confidence: conf,
        });
    }

    words
}

/// Searches recognized text for a query string.
pub struct TextLocator<'a> {
    engine: &'a dyn OcrEngine,
    fuzzy_min_similarity: f32,
}

impl<'a> TextLocator<'a> {
    pub fn new(engine: &'a dyn OcrEngine, fuzzy_min_similarity: f32) -> Self {
        Self {
            engine,
            fuzzy_min_similarity,
        }
    }

    /// Raw recognized words, for diagnostics.
    pub fn words(&self, frame: &Frame) -> Result<Vec<OcrWord>> {
        self.engine.recognize(frame)
    }

    /// Finds `query` in the frame's recognized text.
    ///
    /// Exact mode requires a case-insensitive substring match; fuzzy mode
    /// accepts words whose similarity to the query meets the configured
    /// floor. The first qualifying match wins, tie-broken top-to-bottom
    /// then left-to-right. OCR engine failure yields a plain not-found so
    /// callers can fall back to other tiers.
    pub fn find_text(&self, frame: &Frame, query: &str, fuzzy: bool) -> MatchResult {
        let mut words = match self.engine.recognize(frame) {
            Ok(words) => words,
            Err(e) => {
                crate::log(&format!("OCR unavailable, failing closed: {}", e));
                return MatchResult::not_found();
            }
        };
        sort_reading_order(&mut words);

        let query_norm = normalize(query);
        if query_norm.is_empty() {
            return MatchResult::not_found();
        }

        if fuzzy {
            self.find_fuzzy(&words, &query_norm)
        } else {
            Self::find_exact(&words, &query_norm)
        }
    }

    fn find_exact(words: &[OcrWord], query_norm: &str) -> MatchResult {
        // Single words first, in reading order.
        for word in words {
            if normalize(&word.text).contains(query_norm) {
                return MatchResult::found_at(word.bbox.center(), 1.0, MatchMethod::ExactOcr);
            }
        }
        // Multi-word queries: match against each joined line.
        for (text, bbox) in join_lines(words) {
            if text.contains(query_norm) {
                return MatchResult::found_at(bbox.center(), 1.0, MatchMethod::ExactOcr);
            }
        }
        MatchResult::not_found()
    }

    fn find_fuzzy(&self, words: &[OcrWord], query_norm: &str) -> MatchResult {
        let mut best_confidence = 0.0f32;

        for word in words {
            let similarity = similarity_ratio(&normalize(&word.text), query_norm);
            if similarity >= self.fuzzy_min_similarity {
                return MatchResult::found_at(
                    word.bbox.center(),
                    similarity,
                    MatchMethod::FuzzyOcr,
                );
            }
            best_confidence = best_confidence.max(similarity);
        }
        for (text, bbox) in join_lines(words) {
            let similarity = similarity_ratio(&text, query_norm);
            if similarity >= self.fuzzy_min_similarity {
                return MatchResult::found_at(bbox.center(), similarity, MatchMethod::FuzzyOcr);
            }
            best_confidence = best_confidence.max(similarity);
        }

        MatchResult::not_found_with_confidence(best_confidence)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Sorts words top-to-bottom, then left-to-right.
fn sort_reading_order(words: &mut [OcrWord]) {
    words.sort_by(|a, b| (a.bbox.y, a.bbox.x).cmp(&(b.bbox.y, b.bbox.x)));
}

/// Joins words sharing a line index into (normalized text, union bbox)
/// pairs, preserving reading order of the lines.
fn join_lines(words: &[OcrWord]) -> Vec<(String, Region)> {
    use std::collections::BTreeMap;

    let mut lines: BTreeMap<u32, (Vec<&OcrWord>, Region)> = BTreeMap::new();
    for word in words {
        lines
            .entry(word.line)
            .and_modify(|(members, bbox)| {
                members.push(word);
                *bbox = union(*bbox, word.bbox);
            })
            .or_insert_with(|| (vec![word], word.bbox));
    }

    lines
        .into_values()
        .map(|(mut members, bbox)| {
            members.sort_by_key(|w| w.bbox.x);
            let text = members
                .iter()
                .map(|w| normalize(&w.text))
                .collect::<Vec<_>>()
                .join(" ");
            (text, bbox)
        })
        .collect()
}

fn union(a: Region, b: Region) -> Region {
    let x0 = a.x.min(b.x);
    let y0 = a.y.min(b.y);
    let x1 = (a.x + a.width).max(b.x + b.width);
    let y1 = (a.y + a.height).max(b.y + b.height);
    Region {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    }
}

/// Levenshtein-based similarity in 0.0-1.0.
pub fn similarity_ratio(a: &str, b: &str) -> f32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a_chars, &b_chars);
    1.0 - distance as f32 / max_len as f32
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
