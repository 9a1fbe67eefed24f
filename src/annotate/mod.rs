pub mod filter;
pub mod overlay;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{normalize, BBox, CoordinateSpace, FractionRect, PageSize};
use crate::core::model::PageFragment;

pub use filter::{filter_annotations, DisplayWindow};
pub use overlay::{build_overlay, OverlayBox, PageOverlay};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Ocr,
    Detection,
    Layout,
}

impl AnnotationKind {
    pub fn coordinate_space(&self) -> CoordinateSpace {
        match self {
            AnnotationKind::Layout => CoordinateSpace::Grid1000,
            AnnotationKind::Ocr | AnnotationKind::Detection => CoordinateSpace::Pixel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Ocr => "ocr",
            AnnotationKind::Detection => "detection",
            AnnotationKind::Layout => "layout",
        }
    }
}

/// A word, detection or layout token on one page, in page fractions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub id: String,
    pub kind: AnnotationKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub bbox: BBox,
    /// `None` for pixel boxes on a page that has not been rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_fraction: Option<FractionRect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Annotation {
    fn new(
        id: String,
        kind: AnnotationKind,
        text: &str,
        label: Option<&str>,
        bbox: BBox,
        confidence: Option<f64>,
        page: Option<PageSize>,
    ) -> Self {
        Self {
            id,
            kind,
            text: text.to_string(),
            label: label.map(str::to_string),
            bbox,
            bbox_fraction: normalize(bbox, kind.coordinate_space(), page),
            confidence,
        }
    }
}

/// Per-page caps on how many source items reach the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnifyLimits {
    pub max_words: Option<usize>,
    pub max_tokens: Option<usize>,
}

impl Default for UnifyLimits {
    fn default() -> Self {
        Self {
            max_words: Some(400),
            max_tokens: Some(300),
        }
    }
}

impl UnifyLimits {
    pub fn unbounded() -> Self {
        Self {
            max_words: None,
            max_tokens: None,
        }
    }
}

fn capped<T>(items: &[T], cap: Option<usize>) -> &[T] {
    match cap {
        Some(cap) if cap < items.len() => &items[..cap],
        _ => items,
    }
}

/// Flattens one page into annotations, OCR words first, then detections,
/// then layout tokens. Source order is kept within each kind.
pub fn unify_fragment(
    fragment: &PageFragment<'_>,
    page: Option<PageSize>,
    limits: UnifyLimits,
) -> Vec<Annotation> {
    let words = capped(fragment.words, limits.max_words);
    let tokens = capped(fragment.tokens, limits.max_tokens);
    let mut items = Vec::with_capacity(words.len() + fragment.detections.len() + tokens.len());

    for (idx, word) in words.iter().enumerate() {
        items.push(Annotation::new(
            format!("word-{idx}"),
            AnnotationKind::Ocr,
            &word.text,
            None,
            word.bbox,
            word.confidence,
            page,
        ));
    }

    for (idx, det) in fragment.detections.iter().enumerate() {
        items.push(Annotation::new(
            format!("det-{idx}"),
            AnnotationKind::Detection,
            &det.label,
            None,
            det.bbox,
            Some(det.confidence),
            page,
        ));
    }

    for (idx, token) in tokens.iter().enumerate() {
        items.push(Annotation::new(
            format!("tok-{idx}"),
            AnnotationKind::Layout,
            &token.word,
            Some(&token.label),
            token.bbox,
            token.score,
            page,
        ));
    }

    items
}
