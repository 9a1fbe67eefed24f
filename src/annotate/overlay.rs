use serde::Serialize;
use tracing::debug;

use crate::annotate::{Annotation, AnnotationKind};
use crate::core::geometry::FractionRect;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverlayBox {
    pub id: String,
    pub kind: AnnotationKind,
    pub rect: FractionRect,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageOverlay {
    pub page: u32,
    pub boxes: Vec<OverlayBox>,
    /// Annotations left out because the page has no pixel frame yet.
    pub skipped: usize,
}

pub fn build_overlay<'a, I>(page: u32, annotations: I) -> PageOverlay
where
    I: IntoIterator<Item = &'a Annotation>,
{
    let mut boxes = Vec::new();
    let mut skipped = 0;

    for annotation in annotations {
        match annotation.bbox_fraction {
            Some(rect) => boxes.push(OverlayBox {
                id: annotation.id.clone(),
                kind: annotation.kind,
                rect,
                title: title(annotation),
            }),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(page, skipped, "page not rendered yet, pixel boxes left out of overlay");
    }

    PageOverlay {
        page,
        boxes,
        skipped,
    }
}

fn title(annotation: &Annotation) -> String {
    match (&annotation.label, annotation.confidence) {
        (Some(label), _) => format!("{} ({})", annotation.text, label),
        (None, Some(confidence)) => format!("{} ({:.1}%)", annotation.text, confidence * 100.0),
        (None, None) => annotation.text.clone(),
    }
}
