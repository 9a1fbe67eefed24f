use crate::annotate::Annotation;

/// Annotations whose text or label contains `query`, ignoring case.
///
/// A blank query matches everything.
pub fn filter_annotations<'a>(annotations: &'a [Annotation], query: &str) -> Vec<&'a Annotation> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return annotations.iter().collect();
    }

    annotations
        .iter()
        .filter(|annotation| {
            annotation.text.to_lowercase().contains(&needle)
                || annotation
                    .label
                    .as_deref()
                    .map(|label| label.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        })
        .collect()
}

/// First `limit` entries of a match list plus the full count.
#[derive(Debug, Clone)]
pub struct DisplayWindow<'a> {
    matches: Vec<&'a Annotation>,
    limit: usize,
}

impl<'a> DisplayWindow<'a> {
    pub const DEFAULT_LIMIT: usize = 200;

    pub fn new(matches: Vec<&'a Annotation>, limit: usize) -> Self {
        Self { matches, limit }
    }

    pub fn visible(&self) -> &[&'a Annotation] {
        &self.matches[..self.matches.len().min(self.limit)]
    }

    pub fn total(&self) -> usize {
        self.matches.len()
    }

    pub fn is_truncated(&self) -> bool {
        self.matches.len() > self.limit
    }

    /// Every match, including the ones past the display limit.
    pub fn all(&self) -> &[&'a Annotation] {
        &self.matches
    }

    pub fn indicator(&self) -> Option<String> {
        self.is_truncated().then(|| {
            format!(
                "Showing {} of {} annotations",
                self.visible().len(),
                self.total()
            )
        })
    }
}
