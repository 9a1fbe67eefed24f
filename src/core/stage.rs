use serde::Serialize;

const STAGE_TYPE_LABELS: &[(&str, &str)] = &[
    ("ocr", "OCR"),
    ("vlm", "VLM"),
    ("detect", "Detection"),
    ("layout", "Layout"),
    ("process", "Render"),
    ("render", "Render"),
];

const VARIANT_LABELS: &[(&str, &str)] = &[
    ("drawing_contents", "Drawing Contents"),
    ("general_notes", "General Notes"),
    ("room_dimensions", "Room Dimensions"),
    ("title_block", "Title Block"),
    ("electrical_layout", "Electrical Layout"),
    ("revision_history", "Revision History"),
    ("drawing_scale", "Drawing Scale"),
    ("custom", "Custom Prompt"),
];

/// A run's `stage` split into `stage-type:provider:variant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageId {
    pub stage_type: String,
    pub provider: Option<String>,
    pub variant: Option<String>,
}

impl StageId {
    pub fn parse(stage: &str) -> Self {
        let mut segments = stage.splitn(3, ':');
        let stage_type = segments.next().unwrap_or_default().to_string();
        let provider = segments.next().map(str::to_string);
        let variant = segments.next().map(str::to_string);
        Self {
            stage_type,
            provider,
            variant,
        }
    }

    pub fn is_type(&self, stage_type: &str) -> bool {
        self.stage_type == stage_type
    }

    pub fn type_label(&self) -> String {
        lookup(STAGE_TYPE_LABELS, &self.stage_type)
            .map(str::to_string)
            .unwrap_or_else(|| self.stage_type.to_uppercase())
    }

    pub fn variant_label(&self) -> Option<String> {
        self.variant
            .as_deref()
            .map(|variant| lookup(VARIANT_LABELS, variant).unwrap_or(variant).to_string())
    }

    /// Display label such as `VLM gpt-4o (Drawing Contents)`.
    pub fn label(&self) -> String {
        let mut label = self.type_label();
        if let Some(provider) = &self.provider {
            label.push(' ');
            label.push_str(provider);
        }
        if let Some(variant) = self.variant_label() {
            label.push_str(&format!(" ({variant})"));
        }
        label
    }
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, label)| *label)
}
