use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::annotate::overlay::{build_overlay, OverlayBox};
use crate::annotate::{unify_fragment, UnifyLimits};
use crate::core::model::{DocumentResults, Page, Run};
use crate::export::Exporter;

/// Writes one HTML page per rendered page with the newest annotated run's
/// boxes laid over the page image.
#[derive(Debug, Clone)]
pub struct HtmlOverlayExporter {
    out_dir: PathBuf,
    limits: UnifyLimits,
}

impl HtmlOverlayExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self {
            out_dir,
            limits: UnifyLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: UnifyLimits) -> Self {
        self.limits = limits;
        self
    }

    fn box_to_div(overlay_box: &OverlayBox) -> String {
        let [left, top, width, height] = overlay_box.rect.to_percent();
        format!(
            r#"<div class='bbox {kind}' style='left:{left:.3}%; top:{top:.3}%; width:{width:.3}%; height:{height:.3}%;' data-id='{id}' title='{title}'></div>"#,
            kind = overlay_box.kind.as_str(),
            id = html_escape::encode_single_quoted_attribute(&overlay_box.id),
            title = html_escape::encode_single_quoted_attribute(&overlay_box.title),
        )
    }

    fn render_page(run: &Run, page: &Page, boxes_html: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset='utf-8'>
<title>{stage} - Page {page_no}</title>
<style>
body {{ margin: 0; font-family: Arial, sans-serif; }}
#canvas {{ position: relative; display: inline-block; }}
#canvas img {{ display: block; max-width: 100%; }}
.bbox {{ position: absolute; border: 2px solid; box-sizing: border-box; }}
.bbox.ocr {{ border-color: rgba(0,0,255,0.6); background: rgba(100,100,255,0.1); }}
.bbox.detection {{ border-color: rgba(255,0,0,0.6); background: rgba(255,0,0,0.1); }}
.bbox.layout {{ border-color: rgba(0,128,0,0.6); background: rgba(0,128,0,0.1); border-style: dashed; }}
#info {{ position: fixed; right: 10px; top: 10px; background: #fff; padding: 10px; border: 1px solid #ddd; max-width: 300px; }}
</style>
</head>
<body>
<div id='info'>Click a box to inspect.</div>
<div id='canvas'>
<img src='{image}' />
{boxes}
</div>
<script>
const info = document.getElementById('info');
for (const el of document.querySelectorAll('.bbox')) {{
  el.addEventListener('click', () => {{
    info.textContent = el.title;
  }});
}}
</script>
</body>
</html>"#,
            stage = html_escape::encode_text(&run.stage),
            page_no = page.page,
            image = html_escape::encode_single_quoted_attribute(&page.url),
            boxes = boxes_html,
        )
    }
}

impl Exporter for HtmlOverlayExporter {
    fn export(&self, results: &DocumentResults) -> Result<()> {
        let Some(run) = results.runs.iter().find(|run| run.has_annotations()) else {
            debug!("no annotated run, skipping overlay export");
            return Ok(());
        };
        let Some(pages) = results
            .runs
            .iter()
            .filter(|r| !r.is_failed())
            .find_map(|r| r.output.rendered_pages())
        else {
            debug!("no rendered pages, skipping overlay export");
            return Ok(());
        };

        fs::create_dir_all(&self.out_dir)?;
        for page in pages {
            let annotations = run
                .output
                .page_fragment(page.page)
                .map(|fragment| unify_fragment(&fragment, page.size(), self.limits))
                .unwrap_or_default();
            let overlay = build_overlay(page.page, &annotations);

            let boxes_html: String = overlay.boxes.iter().map(Self::box_to_div).collect();
            let html = Self::render_page(run, page, &boxes_html);
            let path = self.out_dir.join(format!("page_{:03}.html", page.page));
            fs::write(path, html)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn positions_boxes_in_percent() -> Result<()> {
        let results: DocumentResults = serde_json::from_value(json!({
            "document": {"id": 1, "filename": "A-101.pdf"},
            "runs": [
                {"id": 2, "stage": "detect:yolov8", "status": "completed",
                 "output": {"pages": [{"page": 1, "detections": [{"label": "door <D1>", "confidence": 0.5, "bbox": [100, 200, 300, 400]}]}]}},
                {"id": 1, "stage": "render", "status": "completed",
                 "output": {"pages": [{"page": 1, "url": "/files/pages/a_page_1.png", "width": 1000, "height": 1000}]}}
            ]
        }))?;
        let out = std::env::temp_dir().join(format!("sheetlens-html-{}", std::process::id()));

        HtmlOverlayExporter::new(out.clone()).export(&results)?;

        let html = fs::read_to_string(out.join("page_001.html"))?;
        assert!(html.contains("left:10.000%; top:20.000%; width:20.000%; height:20.000%;"));
        assert!(html.contains("door &lt;D1&gt; (50.0%)"));
        assert!(html.contains("/files/pages/a_page_1.png"));

        let _ = fs::remove_dir_all(&out);
        Ok(())
    }
}
