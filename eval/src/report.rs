// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Single-page PDF evaluation report
//!
//! The classification table and the confusion-matrix heatmap are rasterized
//! to uniquely named PNG files next to the output PDF, embedded as image
//! XObjects, and removed again when rendering finishes, whether it succeeded
//! or not.

use crate::error::{PipelineError, Result};
use crate::metrics::{ClassificationReport, ConfusionMatrix, EvaluationResult};
use crate::raster::{blues, is_dark, Canvas, BLACK, GRID, HEADER_FILL, WHITE};
use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// US letter, in points
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

/// File name prefixes of the scratch images; a random suffix keeps them
/// from replacing existing files or colliding across renders
pub const TABLE_PREFIX: &str = "classification_report";
pub const HEATMAP_PREFIX: &str = "confusion_matrix";

/// A box on the page, origin at the bottom-left corner
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub max_width: f32,
    pub max_height: f32,
}

impl Placement {
    /// Scale an image to fit the box, keeping aspect ratio, centred horizontally
    fn fit(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let scale = (self.max_width / width as f32).min(self.max_height / height as f32);
        let w = width as f32 * scale;
        let h = height as f32 * scale;
        (self.x + (self.max_width - w) / 2.0, self.y, w, h)
    }
}

/// Fixed page layout
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub table: Placement,
    pub heatmap: Placement,
    /// Label and value text, `(x, y, text)` with `{accuracy}` / `{roc_auc}`
    /// placeholders substituted at render time
    pub text: Vec<(f32, f32, String)>,
    pub font_size: f32,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            table: Placement {
                x: 55.0,
                y: 330.0,
                max_width: 500.0,
                max_height: 300.0,
            },
            heatmap: Placement {
                x: 65.0,
                y: 20.0,
                max_width: 500.0,
                max_height: 290.0,
            },
            text: vec![
                (270.0, PAGE_HEIGHT - 50.0, "Accuracy".to_string()),
                (242.0, PAGE_HEIGHT - 70.0, "{accuracy}".to_string()),
                (255.0, PAGE_HEIGHT - 100.0, "ROC AUC Score".to_string()),
                (242.0, PAGE_HEIGHT - 120.0, "{roc_auc}".to_string()),
                (245.0, PAGE_HEIGHT - 150.0, "Classification Report".to_string()),
            ],
            font_size: 12.0,
        }
    }
}

/// Scratch PNG files, deleted when the guard goes out of scope
pub struct ScratchImages {
    table: NamedTempFile,
    heatmap: NamedTempFile,
}

impl ScratchImages {
    pub fn in_dir(dir: &Path) -> Result<Self> {
        let create = |prefix: &str| {
            tempfile::Builder::new()
                .prefix(prefix)
                .suffix(".png")
                .tempfile_in(dir)
                .map_err(|e| PipelineError::report_write(dir, e))
        };
        Ok(Self {
            table: create(TABLE_PREFIX)?,
            heatmap: create(HEATMAP_PREFIX)?,
        })
    }

    pub fn table(&self) -> &Path {
        self.table.path()
    }

    pub fn heatmap(&self) -> &Path {
        self.heatmap.path()
    }
}

pub struct ReportRenderer {
    pub layout: ReportLayout,
    /// Footer caption, e.g. the experiment variant
    pub caption: Option<String>,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportRenderer {
    pub fn new() -> Self {
        Self {
            layout: ReportLayout::default(),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: &str) -> Self {
        self.caption = Some(caption.to_string());
        self
    }

    /// Directory that receives the scratch images for `output`
    pub fn scratch_dir(output: &Path) -> PathBuf {
        match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Render `result` into a PDF at `output`
    pub fn render(&self, result: &EvaluationResult, output: &Path) -> Result<()> {
        let dir = Self::scratch_dir(output);
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::report_write(&dir, e))?;

        let scratch = ScratchImages::in_dir(&dir)?;

        render_table(&result.report)
            .save(scratch.table())
            .map_err(|e| PipelineError::report_write(scratch.table(), e))?;
        render_heatmap(&result.confusion_matrix)
            .save(scratch.heatmap())
            .map_err(|e| PipelineError::report_write(scratch.heatmap(), e))?;

        let mut doc = self.compose(result, &scratch)?;
        doc.save(output).map_err(|e| PipelineError::report_write(output, e))?;

        tracing::info!("Report written to {}", output.display());
        Ok(())
    }

    fn compose(&self, result: &EvaluationResult, scratch: &ScratchImages) -> Result<Document> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let (table_id, table_dims) = embed_png(&mut doc, scratch.table())?;
        let (heatmap_id, heatmap_dims) = embed_png(&mut doc, scratch.heatmap())?;

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Im1" => table_id, "Im2" => heatmap_id },
        });

        let mut operations = Vec::new();
        for (x, y, text) in &self.layout.text {
            let text = text
                .replace("{accuracy}", &result.accuracy.to_string())
                .replace("{roc_auc}", &result.roc_auc.to_string());
            push_text(&mut operations, *x, *y, self.layout.font_size, &text);
        }
        if let Some(caption) = &self.caption {
            let footer = format!("{} - generated {}", caption, Utc::now().format("%Y-%m-%d %H:%M UTC"));
            push_text(&mut operations, 36.0, 8.0, 7.0, &footer);
        }
        push_image(&mut operations, "Im1", self.layout.table.fit(table_dims.0, table_dims.1));
        push_image(&mut operations, "Im2", self.layout.heatmap.fit(heatmap_dims.0, heatmap_dims.1));

        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|e| PipelineError::report_write(scratch.table(), e))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        Ok(doc)
    }
}

fn push_text(operations: &mut Vec<Operation>, x: f32, y: f32, size: f32, text: &str) {
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new("Tf", vec!["F1".into(), size.into()]));
    operations.push(Operation::new("Td", vec![x.into(), y.into()]));
    operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
    operations.push(Operation::new("ET", vec![]));
}

fn push_image(operations: &mut Vec<Operation>, name: &str, (x, y, w, h): (f32, f32, f32, f32)) {
    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new(
        "cm",
        vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
    ));
    operations.push(Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]));
    operations.push(Operation::new("Q", vec![]));
}

/// Read a PNG back and add it as an RGB image XObject
fn embed_png(doc: &mut Document, path: &Path) -> Result<(lopdf::ObjectId, (u32, u32))> {
    let image = image::open(path)
        .map_err(|e| PipelineError::report_write(path, e))?
        .to_rgb8();
    let (width, height) = image.dimensions();

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        image.into_raw(),
    );
    Ok((doc.add_object(stream), (width, height)))
}

const CELL_W: u32 = 220;
const CELL_H: u32 = 56;
const TABLE_SCALE: u32 = 3;

/// Per-class metrics as a bordered table with a shaded header row
pub fn render_table(report: &ClassificationReport) -> Canvas {
    let rows = report.cells();
    let n_cols = ClassificationReport::COLUMNS.len() as u32;
    let n_rows = rows.len() as u32 + 1;
    let margin = 10;

    let mut canvas = Canvas::new(n_cols * CELL_W + 2 * margin, n_rows * CELL_H + 2 * margin, WHITE);

    canvas.fill_rect(margin, margin, n_cols * CELL_W, CELL_H, HEADER_FILL);

    let header = ClassificationReport::COLUMNS.map(|c| c.to_string());
    for (r, cells) in std::iter::once(&header).chain(rows.iter()).enumerate() {
        let top = margin + r as u32 * CELL_H;
        for (c, text) in cells.iter().enumerate() {
            let left = margin + c as u32 * CELL_W;
            canvas.stroke_rect(left, top, CELL_W + 1, CELL_H + 1, GRID);
            canvas.draw_text_centered(left + CELL_W / 2, top + CELL_H / 2, text, TABLE_SCALE, BLACK);
        }
    }

    canvas
}

const HEAT_CELL: u32 = 180;

/// 2x2 heatmap with annotated counts, axis titles and class ticks
pub fn render_heatmap(cm: &ConfusionMatrix) -> Canvas {
    let left = 110;
    let top = 70;
    let grid = 2 * HEAT_CELL;
    let mut canvas = Canvas::new(left + grid + 40, top + grid + 100, WHITE);

    canvas.draw_text_centered(left + grid / 2, top / 2, "Confusion Matrix", 3, BLACK);

    let max = cm.counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
    for (truth, row) in cm.counts.iter().enumerate() {
        for (pred, &count) in row.iter().enumerate() {
            let x = left + pred as u32 * HEAT_CELL;
            let y = top + truth as u32 * HEAT_CELL;
            let fill = blues(count as f64 / max);
            canvas.fill_rect(x, y, HEAT_CELL, HEAT_CELL, fill);

            let ink = if is_dark(fill) { WHITE } else { BLACK };
            canvas.draw_text_centered(x + HEAT_CELL / 2, y + HEAT_CELL / 2, &count.to_string(), 4, ink);
        }
    }
    canvas.stroke_rect(left, top, grid + 1, grid + 1, GRID);

    for class in 0..2u32 {
        let centre = class * HEAT_CELL + HEAT_CELL / 2;
        canvas.draw_text_centered(left + centre, top + grid + 18, &class.to_string(), 3, BLACK);
        canvas.draw_text_centered(left - 22, top + centre, &class.to_string(), 3, BLACK);
    }
    canvas.draw_text_centered(left + grid / 2, top + grid + 62, "Predicted", 3, BLACK);
    canvas.draw_text_vertical(left - 70, top + grid / 2, "Actual", 3, BLACK);

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::Label;
    use crate::metrics::evaluate;
    use tempfile::TempDir;

    fn sample_result() -> EvaluationResult {
        let truth: Vec<Label> = [0, 0, 1, 1, 1, 0].iter().map(|&b| Label::from_index(b)).collect();
        let preds: Vec<Label> = [0, 1, 1, 1, 0, 0].iter().map(|&b| Label::from_index(b)).collect();
        evaluate(&preds, &[0.2, 0.6, 0.9, 0.7, 0.4, 0.1], &truth).unwrap()
    }

    fn png_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect()
    }

    #[test]
    fn test_render_writes_pdf_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("reports").join("model_evaluation_test.pdf");

        ReportRenderer::new()
            .with_caption("test")
            .render(&sample_result(), &output)
            .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert!(!bytes.is_empty());
        assert!(bytes.starts_with(b"%PDF-1.5"));

        assert!(png_files(output.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_render_failure_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        // A directory where the PDF should go makes the final write fail
        let output = dir.path().join("occupied.pdf");
        std::fs::create_dir(&output).unwrap();

        let err = ReportRenderer::new().render(&sample_result(), &output).unwrap_err();

        assert!(matches!(err, PipelineError::ReportWrite { .. }));
        assert!(png_files(dir.path()).is_empty());
    }

    #[test]
    fn test_render_keeps_existing_figures() {
        let dir = TempDir::new().unwrap();
        let table = dir.path().join("classification_report.png");
        let heatmap = dir.path().join("confusion_matrix.png");
        std::fs::write(&table, b"user figure").unwrap();
        std::fs::write(&heatmap, b"user figure").unwrap();

        let output = dir.path().join("report.pdf");
        let renderer = ReportRenderer::new();
        renderer.render(&sample_result(), &output).unwrap();
        renderer.render(&sample_result(), &output).unwrap();

        assert_eq!(std::fs::read(&table).unwrap(), b"user figure");
        assert_eq!(std::fs::read(&heatmap).unwrap(), b"user figure");
        assert_eq!(png_files(dir.path()).len(), 2);
    }

    #[test]
    fn test_pdf_is_single_letter_page() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("report.pdf");
        ReportRenderer::new().render(&sample_result(), &output).unwrap();

        let doc = Document::load(&output).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_scratch_guard_removes_files() {
        let dir = TempDir::new().unwrap();
        let (table, heatmap) = {
            let scratch = ScratchImages::in_dir(dir.path()).unwrap();
            assert_ne!(scratch.table(), scratch.heatmap());
            assert!(scratch.table().exists());
            (scratch.table().to_path_buf(), scratch.heatmap().to_path_buf())
        };
        assert!(!table.exists());
        assert!(!heatmap.exists());
    }

    #[test]
    fn test_placement_keeps_aspect() {
        let placement = Placement {
            x: 0.0,
            y: 0.0,
            max_width: 500.0,
            max_height: 100.0,
        };
        let (x, _, w, h) = placement.fit(400, 200);
        assert!((w - 200.0).abs() < 1e-3);
        assert!((h - 100.0).abs() < 1e-3);
        assert!((x - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_figure_sizes() {
        let result = sample_result();
        let table = render_table(&result.report);
        assert_eq!(table.height(), 6 * CELL_H + 20);

        let heatmap = render_heatmap(&result.confusion_matrix);
        assert!(heatmap.width() > 2 * HEAT_CELL);
    }
}
