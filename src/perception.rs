//! What the model gets to see of the page each iteration.
//!
//! Vision mode sends a clean and a labeled screenshot merged side by side;
//! text mode sends simplified HTML in which labeled elements carry their label
//! as `id`. Both modes ground the page first so the executor can resolve
//! labels afterwards.

use crate::{
    browser::TabHandle,
    config::{AgentConfig, AgentMode},
    dom::{LabelRecord, ground},
    error::{AgentError, Result},
    knowledge::AnnotationRule,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use serde_json::json;
use std::{io::Cursor, path::Path, time::Duration};

const MERGE_PADDING: u32 = 10;
const CAPTION_SIZE: f32 = 30.0;
const CLEAN_CAPTION: &str = "Clean Screenshot";
const ANNOTATED_CAPTION: &str = "Annotated Screenshot";

#[derive(Debug, Clone, PartialEq)]
pub enum PerceptionContent {
    /// PNG `data:` URL
    Screenshot(String),
    Html(String),
}

/// One perception cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Perception {
    pub content: PerceptionContent,
    pub labels: Vec<LabelRecord>,
    /// How far down the page the viewport bottom is, 0 to 100
    pub viewport_percentage: f64,
}

impl Perception {
    pub fn image_data(&self) -> Option<&str> {
        match &self.content {
            PerceptionContent::Screenshot(data) => Some(data),
            PerceptionContent::Html(_) => None,
        }
    }

    pub fn html(&self) -> Option<&str> {
        match &self.content {
            PerceptionContent::Html(html) => Some(html),
            PerceptionContent::Screenshot(_) => None,
        }
    }
}

/// Lays screenshots out left to right on a white canvas
pub struct ScreenshotMerger {
    font: Option<Font<'static>>,
    padding: u32,
}

impl ScreenshotMerger {
    /// Merger without captions
    pub fn new() -> Self {
        Self { font: None, padding: MERGE_PADDING }
    }

    /// Merger captioning each image with the TrueType font at `path`
    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| AgentError::Image(format!("{} is not a usable font", path.display())))?;
        Ok(Self { font: Some(font), padding: MERGE_PADDING })
    }

    fn caption_height(&self) -> u32 {
        if self.font.is_some() { CAPTION_SIZE as u32 } else { 0 }
    }

    /// Canvas size for images of the given sizes
    pub fn canvas_size(&self, sizes: &[(u32, u32)]) -> (u32, u32) {
        let width = sizes.iter().map(|(w, _)| w + self.padding * 2).sum();
        let height = sizes.iter().map(|(_, h)| h + self.padding * 2).max().unwrap_or(0);
        (width, height + self.caption_height())
    }

    /// Merge PNG images, each with its caption, into one PNG
    pub fn merge(&self, images: &[(&[u8], &str)]) -> Result<Vec<u8>> {
        let decoded = images
            .iter()
            .map(|(bytes, caption)| {
                image::load_from_memory(bytes)
                    .map(|img| (img.to_rgba8(), *caption))
                    .map_err(|e| AgentError::Image(format!("cannot decode screenshot: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let sizes: Vec<(u32, u32)> = decoded.iter().map(|(img, _)| img.dimensions()).collect();
        let (width, height) = self.canvas_size(&sizes);
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        let mut x = self.padding;
        let y = self.padding;
        for (img, caption) in &decoded {
            imageops::overlay(&mut canvas, img, x as i64, y as i64);
            if let Some(font) = &self.font {
                draw_caption(&mut canvas, font, caption, x + img.width() / 2, y + img.height());
            }
            x += img.width() + self.padding;
        }

        let mut out = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .map_err(|e| AgentError::Image(format!("cannot encode merged screenshot: {}", e)))?;
        Ok(out)
    }
}

impl Default for ScreenshotMerger {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_caption(canvas: &mut RgbaImage, font: &Font<'static>, caption: &str, center_x: u32, top: u32) {
    let scale = Scale::uniform(CAPTION_SIZE);
    let (text_width, _) = text_size(scale, font, caption);
    let left = center_x as i32 - text_width / 2;
    draw_text_mut(canvas, Rgba([0, 0, 0, 255]), left, top as i32, scale, font, caption);
}

/// PNG bytes as a `data:` URL
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Captures the page in the configured mode
pub struct PerceptionCapturer {
    merger: ScreenshotMerger,
    annotation_settle: Duration,
}

impl PerceptionCapturer {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let merger = match &config.caption_font {
            Some(path) => ScreenshotMerger::with_font_file(path)?,
            None => ScreenshotMerger::new(),
        };
        Ok(Self { merger, annotation_settle: config.annotation_settle })
    }

    pub async fn capture(&self, tab: &dyn TabHandle, mode: AgentMode, rules: &[AnnotationRule]) -> Result<Perception> {
        match mode {
            AgentMode::Vision => self.capture_vision(tab, rules).await,
            AgentMode::Text => {
                let (snapshot, labels) = ground(tab, rules).await?;
                Ok(Perception {
                    content: PerceptionContent::Html(snapshot.to_simplified_html()),
                    labels: labels.to_records(),
                    viewport_percentage: snapshot.viewport_percentage(),
                })
            }
        }
    }

    async fn capture_vision(&self, tab: &dyn TabHandle, rules: &[AnnotationRule]) -> Result<Perception> {
        let clean = tab.capture_visible_tab().await?;
        let (snapshot, labels) = ground(tab, rules).await?;

        tab.call_rpc("drawLabels", json!([])).await?;
        tokio::time::sleep(self.annotation_settle).await;
        let annotated = tab.capture_visible_tab().await;
        // The overlay must not leak into the page, even when the capture failed
        tab.call_rpc("removeLabels", json!([])).await?;
        let annotated = annotated?;

        let merged = self.merger.merge(&[(clean.as_slice(), CLEAN_CAPTION), (annotated.as_slice(), ANNOTATED_CAPTION)])?;
        log::debug!("captured {} labels, merged screenshot is {} bytes", labels.len(), merged.len());

        Ok(Perception {
            content: PerceptionContent::Screenshot(png_data_url(&merged)),
            labels: labels.to_records(),
            viewport_percentage: snapshot.viewport_percentage(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png).unwrap();
        out
    }

    #[test]
    fn test_canvas_size_without_captions() {
        let merger = ScreenshotMerger::new();
        assert_eq!(merger.canvas_size(&[(100, 50), (100, 80)]), (240, 100));
        assert_eq!(merger.canvas_size(&[]), (0, 0));
    }

    #[test]
    fn test_merge_places_images_side_by_side() {
        let merger = ScreenshotMerger::new();
        let merged = merger.merge(&[(png(40, 30).as_slice(), "a"), (png(20, 10).as_slice(), "b")]).unwrap();

        let img = image::load_from_memory(&merged).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (100, 50));
        assert_eq!(*img.get_pixel(10, 10), Rgba([10, 20, 30, 255]));
        assert_eq!(*img.get_pixel(60, 10), Rgba([10, 20, 30, 255]));
        assert_eq!(*img.get_pixel(55, 10), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(60, 25), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let err = ScreenshotMerger::new().merge(&[(b"not a png".as_slice(), "x")]).unwrap_err();
        assert!(matches!(err, AgentError::Image(_)));
    }

    #[test]
    fn test_missing_font_file() {
        assert!(ScreenshotMerger::with_font_file("/nonexistent/font.ttf").is_err());
    }

    #[test]
    fn test_data_url() {
        assert_eq!(png_data_url(b"abc"), "data:image/png;base64,YWJj");
    }
}
