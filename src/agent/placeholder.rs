// Lyric Director Placeholder Renderer
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Local, non-AI fallback frames. Every segment that the generative
// backend cannot serve still gets an image from here.
//
// Text frames: centered, outlined lyric text on black.
// Abstract frames: seeded lines and circles behind the text, so the same
// text always produces the same picture.

use crate::agent::timeline::Segment;
use fontdue::{Font, FontSettings};
use image::{ImageFormat, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiny_skia::{Color, Paint, PathBuilder, Pixmap, Stroke, Transform};
use tracing::{debug, info, warn};

pub const FONT_ENV_VAR: &str = "LYRIC_DIRECTOR_FONT";
pub const INSTRUMENTAL_LABEL: &str = "♪ Instrumental ♪";

const WRAP_WIDTH: usize = 30;
const MAX_DISPLAY_CHARS: usize = 180;
const TEXT_FONT_PX: f32 = 36.0;
const ABSTRACT_FONT_PX: f32 = 48.0;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:/Windows/Fonts/arial.ttf",
];

#[derive(Debug, Error)]
pub enum PlaceholderError {
    #[error("cannot allocate a {0}x{1} canvas")]
    Canvas(u32, u32),
    #[error("placeholder I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("placeholder encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Colour scheme for one frame style.
#[derive(Debug, Clone, Copy)]
struct Palette {
    background: [u8; 3],
    text: [u8; 3],
    outline: [u8; 3],
    font_px: f32,
}

const TEXT_PALETTE: Palette = Palette {
    background: [0, 0, 0],
    text: [255, 255, 255],
    outline: [0, 0, 0],
    font_px: TEXT_FONT_PX,
};

const ABSTRACT_PALETTE: Palette = Palette {
    background: [18, 20, 34],
    text: [210, 210, 240],
    outline: [50, 50, 50],
    font_px: ABSTRACT_FONT_PX,
};

pub struct PlaceholderRenderer {
    width: u32,
    height: u32,
    font: Option<Font>,
}

impl PlaceholderRenderer {
    /// Renderer with best-effort system font discovery.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_font(width, height, discover_font())
    }

    pub fn with_font(width: u32, height: u32, font: Option<Font>) -> Self {
        if font.is_none() {
            warn!("[PLACEHOLDER] No usable font found; text will be drawn as bars");
        }
        Self {
            width,
            height,
            font,
        }
    }

    /// Placeholder for a timeline segment. Instrumental segments get the
    /// instrumental label rather than their internal text.
    pub fn render_segment(
        &self,
        segment: &Segment,
        path: &Path,
        abstract_style: bool,
    ) -> Result<PathBuf, PlaceholderError> {
        let text = if segment.is_instrumental() {
            INSTRUMENTAL_LABEL
        } else {
            segment.text.as_str()
        };
        if abstract_style {
            self.render_abstract(text, path)
        } else {
            self.render_text(text, path)
        }
    }

    /// Outlined text on a black canvas.
    pub fn render_text(&self, text: &str, path: &Path) -> Result<PathBuf, PlaceholderError> {
        let pixmap = self.blank(TEXT_PALETTE.background)?;
        self.finish(pixmap, text, TEXT_PALETTE, path)
    }

    /// Seeded lines and circles behind the text.
    pub fn render_abstract(&self, text: &str, path: &Path) -> Result<PathBuf, PlaceholderError> {
        let mut pixmap = self.blank(ABSTRACT_PALETTE.background)?;
        let mut rng = StdRng::seed_from_u64(seed_for(text));
        let (w, h) = (self.width as f32, self.height as f32);

        for _ in 0..14 {
            let mut pb = PathBuilder::new();
            pb.move_to(rng.gen_range(0.0..w), rng.gen_range(0.0..h));
            pb.line_to(rng.gen_range(0.0..w), rng.gen_range(0.0..h));
            if let Some(line) = pb.finish() {
                let paint = muted_paint(&mut rng, 150);
                let stroke = Stroke {
                    width: rng.gen_range(2.0..7.0),
                    ..Stroke::default()
                };
                pixmap.stroke_path(&line, &paint, &stroke, Transform::identity(), None);
            }
        }

        let max_radius = (w.min(h) / 4.0).max(2.0);
        for _ in 0..9 {
            let circle = PathBuilder::from_circle(
                rng.gen_range(0.0..w),
                rng.gen_range(0.0..h),
                rng.gen_range(1.0..max_radius),
            );
            if let Some(circle) = circle {
                let paint = muted_paint(&mut rng, 170);
                let stroke = Stroke {
                    width: rng.gen_range(2.0..5.0),
                    ..Stroke::default()
                };
                pixmap.stroke_path(&circle, &paint, &stroke, Transform::identity(), None);
            }
        }

        self.finish(pixmap, text, ABSTRACT_PALETTE, path)
    }

    fn blank(&self, rgb: [u8; 3]) -> Result<Pixmap, PlaceholderError> {
        let mut pixmap =
            Pixmap::new(self.width, self.height).ok_or(PlaceholderError::Canvas(self.width, self.height))?;
        pixmap.fill(Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255));
        Ok(pixmap)
    }

    fn finish(
        &self,
        pixmap: Pixmap,
        text: &str,
        palette: Palette,
        path: &Path,
    ) -> Result<PathBuf, PlaceholderError> {
        // The canvas is fully opaque, so premultiplied RGBA equals straight RGBA.
        let rgba = pixmap.data();
        let mut canvas = RgbImage::new(self.width, self.height);
        for (dst, src) in canvas.pixels_mut().zip(rgba.chunks_exact(4)) {
            dst.0 = [src[0], src[1], src[2]];
        }

        let lines = wrap_text(&display_text(text), WRAP_WIDTH);
        match &self.font {
            Some(font) => draw_outlined_block(&mut canvas, font, &lines, palette),
            None => draw_word_bars(&mut canvas, &lines, palette),
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        canvas.save_with_format(path, ImageFormat::Png)?;
        info!("[PLACEHOLDER] 🖼️ Rendered {:?}", path);
        Ok(path.to_path_buf())
    }
}

/// Try the override variable, the user font directory, then common
/// system locations.
pub fn discover_font() -> Option<Font> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(custom) = std::env::var(FONT_ENV_VAR) {
        candidates.push(PathBuf::from(custom));
    }
    if let Some(user_fonts) = dirs::font_dir() {
        candidates.push(user_fonts.join("DejaVuSans.ttf"));
    }
    candidates.extend(SYSTEM_FONTS.iter().map(PathBuf::from));

    candidates.iter().find_map(|path| load_font(path))
}

pub fn load_font(path: &Path) -> Option<Font> {
    let bytes = fs::read(path).ok()?;
    match Font::from_bytes(bytes, FontSettings::default()) {
        Ok(font) => {
            debug!("[PLACEHOLDER] Using font {:?}", path);
            Some(font)
        }
        Err(e) => {
            warn!("[PLACEHOLDER] Could not parse font {:?}: {}", path, e);
            None
        }
    }
}

fn seed_for(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn muted_paint(rng: &mut StdRng, alpha: u8) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(
        rng.gen_range(60..200),
        rng.gen_range(60..200),
        rng.gen_range(90..230),
        alpha,
    );
    paint.anti_alias = true;
    paint
}

fn display_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_DISPLAY_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_DISPLAY_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

const OUTLINE_OFFSETS: [(i32, i32); 4] = [(-2, -2), (2, -2), (-2, 2), (2, 2)];

fn draw_outlined_block(canvas: &mut RgbImage, font: &Font, lines: &[String], palette: Palette) {
    let px = palette.font_px;
    let (ascent, line_height) = match font.horizontal_line_metrics(px) {
        Some(m) => (m.ascent, m.new_line_size),
        None => (px * 0.8, px * 1.2),
    };
    let block_height = line_height * lines.len() as f32;
    let top = (canvas.height() as f32 - block_height) / 2.0;

    for (i, line) in lines.iter().enumerate() {
        let line_width: f32 = line.chars().map(|c| font.metrics(c, px).advance_width).sum();
        let x = (canvas.width() as f32 - line_width) / 2.0;
        let baseline = top + i as f32 * line_height + ascent;

        for (dx, dy) in OUTLINE_OFFSETS {
            draw_line(canvas, font, line, x + dx as f32, baseline + dy as f32, px, palette.outline);
        }
        draw_line(canvas, font, line, x, baseline, px, palette.text);
    }
}

fn draw_line(canvas: &mut RgbImage, font: &Font, line: &str, x: f32, baseline: f32, px: f32, color: [u8; 3]) {
    let mut pen = x;
    for c in line.chars() {
        let (metrics, bitmap) = font.rasterize(c, px);
        let gx = (pen + metrics.xmin as f32).round() as i64;
        let gy = (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i64;
        for row in 0..metrics.height {
            for col in 0..metrics.width {
                let coverage = bitmap[row * metrics.width + col];
                blend(canvas, gx + col as i64, gy + row as i64, color, coverage);
            }
        }
        pen += metrics.advance_width;
    }
}

/// Font-less fallback: one solid bar per word, laid out like the text.
fn draw_word_bars(canvas: &mut RgbImage, lines: &[String], palette: Palette) {
    let char_w = (palette.font_px * 0.55).round() as i64;
    let bar_h = (palette.font_px * 0.6).round() as i64;
    let line_height = (palette.font_px * 1.3).round() as i64;
    let block = line_height * lines.len() as i64;
    let top = (i64::from(canvas.height()) - block) / 2;

    for (i, line) in lines.iter().enumerate() {
        let width = line.chars().count() as i64 * char_w;
        let mut x = (i64::from(canvas.width()) - width) / 2;
        let y = top + i as i64 * line_height;
        for word in line.split(' ') {
            let w = word.chars().count() as i64 * char_w;
            for (dx, dy) in OUTLINE_OFFSETS {
                fill_rect(canvas, x + i64::from(dx), y + i64::from(dy), w, bar_h, palette.outline);
            }
            fill_rect(canvas, x, y, w, bar_h, palette.text);
            x += w + char_w;
        }
    }
}

fn fill_rect(canvas: &mut RgbImage, x: i64, y: i64, w: i64, h: i64, color: [u8; 3]) {
    for yy in y..y + h {
        for xx in x..x + w {
            blend(canvas, xx, yy, color, 255);
        }
    }
}

fn blend(canvas: &mut RgbImage, x: i64, y: i64, color: [u8; 3], coverage: u8) {
    if coverage == 0 || x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    let a = u32::from(coverage);
    let px = canvas.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in px.0.iter_mut().zip(color) {
        *dst = ((u32::from(src) * a + u32::from(*dst) * (255 - a)) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog again and again", 30);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 30));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog again and again");
    }

    #[test]
    fn test_wrap_text_splits_long_words() {
        let lines = wrap_text(&"a".repeat(65), 30);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].len(), 5);
    }

    #[test]
    fn test_display_text_truncates() {
        let long = "word ".repeat(100);
        let shown = display_text(&long);
        assert_eq!(shown.chars().count(), MAX_DISPLAY_CHARS);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_seed_is_stable() {
        assert_eq!(seed_for("same"), seed_for("same"));
        assert_ne!(seed_for("same"), seed_for("other"));
    }

    #[test]
    fn test_zero_canvas_is_an_error() {
        let renderer = PlaceholderRenderer::with_font(0, 0, None);
        let path = std::env::temp_dir().join("lyric_director_zero_canvas.png");
        assert!(matches!(
            renderer.render_text("x", &path),
            Err(PlaceholderError::Canvas(0, 0))
        ));
    }
}
