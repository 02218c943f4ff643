//! Sprite sheets
//!
//! A `name.dds` atlas with a sibling `name.sprite` XML file describing the
//! frame cells as UV quads:
//!
//! ```xml
//! <Cell topLeft="0,0" topRight="0.25,0" bottomLeft="0,0.5" bottomRight="0.25,0.5"/>
//! ```
//!
//! Exporters often omit `topLeft` on the first cell; it is derived from
//! `bottomLeft.x` and `topRight.y`.

use dds_shared::JobError;
use image::{imageops, RgbaImage};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};

pub const SPRITE_EXTENSION: &str = "sprite";

/// Share of black or transparent pixels above which a trailing frame is dropped.
const BLANK_RATIO: f32 = 0.95;
const BLANK_CHANNEL_MAX: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteCell {
    pub top_left: (f32, f32),
    pub top_right: (f32, f32),
    pub bottom_left: (f32, f32),
    pub bottom_right: (f32, f32),
}

impl SpriteCell {
    /// Pixel rectangle `(x, y, width, height)` inside a `width x height`
    /// texture, clamped to its bounds. `None` when the area is empty.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let to_px = |uv: f32, size: u32| ((uv.clamp(0.0, 1.0) * size as f32) as u32).min(size);
        let x1 = to_px(self.top_left.0, width);
        let y1 = to_px(self.top_left.1, height);
        let x2 = to_px(self.bottom_right.0, width);
        let y2 = to_px(self.bottom_right.1, height);

        let w = x2.saturating_sub(x1);
        let h = y2.saturating_sub(y1);
        if w == 0 || h == 0 {
            None
        } else {
            Some((x1, y1, w, h))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpriteSheet {
    pub cells: Vec<SpriteCell>,
}

impl SpriteSheet {
    pub fn from_file(path: &Path) -> Result<Self, JobError> {
        let xml = std::fs::read_to_string(path).map_err(|e| JobError::io(path, e))?;
        Self::parse(&xml).map_err(|reason| JobError::SpriteSheet {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Reads every `Cell` element. Incomplete cells are ignored.
    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut cells = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    if e.name().as_ref().eq_ignore_ascii_case(b"cell") {
                        if let Some(cell) = parse_cell(e)? {
                            cells.push(cell);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "XML error at byte {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                }
            }
            buf.clear();
        }

        Ok(Self { cells })
    }

    /// Crops one frame per cell, skipping cells with no pixels.
    ///
    /// Fractional UVs round to cells that differ by a pixel, so every frame
    /// takes the size of the largest cell: the crop grows into the texture
    /// where it can and is padded with transparent pixels at the edge.
    pub fn extract_frames(&self, texture: &RgbaImage) -> Vec<RgbaImage> {
        let (width, height) = texture.dimensions();
        let rects: Vec<_> = self
            .cells
            .iter()
            .filter_map(|cell| cell.pixel_rect(width, height))
            .collect();
        let frame_w = rects.iter().map(|r| r.2).max().unwrap_or(0);
        let frame_h = rects.iter().map(|r| r.3).max().unwrap_or(0);

        rects
            .into_iter()
            .map(|(x, y, _, _)| {
                let w = frame_w.min(width - x);
                let h = frame_h.min(height - y);
                let crop = imageops::crop_imm(texture, x, y, w, h).to_image();
                if crop.dimensions() == (frame_w, frame_h) {
                    crop
                } else {
                    let mut frame = RgbaImage::new(frame_w, frame_h);
                    imageops::replace(&mut frame, &crop, 0, 0);
                    frame
                }
            })
            .collect()
    }
}

fn parse_cell(element: &BytesStart<'_>) -> Result<Option<SpriteCell>, String> {
    let mut top_left = None;
    let mut top_right = None;
    let mut bottom_left = None;
    let mut bottom_right = None;

    for attr in element.attributes().flatten() {
        let slot = match attr.key.as_ref() {
            b"topLeft" => &mut top_left,
            b"topRight" => &mut top_right,
            b"bottomLeft" => &mut bottom_left,
            b"bottomRight" => &mut bottom_right,
            _ => continue,
        };
        let value = std::str::from_utf8(&attr.value)
            .map_err(|_| "attribute value is not UTF-8".to_string())?;
        *slot = Some(parse_point(value)?);
    }

    if top_left.is_none() {
        if let (Some(tr), Some(bl)) = (top_right, bottom_left) {
            top_left = Some((bl.0, tr.1));
        }
    }

    Ok(match (top_left, top_right, bottom_left, bottom_right) {
        (Some(top_left), Some(top_right), Some(bottom_left), Some(bottom_right)) => {
            Some(SpriteCell {
                top_left,
                top_right,
                bottom_left,
                bottom_right,
            })
        }
        _ => None,
    })
}

fn parse_point(value: &str) -> Result<(f32, f32), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("invalid coordinate pair: {:?}", value))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f32>()
            .map_err(|_| format!("invalid coordinate: {:?}", value))
    };
    Ok((parse(x)?, parse(y)?))
}

/// Sibling `.sprite` file of a texture, when present.
pub fn sprite_sidecar(texture: &Path) -> Option<PathBuf> {
    let sidecar = texture.with_extension(SPRITE_EXTENSION);
    sidecar.is_file().then_some(sidecar)
}

/// True when nearly every pixel is transparent (alpha) or black (rgb).
pub fn is_mostly_blank(frame: &RgbaImage) -> bool {
    let total = frame.width() as usize * frame.height() as usize;
    if total == 0 {
        return true;
    }
    let blank = frame
        .pixels()
        .filter(|p| {
            let [r, g, b, a] = p.0;
            a < BLANK_CHANNEL_MAX
                || (r < BLANK_CHANNEL_MAX && g < BLANK_CHANNEL_MAX && b < BLANK_CHANNEL_MAX)
        })
        .count();
    blank as f32 / total as f32 >= BLANK_RATIO
}

/// Drops a blank padding frame at the end of an atlas. A lone frame is kept.
pub fn trim_trailing_blank(frames: &mut Vec<RgbaImage>) -> bool {
    if frames.len() > 1 && frames.last().is_some_and(is_mostly_blank) {
        frames.pop();
        true
    } else {
        false
    }
}
