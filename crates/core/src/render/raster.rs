//! CPU rasteriser backed by an [`image::RgbaImage`].

use std::path::Path;

use image::{Rgba as Pixel, RgbaImage};

use super::{Canvas, Point, Rect, Rgba, StrokeStyle, Surface};
use crate::{Result, VideoFrame};

/// Share of the glow color's alpha applied at the stroke's edge.
const GLOW_STRENGTH: f32 = 0.35;

/// Offscreen surface that paints into an RGBA image with source-over
/// blending.
#[derive(Debug, Clone)]
pub struct ImageSurface {
    image: RgbaImage,
    display: (f32, f32),
    pixel_ratio: f32,
}

impl ImageSurface {
    /// A surface laid out at `width × height` layout units. The backing image
    /// is sized on the first resize.
    pub fn new(width: f32, height: f32, pixel_ratio: f32) -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            display: (width, height),
            pixel_ratio,
        }
    }

    /// Moves the surface to a new layout box, as a host window resize would.
    pub fn set_display_box(&mut self, width: f32, height: f32) {
        self.display = (width, height);
    }

    pub fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        self.pixel_ratio = pixel_ratio;
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x < self.image.width() && y < self.image.height() {
            Some(self.image.get_pixel(x, y).0)
        } else {
            None
        }
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgba, coverage: f32) {
        let (width, height) = self.image.dimensions();
        if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
            return;
        }

        let alpha = (color.a * coverage).clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }

        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        let [dr, dg, db, da] = dst.0;
        let dst_alpha = f32::from(da) / 255.0;
        let out_alpha = alpha + dst_alpha * (1.0 - alpha);

        let channel = |src: u8, dst: u8| {
            if out_alpha <= 0.0 {
                return 0;
            }
            let value = (f32::from(src) * alpha + f32::from(dst) * dst_alpha * (1.0 - alpha))
                / out_alpha;
            value.round().clamp(0.0, 255.0) as u8
        };

        *dst = Pixel([
            channel(color.r, dr),
            channel(color.g, dg),
            channel(color.b, db),
            (out_alpha * 255.0).round() as u8,
        ]);
    }

    fn stroke_segment(&mut self, a: Point, b: Point, half_width: f32, style: &StrokeStyle) {
        let reach = half_width + style.glow.map(|glow| glow.blur).unwrap_or(0.0);
        let (min_x, max_x) = (a.x.min(b.x) - reach, a.x.max(b.x) + reach);
        let (min_y, max_y) = (a.y.min(b.y) - reach, a.y.max(b.y) + reach);

        for y in min_y.floor() as i64..=max_y.ceil() as i64 {
            for x in min_x.floor() as i64..=max_x.ceil() as i64 {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let distance = distance_to_segment(center, a, b);

                if let Some(glow) = style.glow {
                    if distance > half_width && distance <= reach {
                        let falloff = 1.0 - (distance - half_width) / glow.blur.max(f32::EPSILON);
                        self.blend(x, y, glow.color, falloff * GLOW_STRENGTH);
                    }
                }

                let coverage = (half_width - distance + 0.5).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let color = style.paint.color_at(center.x);
                    self.blend(x, y, color, coverage);
                }
            }
        }
    }
}

impl Canvas for ImageSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let (width, height) = self.size();
        let x0 = rect.x.max(0.0).round() as i64;
        let y0 = rect.y.max(0.0).round() as i64;
        let x1 = rect.right().min(width as f32).round() as i64;
        let y1 = rect.bottom().min(height as f32).round() as i64;

        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, color, 1.0);
            }
        }
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, style: &StrokeStyle) {
        let half_width = style.width / 2.0;
        for pair in points.windows(2) {
            self.stroke_segment(pair[0], pair[1], half_width, style);
        }
        if closed && points.len() > 2 {
            self.stroke_segment(points[points.len() - 1], points[0], half_width, style);
        }
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }

        for y in (center.y - radius).floor() as i64..=(center.y + radius).ceil() as i64 {
            for x in (center.x - radius).floor() as i64..=(center.x + radius).ceil() as i64 {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                let coverage = (radius - (dx * dx + dy * dy).sqrt() + 0.5).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend(x, y, color, coverage);
                }
            }
        }
    }

    fn draw_frame(&mut self, frame: &VideoFrame, source: Rect, target: Rect) {
        if target.width <= 0.0 || target.height <= 0.0 {
            return;
        }

        let (width, height) = self.size();
        let x0 = target.x.max(0.0).floor() as u32;
        let y0 = target.y.max(0.0).floor() as u32;
        let x1 = (target.right().min(width as f32).ceil() as u32).min(width);
        let y1 = (target.bottom().min(height as f32).ceil() as u32).min(height);
        let scale_x = source.width / target.width;
        let scale_y = source.height / target.height;

        for y in y0..y1 {
            let sy = source.y + (y as f32 + 0.5 - target.y) * scale_y;
            let sy = sy.max(0.0) as u32;
            for x in x0..x1 {
                let sx = source.x + (x as f32 + 0.5 - target.x) * scale_x;
                let sx = sx.max(0.0) as u32;
                let [r, g, b, a] = frame.pixel(sx, sy);
                let color = Rgba::new(r, g, b, f32::from(a) / 255.0);
                self.blend(i64::from(x), i64::from(y), color, 1.0);
            }
        }
    }
}

impl Surface for ImageSurface {
    fn display_box(&self) -> (f32, f32) {
        self.display
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::new(width, height);
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq <= f32::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}
