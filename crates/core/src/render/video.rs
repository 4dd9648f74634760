use super::{Canvas, Rect, Rgba};
use crate::VideoFrame;

/// Region of a `src_width × src_height` picture that fills a
/// `dst_width × dst_height` target at the same aspect ratio, centered. The
/// excess of the wider side is cropped away.
///
/// This is a cover crop on either axis, not only a height crop: a picture
/// wider than the target loses columns, a taller one loses rows.
pub fn cover_crop(src_width: f32, src_height: f32, dst_width: f32, dst_height: f32) -> Rect {
    if src_width <= 0.0 || src_height <= 0.0 || dst_width <= 0.0 || dst_height <= 0.0 {
        return Rect::new(0.0, 0.0, src_width.max(0.0), src_height.max(0.0));
    }

    let src_aspect = src_width / src_height;
    let dst_aspect = dst_width / dst_height;

    if src_aspect > dst_aspect {
        let width = src_height * dst_aspect;
        Rect::new((src_width - width) / 2.0, 0.0, width, src_height)
    } else {
        let height = src_width / dst_aspect;
        Rect::new(0.0, (src_height - height) / 2.0, src_width, height)
    }
}

/// Fills the canvas with `frame` and darkens it with `overlay` so the
/// visualisation on top stays readable.
pub fn composite<C: Canvas + ?Sized>(canvas: &mut C, frame: &VideoFrame, overlay: Rgba) {
    let (width, height) = canvas.size();
    let (w, h) = (width as f32, height as f32);
    let source = cover_crop(frame.width() as f32, frame.height() as f32, w, h);
    let target = Rect::new(0.0, 0.0, w, h);

    canvas.draw_frame(frame, source, target);
    canvas.fill_rect(target, overlay);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_source_is_cropped_horizontally() {
        let crop = cover_crop(1920.0, 1080.0, 1000.0, 1000.0);
        assert_eq!(crop, Rect::new(420.0, 0.0, 1080.0, 1080.0));
    }

    #[test]
    fn tall_source_is_cropped_vertically() {
        let crop = cover_crop(1080.0, 1920.0, 1600.0, 900.0);
        assert_eq!(crop.x, 0.0);
        assert_eq!(crop.width, 1080.0);
        assert!((crop.height - 607.5).abs() < 1e-3);
        assert!((crop.y - (1920.0 - 607.5) / 2.0).abs() < 1e-3);
    }

    #[test]
    fn matching_aspect_uses_the_whole_frame() {
        let crop = cover_crop(1280.0, 720.0, 640.0, 360.0);
        assert_eq!((crop.x, crop.width), (0.0, 1280.0));
        assert!(crop.y.abs() < 1e-3);
        assert!((crop.height - 720.0).abs() < 1e-3);
    }
}
