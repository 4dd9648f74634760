//! Surface that records draw calls instead of producing pixels.

use super::{Canvas, Point, Rect, Rgba, StrokeStyle, Surface};
use crate::VideoFrame;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DrawOp {
    FillRect {
        rect: Rect,
        color: Rgba,
    },
    Stroke {
        points: Vec<Point>,
        closed: bool,
        style: StrokeStyle,
    },
    FillCircle {
        center: Point,
        radius: f32,
        color: Rgba,
    },
    Frame {
        source: Rect,
        target: Rect,
    },
}

#[derive(Debug)]
pub(crate) struct RecordingSurface {
    display: (f32, f32),
    pixel_ratio: f32,
    size: (u32, u32),
    attached: bool,
    resizes: usize,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub(crate) fn new(width: f32, height: f32, pixel_ratio: f32) -> Self {
        Self {
            display: (width, height),
            pixel_ratio,
            size: (0, 0),
            attached: true,
            resizes: 0,
            ops: Vec::new(),
        }
    }

    pub(crate) fn detached() -> Self {
        Self {
            attached: false,
            ..Self::new(0.0, 0.0, 1.0)
        }
    }

    pub(crate) fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub(crate) fn clear(&mut self) {
        self.ops.clear();
    }

    pub(crate) fn resizes(&self) -> usize {
        self.resizes
    }
}

impl Canvas for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, style: &StrokeStyle) {
        self.ops.push(DrawOp::Stroke {
            points: points.to_vec(),
            closed,
            style: *style,
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba) {
        self.ops.push(DrawOp::FillCircle {
            center,
            radius,
            color,
        });
    }

    fn draw_frame(&mut self, _frame: &VideoFrame, source: Rect, target: Rect) {
        self.ops.push(DrawOp::Frame { source, target });
    }
}

impl Surface for RecordingSurface {
    fn display_box(&self) -> (f32, f32) {
        self.display
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.resizes += 1;
        self.size = (width, height);
    }

    fn is_attached(&self) -> bool {
        self.attached
    }
}
