//! The four visual modes plus the monitor's plain trace.
//!
//! Every function draws from byte snapshots: time-domain values center on
//! 128, frequency values span 0..=255. `B` below is the snapshot length.

use std::f32::consts::TAU;

use super::{Canvas, GradientStop, Glow, Paint, PaletteColors, Point, Rect, Rgba, StrokeStyle};

const LINE_WIDTH: f32 = 2.0;
const SCOPE_LINE_WIDTH: f32 = 1.5;
const GLOW_BLUR: f32 = 10.0;
const BAR_WIDTH_FACTOR: f32 = 2.5;
const BAR_HEIGHT_FACTOR: f32 = 0.8;
const BAR_GAP: f32 = 1.0;
const CAP_OFFSET: f32 = 4.0;
const CAP_HEIGHT: f32 = 2.0;
const RADIAL_REACH: f32 = 120.0;
const PARTICLE_ORBIT_DIVISOR: f32 = 3.5;
const PARTICLE_WOBBLE: f32 = 30.0;
const PARTICLE_SIZE: f32 = 80.0;
const PARTICLE_MIN_RADIUS: f32 = 2.0;

/// Polyline of a time-domain snapshot across the full width.
/// `y = H/2 + (t/128 - 1) * s * H/2`.
pub fn waveform_points(
    time: &[u8],
    width: f32,
    height: f32,
    sensitivity: f32,
    out: &mut Vec<Point>,
) {
    out.clear();
    if time.is_empty() {
        return;
    }

    let slice_width = width / time.len() as f32;
    let half = height / 2.0;
    out.extend(time.iter().enumerate().map(|(i, &sample)| {
        let deviation = f32::from(sample) / 128.0 - 1.0;
        Point::new(i as f32 * slice_width, half + deviation * sensitivity * half)
    }));
}

/// Oscillographic line with a transparent→primary→transparent gradient and
/// glow.
pub fn draw_waveform<C: Canvas + ?Sized>(
    canvas: &mut C,
    time: &[u8],
    sensitivity: f32,
    colors: &PaletteColors,
    points: &mut Vec<Point>,
) {
    let (w, h) = dimensions(canvas);
    waveform_points(time, w, h, sensitivity, points);

    let style = StrokeStyle {
        paint: Paint::HorizontalGradient {
            from_x: 0.0,
            to_x: w,
            stops: [
                GradientStop {
                    offset: 0.0,
                    color: colors.color(0.0),
                },
                GradientStop {
                    offset: 0.5,
                    color: colors.color(1.0),
                },
                GradientStop {
                    offset: 1.0,
                    color: colors.color(0.0),
                },
            ],
        },
        width: LINE_WIDTH,
        glow: Some(Glow {
            color: colors.glow,
            blur: GLOW_BLUR,
        }),
    };
    canvas.stroke_path(points, false, &style);
}

/// The monitor's trace: same geometry as the waveform at unit gain, solid
/// color, no glow.
pub fn draw_scope<C: Canvas + ?Sized>(
    canvas: &mut C,
    time: &[u8],
    color: Rgba,
    points: &mut Vec<Point>,
) {
    let (w, h) = dimensions(canvas);
    waveform_points(time, w, h, 1.0, points);

    let style = StrokeStyle {
        paint: Paint::Solid(color),
        width: SCOPE_LINE_WIDTH,
        glow: None,
    };
    canvas.stroke_path(points, false, &style);
}

/// Bottom-anchored spectrum bars, each with a thin cap above it.
pub fn draw_bars<C: Canvas + ?Sized>(
    canvas: &mut C,
    frequency: &[u8],
    sensitivity: f32,
    colors: &PaletteColors,
) {
    if frequency.is_empty() {
        return;
    }

    let (w, h) = dimensions(canvas);
    let bar_width = (w / frequency.len() as f32) * BAR_WIDTH_FACTOR;
    let mut x = 0.0;

    for &value in frequency {
        let magnitude = f32::from(value) / 255.0;
        let bar_height = magnitude * h * BAR_HEIGHT_FACTOR * sensitivity;
        let top = h - bar_height;

        canvas.fill_rect(
            Rect::new(x, top, bar_width, bar_height),
            colors.color(0.2 + 0.8 * magnitude),
        );
        canvas.fill_rect(
            Rect::new(x, top - CAP_OFFSET, bar_width, CAP_HEIGHT),
            colors.secondary_color(0.9),
        );

        x += bar_width + BAR_GAP;
    }
}

/// Closed ring around the center whose radius follows the spectrum.
pub fn draw_radial<C: Canvas + ?Sized>(
    canvas: &mut C,
    frequency: &[u8],
    sensitivity: f32,
    colors: &PaletteColors,
    points: &mut Vec<Point>,
) {
    points.clear();
    if frequency.is_empty() {
        return;
    }

    let (w, h) = dimensions(canvas);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let radius = w.min(h) / 4.0;
    let bins = frequency.len() as f32;

    points.extend(frequency.iter().enumerate().map(|(i, &value)| {
        let angle = i as f32 / bins * TAU;
        let reach = radius + f32::from(value) / 255.0 * RADIAL_REACH * sensitivity;
        Point::new(cx + reach * angle.cos(), cy + reach * angle.sin())
    }));

    let style = StrokeStyle {
        paint: Paint::Solid(colors.primary),
        width: LINE_WIDTH,
        glow: Some(Glow {
            color: colors.glow,
            blur: GLOW_BLUR,
        }),
    };
    canvas.stroke_path(points, true, &style);
}

/// Discs on a ring, sampled every `floor(B / count)`-th bin. Distance from
/// the center follows the waveform, size and opacity follow the spectrum.
pub fn draw_particles<C: Canvas + ?Sized>(
    canvas: &mut C,
    time: &[u8],
    frequency: &[u8],
    sensitivity: f32,
    colors: &PaletteColors,
    count: usize,
) {
    let bins = time.len().min(frequency.len());
    if bins == 0 || count == 0 {
        return;
    }

    let (w, h) = dimensions(canvas);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let step = (bins / count).max(1);
    let orbit = h / PARTICLE_ORBIT_DIVISOR;

    for i in 0..count {
        let bin = i * step;
        if bin >= bins {
            break;
        }

        let magnitude = f32::from(frequency[bin]) / 255.0;
        let angle = i as f32 / count as f32 * TAU;
        let distance = orbit + f32::from(time[bin]) / 255.0 * PARTICLE_WOBBLE;
        let radius = (magnitude * PARTICLE_SIZE * sensitivity / 2.0).max(PARTICLE_MIN_RADIUS);
        let alpha = 0.2 + 0.8 * magnitude;
        let color = if i % 2 == 0 {
            colors.color(alpha)
        } else {
            colors.secondary_color(alpha)
        };

        canvas.fill_circle(
            Point::new(cx + distance * angle.cos(), cy + distance * angle.sin()),
            radius,
            color,
        );
    }
}

fn dimensions<C: Canvas + ?Sized>(canvas: &C) -> (f32, f32) {
    let (w, h) = canvas.size();
    (w as f32, h as f32)
}
