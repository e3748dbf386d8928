use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};

use crate::pose::{BodyPart, POSE_PAIRS, Pose};
use crate::render::spread_color;

/// Bone width in pixels.
pub const BONE_THICKNESS: i32 = 3;

/// Radius of the filled joint markers.
pub const JOINT_RADIUS: i32 = 5;

const LABEL_SCALE: f32 = 14.0;
const LABEL_OFFSET_Y: i32 = 10;

/// Keypoints further than this outside the frame get no marker or label,
/// and bones are clipped to the frame grown by this much.
const CANVAS_MARGIN: f32 = 64.0;

/// Colour used for a part's joint marker, label, and bones starting at it.
pub fn part_color(part: BodyPart) -> Rgb<u8> {
    spread_color(part.index() as u64)
}

/// Draws the fixed bone topology over a frame.
///
/// A bone is drawn only when both of its endpoints are present in the pose;
/// missing parts are skipped silently.
#[derive(Clone, Default)]
pub struct SkeletonRenderer {
    font: Option<FontArc>,
    draw_labels: bool,
}

impl SkeletonRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables part labels drawn with `font`.
    pub fn with_labels(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self.draw_labels = true;
        self
    }

    /// Annotated copy of `frame`.
    pub fn render(&self, frame: &RgbImage, pose: &Pose) -> RgbImage {
        let mut out = frame.clone();
        self.render_mut(&mut out, pose);
        out
    }

    pub fn render_mut(&self, frame: &mut RgbImage, pose: &Pose) {
        let bounds = canvas_bounds(frame);
        if let (true, Some(font)) = (self.draw_labels, &self.font) {
            for kp in pose.present().filter(|kp| on_canvas(bounds, (kp.x, kp.y))) {
                let (x, y) = kp.pixel();
                draw_text_mut(
                    frame,
                    part_color(kp.part),
                    x,
                    y.saturating_sub(LABEL_OFFSET_Y),
                    PxScale::from(LABEL_SCALE),
                    font,
                    kp.part.label(),
                );
            }
        }

        for (from, to) in POSE_PAIRS {
            let (Some(a), Some(b)) = (pose.get(from), pose.get(to)) else {
                continue;
            };
            if let Some((start, end)) = clip_segment(bounds, (a.x, a.y), (b.x, b.y)) {
                draw_thick_line_mut(frame, start, end, BONE_THICKNESS, part_color(from));
            }
            for kp in [a, b] {
                if on_canvas(bounds, (kp.x, kp.y)) {
                    draw_filled_circle_mut(frame, kp.pixel(), JOINT_RADIUS, part_color(kp.part));
                }
            }
        }
    }
}

fn canvas_bounds(frame: &RgbImage) -> [f32; 4] {
    [
        -CANVAS_MARGIN,
        -CANVAS_MARGIN,
        frame.width() as f32 + CANVAS_MARGIN,
        frame.height() as f32 + CANVAS_MARGIN,
    ]
}

fn on_canvas([x_min, y_min, x_max, y_max]: [f32; 4], (x, y): (f32, f32)) -> bool {
    (x_min..=x_max).contains(&x) && (y_min..=y_max).contains(&y)
}

/// Liang-Barsky clip of a segment against `[x_min, y_min, x_max, y_max]`.
/// `None` when nothing of the segment is left.
fn clip_segment(
    [x_min, y_min, x_max, y_max]: [f32; 4],
    start: (f32, f32),
    end: (f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if ![start.0, start.1, end.0, end.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    if !(dx.is_finite() && dy.is_finite()) {
        return None;
    }

    let mut t_enter = 0.0f32;
    let mut t_exit = 1.0f32;
    for (p, q) in [
        (-dx, start.0 - x_min),
        (dx, x_max - start.0),
        (-dy, start.1 - y_min),
        (dy, y_max - start.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t_enter = t_enter.max(r);
        } else {
            t_exit = t_exit.min(r);
        }
        if t_enter > t_exit {
            return None;
        }
    }

    Some((
        (start.0 + t_enter * dx, start.1 + t_enter * dy),
        (start.0 + t_exit * dx, start.1 + t_exit * dy),
    ))
}

/// Strokes a segment `thickness` pixels wide as parallel one-pixel lines.
fn draw_thick_line_mut(
    frame: &mut RgbImage,
    start: (f32, f32),
    end: (f32, f32),
    thickness: i32,
    color: Rgb<u8>,
) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if len > 0.0 {
        (-dy / len, dx / len)
    } else {
        (0.0, 0.0)
    };
    let half = thickness / 2;
    for k in -half..=half {
        let off = k as f32;
        draw_line_segment_mut(
            frame,
            (start.0 + nx * off, start.1 + ny * off),
            (end.0 + nx * off, end.1 + ny * off),
            color,
        );
    }
}
