use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect as PixelRect;

use crate::render::spread_color;
use crate::tracker::TrackOutput;

const ID_SCALE: f32 = 18.0;

pub fn track_color(track_id: u64) -> Rgb<u8> {
    // offset so track 1 does not share the nose colour
    spread_color(track_id.wrapping_add(7))
}

/// Draws each track's box, and its identifier above the box when a font
/// is available. Boxes are clipped to the frame; boxes entirely outside it
/// are skipped.
pub fn draw_tracks_mut(frame: &mut RgbImage, tracks: &[TrackOutput], font: Option<&FontArc>) {
    let (width, height) = (frame.width() as f32, frame.height() as f32);
    for track in tracks {
        let [x1, y1, x2, y2] = track.bbox.to_tlbr();
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            continue;
        }
        if x2 < 0.0 || y2 < 0.0 || x1 >= width || y1 >= height {
            continue;
        }
        // one pixel past the frame so clipped edges stay invisible
        let (x1, x2) = (x1.clamp(-1.0, width), x2.clamp(-1.0, width));
        let (y1, y2) = (y1.clamp(-1.0, height), y2.clamp(-1.0, height));

        let color = track_color(track.track_id);
        let (x, y) = (x1.round() as i32, y1.round() as i32);
        let rect_width = (x2 - x1).round().max(1.0) as u32;
        let rect_height = (y2 - y1).round().max(1.0) as u32;
        draw_hollow_rect_mut(frame, PixelRect::at(x, y).of_size(rect_width, rect_height), color);

        if let Some(font) = font {
            let label = format!("#{}", track.track_id);
            draw_text_mut(
                frame,
                color,
                x,
                y.saturating_sub(ID_SCALE as i32),
                PxScale::from(ID_SCALE),
                font,
                &label,
            );
        }
    }
}
