//! Detection input and track/detection assignment.

use ndarray::Array2;
use tracing::{debug, warn};

use crate::tracker::rect::Rect;

/// Costs are solved as whole numbers of `1 / COST_GRID` steps, fine enough
/// to separate neighbouring `f32` values around 0.5.
const COST_GRID: f64 = 1e7;

/// Integers above this are not exact in `f64`.
const EXACT_F64_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Frame-local detection handed to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box, built from corners (x1, y1, x2, y2)
    pub bbox: Rect,
    /// Confidence of the keypoint(s) the box was derived from
    pub score: f32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            bbox: Rect::from_tlbr(x1, y1, x2, y2),
            score,
        }
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self { bbox, score }
    }
}

/// `1 - IoU` between every track box (rows) and detection box (columns).
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    Array2::from_shape_fn((track_boxes.len(), det_boxes.len()), |(i, j)| {
        1.0 - track_boxes[i].iou(&det_boxes[j])
    })
}

/// Cells whose cost is finite and no greater than `gate`.
pub fn gate_costs(cost_matrix: &Array2<f32>, gate: f32) -> Array2<bool> {
    cost_matrix.mapv(|c| c.is_finite() && c <= gate)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    /// `(track index, detection index)`, ascending by track index
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost bipartite matching restricted to cells with cost `<= gate`.
///
/// Gated-out cells never appear in `matches`. The matching with the most
/// admissible pairs wins, then the lowest total cost; only exactly equal
/// totals fall back to index order, where the lower track index receives
/// the lower detection index. Zero rows or zero columns short-circuit to
/// "no matches".
pub fn linear_assignment(cost_matrix: &Array2<f32>, gate: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let admissible = gate_costs(cost_matrix, gate);
    let size = num_rows.max(num_cols);
    let steps = cost_matrix.mapv(|c| (f64::from(c) * COST_GRID).round());
    let max_steps = steps
        .iter()
        .zip(admissible.iter())
        .filter(|&(_, &ok)| ok)
        .fold(0.0f64, |acc, (&s, _)| acc.max(s.abs()));

    // Every cell is `steps * span + bias`. The bias of a whole matching
    // stays below `span`, so it only orders matchings of equal step total.
    let full_span = (num_rows * num_rows * num_cols) as f64;
    let inadmissible = |span: f64| (max_steps + 1.0) * span * (size as f64 + 1.0);
    let span = if inadmissible(full_span) * (size as f64 + 1.0) < EXACT_F64_LIMIT {
        full_span
    } else {
        debug!(num_rows, num_cols, "assignment too large for index tie-break");
        1.0
    };

    let mut padded = Array2::<f64>::from_elem((size, size), inadmissible(span));
    for ((i, j), &ok) in admissible.indexed_iter() {
        if ok {
            // rearrangement: a bias of j * (rows - i) pairs equal-cost
            // rows and columns in ascending order
            let bias = if span > 1.0 {
                (j * (num_rows - i)) as f64
            } else {
                0.0
            };
            padded[[i, j]] = steps[[i, j]] * span + bias;
        }
    }

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut detection_unmatched = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(num_rows) {
                if col < num_cols && admissible[[row, col]] {
                    matches.push((row, col));
                    detection_unmatched[col] = false;
                } else {
                    unmatched_tracks.push(row);
                }
            }
        }
        Err(err) => {
            warn!(?err, num_rows, num_cols, "assignment solver failed, treating frame as unmatched");
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections = detection_unmatched
        .iter()
        .enumerate()
        .filter_map(|(j, &u)| u.then_some(j))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
