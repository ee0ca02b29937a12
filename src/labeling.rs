//! Anatomical labels for detected markers, from their 2D layout in a view.

use crate::config::LabelingConfig;
use crate::models::{DetectionCandidate, DetectionMethod};
use crate::projection::CameraView;

/// Image half used by [`LabelRule::LowestInHalf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Declarative layout rule attached to a camera view.
///
/// `left` and `right` always refer to image sides, not to the subject's.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelRule {
    /// One marker near the horizontal centre, and one on each side below it
    /// at roughly the configured angle off vertical.
    FrontTriad {
        top: String,
        left: String,
        right: String,
    },
    /// Markers inside the central column, labelled top to bottom.
    MidlineColumn { labels: Vec<String> },
    /// Markers aligned at a fixed fraction of the image height, labelled left
    /// to right.
    HorizontalRow {
        height_fraction: f64,
        labels: Vec<String>,
    },
    /// The lowest marker in one image half.
    LowestInHalf { side: Side, label: String },
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    index: usize,
    x: f64,
    y: f64,
}

type Assignment = (usize, String);

pub struct MarkerLabeler {
    config: LabelingConfig,
}

impl MarkerLabeler {
    pub fn new(config: LabelingConfig) -> Self {
        Self { config }
    }

    /// Apply the rules of `view` to the marker candidates in `candidates`.
    /// Returns how many candidates received a label.
    pub fn label(
        &self,
        view: CameraView,
        shape: (u32, u32),
        candidates: &mut [DetectionCandidate],
    ) -> usize {
        let rules = &view.params().label_rules;
        if rules.is_empty() {
            return 0;
        }

        let markers: Vec<Marker> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.method == DetectionMethod::Marker)
            .map(|(index, c)| Marker {
                index,
                x: c.pixel_x,
                y: c.pixel_y,
            })
            .collect();

        let mut labelled = 0;
        for rule in rules {
            let assignments = self.apply_rule(rule, &markers, shape);
            if assignments.is_empty() {
                log::debug!("{view}: rule {rule:?} matched no markers");
            }
            for (index, label) in assignments {
                if assign(&mut candidates[index], &label) {
                    labelled += 1;
                }
            }
        }
        labelled
    }

    fn apply_rule(&self, rule: &LabelRule, markers: &[Marker], (w, h): (u32, u32)) -> Vec<Assignment> {
        let (w, h) = (w as f64, h as f64);
        match rule {
            LabelRule::MidlineColumn { labels } => self.midline_column(labels, markers, w),
            LabelRule::HorizontalRow {
                height_fraction,
                labels,
            } => self.horizontal_row(*height_fraction, labels, markers, h),
            LabelRule::FrontTriad { top, left, right } => {
                self.front_triad([top, left, right], markers, w, h)
            }
            LabelRule::LowestInHalf { side, label } => {
                let half = w / 2.0;
                markers
                    .iter()
                    .filter(|m| match side {
                        Side::Left => m.x < half,
                        Side::Right => m.x >= half,
                    })
                    .max_by(|a, b| a.y.total_cmp(&b.y))
                    .map(|m| vec![(m.index, label.clone())])
                    .unwrap_or_default()
            }
        }
    }

    fn midline_column(&self, labels: &[String], markers: &[Marker], w: f64) -> Vec<Assignment> {
        let n = labels.len();
        let band = self.config.center_tolerance * w;
        let mut column: Vec<Marker> = markers
            .iter()
            .filter(|m| (m.x - w / 2.0).abs() <= band)
            .copied()
            .collect();
        if n == 0 || column.len() < n {
            return Vec::new();
        }
        column.sort_by(|a, b| a.y.total_cmp(&b.y));

        // Tightest run of n consecutive markers by vertical span.
        let best = (0..=column.len() - n)
            .min_by(|&a, &b| {
                let span_a = column[a + n - 1].y - column[a].y;
                let span_b = column[b + n - 1].y - column[b].y;
                span_a.total_cmp(&span_b)
            })
            .unwrap_or(0);

        column[best..best + n]
            .iter()
            .zip(labels)
            .map(|(m, l)| (m.index, l.clone()))
            .collect()
    }

    fn horizontal_row(
        &self,
        height_fraction: f64,
        labels: &[String],
        markers: &[Marker],
        h: f64,
    ) -> Vec<Assignment> {
        let n = labels.len();
        let target = height_fraction * h;
        let band = self.config.row_tolerance * h;
        let mut row: Vec<Marker> = markers
            .iter()
            .filter(|m| (m.y - target).abs() <= band)
            .copied()
            .collect();
        if n == 0 || row.len() < n {
            return Vec::new();
        }
        row.sort_by(|a, b| (a.y - target).abs().total_cmp(&(b.y - target).abs()));
        row.truncate(n);
        row.sort_by(|a, b| a.x.total_cmp(&b.x));

        row.iter()
            .zip(labels)
            .map(|(m, l)| (m.index, l.clone()))
            .collect()
    }

    fn front_triad(
        &self,
        [top_label, left_label, right_label]: [&String; 3],
        markers: &[Marker],
        w: f64,
        h: f64,
    ) -> Vec<Assignment> {
        let band = self.config.center_tolerance * w;
        let (cx, cy) = (w / 2.0, h / 2.0);
        let Some(top) = markers
            .iter()
            .filter(|m| (m.x - cx).abs() <= band)
            .min_by(|a, b| {
                let da = (a.x - cx).hypot(a.y - cy);
                let db = (b.x - cx).hypot(b.y - cy);
                da.total_cmp(&db)
            })
            .copied()
        else {
            return Vec::new();
        };

        let mut out = vec![(top.index, top_label.clone())];
        let below: Vec<Marker> = markers
            .iter()
            .filter(|m| m.index != top.index && m.y > top.y)
            .copied()
            .collect();

        let target = self.config.front_target_angle_deg;
        let tolerance = self.config.front_angle_tolerance_deg;
        let strict_pick = |left_side: bool| {
            below
                .iter()
                .filter(|m| (m.x < top.x) == left_side)
                .map(|m| {
                    // Angle off the downward vertical through the top marker.
                    let angle = (m.x - top.x).abs().atan2(m.y - top.y).to_degrees();
                    (m, (angle - target).abs())
                })
                .filter(|(_, miss)| *miss <= tolerance)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(m, _)| *m)
        };

        let pair = match (strict_pick(true), strict_pick(false)) {
            (Some(l), Some(r)) => Some((l, r)),
            _ => self.front_fallback(cx, &below),
        };

        if let Some((l, r)) = pair {
            out.push((l.index, left_label.clone()));
            out.push((r.index, right_label.clone()));
        }
        out
    }

    /// Pair with the closest heights whose horizontal distances from the
    /// image centre column `cx` agree within the symmetry tolerance.
    fn front_fallback(&self, cx: f64, below: &[Marker]) -> Option<(Marker, Marker)> {
        let tolerance = self.config.front_symmetry_tolerance;
        let lefts = below.iter().filter(|m| m.x < cx);
        lefts
            .flat_map(|l| below.iter().filter(|r| r.x >= cx).map(move |r| (*l, *r)))
            .filter(|(l, r)| {
                let dl = cx - l.x;
                let dr = r.x - cx;
                let scale = dl.max(dr);
                scale > 0.0 && (dl - dr).abs() <= tolerance * scale
            })
            .min_by(|a, b| (a.0.y - a.1.y).abs().total_cmp(&(b.0.y - b.1.y).abs()))
    }
}

/// Set `label` unless the candidate already carries a different one.
fn assign(candidate: &mut DetectionCandidate, label: &str) -> bool {
    match &candidate.label {
        Some(existing) if existing != label => {
            log::debug!(
                "{} marker at ({:.1}, {:.1}) keeps label {existing}, not {label}",
                candidate.view,
                candidate.pixel_x,
                candidate.pixel_y
            );
            false
        }
        Some(_) => false,
        None => {
            candidate.label = Some(label.to_string());
            true
        }
    }
}
