//! SLIC superpixels restricted to a mask.

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};

use super::contours::LabelImage;
use super::preprocessing::rgb_to_lab;
use crate::models::Circle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicParams {
    /// Grid spacing between initial cluster centres, in pixels.
    pub step: f64,
    /// Weight of spatial against colour distance.
    pub compactness: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy)]
struct Centre {
    l: f64,
    a: f64,
    b: f64,
    x: f64,
    y: f64,
}

/// Partition the masked pixels of `image` into compact, colour-coherent
/// regions. Returns labels `1..=n`, with 0 outside the mask.
///
/// Each anchor gets a centre of its own at its middle, and grid centres
/// falling within two pixels of an anchor's rim are dropped, so a blob of
/// about anchor size ends up as a single superpixel.
pub fn slic(image: &RgbImage, mask: &GrayImage, params: &SlicParams, anchors: &[Circle]) -> LabelImage {
    let (w, h) = image.dimensions();
    let mut labels = LabelImage::new(w, h);
    if w == 0 || h == 0 {
        return labels;
    }
    let step = params.step.max(2.0);
    let lab: Vec<[f32; 3]> = image.pixels().map(rgb_to_lab).collect();
    let inside = |x: u32, y: u32| mask.get_pixel(x, y).0[0] > 0;
    let idx = |x: u32, y: u32| y as usize * w as usize + x as usize;

    let centre_at = |x: u32, y: u32| {
        let [l, a, b] = lab[idx(x, y)];
        Centre {
            l: l as f64,
            a: a as f64,
            b: b as f64,
            x: x as f64,
            y: y as f64,
        }
    };

    let mut centres: Vec<Centre> = Vec::new();
    for a in anchors {
        let (x, y) = (a.x.round(), a.y.round());
        if x >= 0.0 && y >= 0.0 && x < w as f64 && y < h as f64 && inside(x as u32, y as u32) {
            centres.push(centre_at(x as u32, y as u32));
        }
    }
    let claimed = |x: f64, y: f64| {
        anchors
            .iter()
            .any(|a| (x - a.x).hypot(y - a.y) < a.radius + 2.0)
    };
    let mut gy = step / 2.0;
    while gy < h as f64 {
        let mut gx = step / 2.0;
        while gx < w as f64 {
            let (x, y) = (gx as u32, gy as u32);
            if inside(x, y) && !claimed(x as f64, y as f64) {
                centres.push(centre_at(x, y));
            }
            gx += step;
        }
        gy += step;
    }

    // Mask components too small to catch a grid point still get one centre.
    let components = connected_components(mask, Connectivity::Eight, Luma([0]));
    let mut seeded = std::collections::HashSet::new();
    for c in &centres {
        seeded.insert(components.get_pixel(c.x as u32, c.y as u32).0[0]);
    }
    let mut sums: std::collections::BTreeMap<u32, (f64, f64, usize)> = Default::default();
    for (x, y, l) in components.enumerate_pixels() {
        let l = l.0[0];
        if l != 0 && !seeded.contains(&l) {
            let e = sums.entry(l).or_insert((0.0, 0.0, 0));
            e.0 += x as f64;
            e.1 += y as f64;
            e.2 += 1;
        }
    }
    for (component, (sx, sy, n)) in sums {
        let (cx, cy) = (sx / n as f64, sy / n as f64);
        let nearest = components
            .enumerate_pixels()
            .filter(|(_, _, l)| l.0[0] == component)
            .min_by(|a, b| {
                let da = (a.0 as f64 - cx).powi(2) + (a.1 as f64 - cy).powi(2);
                let db = (b.0 as f64 - cx).powi(2) + (b.1 as f64 - cy).powi(2);
                da.total_cmp(&db)
            });
        if let Some((x, y, _)) = nearest {
            centres.push(centre_at(x, y));
        }
    }
    if centres.is_empty() {
        return labels;
    }

    let spatial_weight = (params.compactness / step).powi(2);
    let mut assignment = vec![usize::MAX; lab.len()];
    for _ in 0..params.iterations.max(1) {
        let mut distance = vec![f64::INFINITY; lab.len()];
        for (k, c) in centres.iter().enumerate() {
            let x0 = (c.x - step).floor().max(0.0) as u32;
            let y0 = (c.y - step).floor().max(0.0) as u32;
            let x1 = ((c.x + step).ceil() as u32).min(w - 1);
            let y1 = ((c.y + step).ceil() as u32).min(h - 1);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    if !inside(x, y) {
                        continue;
                    }
                    let i = idx(x, y);
                    let [l, a, b] = lab[i];
                    let dc = (l as f64 - c.l).powi(2) + (a as f64 - c.a).powi(2) + (b as f64 - c.b).powi(2);
                    let ds = (x as f64 - c.x).powi(2) + (y as f64 - c.y).powi(2);
                    let d = dc + ds * spatial_weight;
                    if d < distance[i] {
                        distance[i] = d;
                        assignment[i] = k;
                    }
                }
            }
        }

        let mut acc = vec![(0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64, 0usize); centres.len()];
        for y in 0..h {
            for x in 0..w {
                let i = idx(x, y);
                let k = assignment[i];
                if k == usize::MAX || !inside(x, y) {
                    continue;
                }
                let [l, a, b] = lab[i];
                let e = &mut acc[k];
                e.0 += l as f64;
                e.1 += a as f64;
                e.2 += b as f64;
                e.3 += x as f64;
                e.4 += y as f64;
                e.5 += 1;
            }
        }
        for (c, e) in centres.iter_mut().zip(&acc) {
            if e.5 > 0 {
                let n = e.5 as f64;
                *c = Centre {
                    l: e.0 / n,
                    a: e.1 / n,
                    b: e.2 / n,
                    x: e.3 / n,
                    y: e.4 / n,
                };
            }
        }
    }

    // Masked pixels outside every search window join the nearest centre.
    for y in 0..h {
        for x in 0..w {
            let i = idx(x, y);
            if inside(x, y) && assignment[i] == usize::MAX {
                assignment[i] = centres
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        let da = (a.x - x as f64).powi(2) + (a.y - y as f64).powi(2);
                        let db = (b.x - x as f64).powi(2) + (b.y - y as f64).powi(2);
                        da.total_cmp(&db)
                    })
                    .map(|(k, _)| k)
                    .unwrap_or(0);
            }
        }
    }

    for (x, y, p) in labels.enumerate_pixels_mut() {
        let k = assignment[idx(x, y)];
        if k != usize::MAX && mask.get_pixel(x, y).0[0] > 0 {
            p.0[0] = k as u32 + 1;
        }
    }
    enforce_connectivity(&labels, (step * step / 4.0) as usize, &lab)
}

/// Split labels into 4-connected fragments; each label keeps its largest
/// fragment, larger stray fragments become labels of their own and smaller
/// ones join the adjacent kept fragment closest in mean colour. `lab` holds
/// one L*a*b* triple per pixel in row-major order. Output labels are
/// renumbered `1..=n`.
pub fn enforce_connectivity(labels: &LabelImage, min_size: usize, lab: &[[f32; 3]]) -> LabelImage {
    let (w, h) = labels.dimensions();
    let fragments = connected_components(labels, Connectivity::Four, Luma([0u32]));

    let n_fragments = fragments.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut size = vec![0usize; n_fragments + 1];
    let mut owner = vec![0u32; n_fragments + 1];
    let mut colour = vec![[0.0f64; 3]; n_fragments + 1];
    for ((f, l), c) in fragments.pixels().zip(labels.pixels()).zip(lab) {
        let f = f.0[0] as usize;
        if f != 0 {
            size[f] += 1;
            owner[f] = l.0[0];
            for k in 0..3 {
                colour[f][k] += c[k] as f64;
            }
        }
    }
    for (c, &n) in colour.iter_mut().zip(&size) {
        if n > 0 {
            *c = c.map(|v| v / n as f64);
        }
    }

    let n_labels = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut best = vec![0usize; n_labels + 1];
    for f in 1..=n_fragments {
        let l = owner[f] as usize;
        if best[l] == 0 || size[f] > size[best[l]] {
            best[l] = f;
        }
    }

    let mut final_label = vec![0u32; n_fragments + 1];
    let mut next = 1u32;
    for f in 1..=n_fragments {
        if best[owner[f] as usize] == f || size[f] >= min_size {
            final_label[f] = next;
            next += 1;
        }
    }

    let distance = |a: &[f64; 3], b: &[f64; 3]| {
        (0..3).map(|k| (a[k] - b[k]).powi(2)).sum::<f64>()
    };
    let mut adopt = vec![(0usize, f64::INFINITY); n_fragments + 1];
    for y in 0..h {
        for x in 0..w {
            let f = fragments.get_pixel(x, y).0[0] as usize;
            if f == 0 || final_label[f] != 0 {
                continue;
            }
            let around = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in around {
                if nx >= w || ny >= h {
                    continue;
                }
                let g = fragments.get_pixel(nx, ny).0[0] as usize;
                if g == 0 || g == f || final_label[g] == 0 {
                    continue;
                }
                let d = distance(&colour[f], &colour[g]);
                if d < adopt[f].1 {
                    adopt[f] = (g, d);
                }
            }
        }
    }
    for f in 1..=n_fragments {
        if final_label[f] == 0 {
            let (target, _) = adopt[f];
            final_label[f] = if target != 0 {
                final_label[target]
            } else {
                let id = next;
                next += 1;
                id
            };
        }
    }

    let mut out = LabelImage::new(w, h);
    for (o, f) in out.pixels_mut().zip(fragments.pixels()) {
        o.0[0] = final_label[f.0[0] as usize];
    }
    out
}
