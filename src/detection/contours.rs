use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

use crate::models::{BoundingBox, Contour};

/// Find contours in binary edge image using connected components
pub fn find_contours(edges: &GrayImage, min_area: u32) -> Vec<Contour> {
    // Label connected components (white pixels = edges)
    let labeled = connected_components(edges, Connectivity::Eight, Luma([0]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Skip background
        }

        regions
            .entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut contours: Vec<Contour> = regions
        .into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| Contour {
            label,
            min_x,
            min_y,
            max_x,
            max_y,
            pixel_count: count,
        })
        .filter(|c| c.pixel_count >= min_area)
        .collect();

    // HashMap order is random; callers need a stable sequence.
    contours.sort_by_key(|c| (c.min_y, c.min_x, c.label));
    contours
}

/// Union boxes that overlap until none do. Result is in reading order.
pub fn merge_overlapping(boxes: Vec<BoundingBox>) -> Vec<BoundingBox> {
    let mut merged = boxes;

    loop {
        let mut changed = false;
        let mut out: Vec<BoundingBox> = Vec::with_capacity(merged.len());

        for bbox in merged {
            match out.iter_mut().find(|b| b.intersection_area(&bbox) > 0) {
                Some(existing) => {
                    *existing = union(existing, &bbox);
                    changed = true;
                }
                None => out.push(bbox),
            }
        }

        merged = out;
        if !changed {
            break;
        }
    }

    sort_reading_order(&mut merged);
    merged
}

/// Top-to-bottom, then left-to-right.
pub fn sort_reading_order(boxes: &mut [BoundingBox]) {
    boxes.sort_by_key(|b| (b.top, b.left, b.width, b.height));
}

fn union(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
    let left = a.left.min(b.left);
    let top = a.top.min(b.top);
    let right = a.right().max(b.right());
    let bottom = a.bottom().max(b.bottom());
    BoundingBox {
        left,
        top,
        width: (right - left as u64) as u32,
        height: (bottom - top as u64) as u32,
    }
}
