//! Spatial index over one (side, layer) slice of the binding map.
//!
//! Rebuilt lazily on layout, keymap, layer, or snap-tunable change; queried
//! on every contact birth and release.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::geometry::{PadDimensions, Point, Rect};
use crate::keymap::{grid_storage_key, Keymap, KeyMapping, LayerId};
use crate::layout::{KeyBinding, Layout};
use crate::touch::Side;

const BUCKET_COLS: usize = 12;
const BUCKET_ROWS: usize = 10;

/// A contact's resolved binding, copied into the contact slot at birth so
/// it stays valid across index rebuilds.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingRef {
    pub storage_key: Arc<str>,
    pub label: Arc<str>,
    pub rect: Rect,
    pub mapping: KeyMapping,
    /// True for custom buttons, false for grid keys.
    pub is_button: bool,
}

pub struct BindingIndex {
    side: Side,
    layer: LayerId,
    bindings: Vec<KeyBinding>,
    refs: Vec<BindingRef>,
    // Parallel arrays over the snappable subset.
    snap_centers_mm: Vec<(f32, f32)>,
    snap_radius_sq_mm: Vec<f32>,
    snap_binding: Vec<usize>,
    // Coarse grid bounding per-query hit-test candidates.
    buckets: Vec<Vec<u16>>,
    dims: PadDimensions,
}

impl BindingIndex {
    pub fn build(side: Side, layer: LayerId, layout: &Layout, keymap: &Keymap, config: &EngineConfig) -> Self {
        let side_layout = layout.side(side);
        let mut bindings = Vec::new();

        for (row, rects) in side_layout.rects.iter().enumerate() {
            for (col, rect) in rects.iter().enumerate() {
                let storage_key = grid_storage_key(side, row, col);
                let mapping = keymap
                    .get(&storage_key, layer)
                    .unwrap_or(KeyMapping::tap(crate::keymap::Action::None));
                let mut mapping = mapping;
                if !side_layout.allow_hold_bindings {
                    mapping.hold = None;
                }
                bindings.push(KeyBinding {
                    side,
                    row,
                    col,
                    storage_key,
                    label: side_layout.labels[row][col].clone(),
                    rect: *rect,
                    mapping,
                });
            }
        }

        // Custom buttons sit above grid keys and share the tie-break rules.
        for button in layout.custom_buttons.iter().filter(|b| b.side == side && b.layer == layer) {
            bindings.push(KeyBinding {
                side,
                row: usize::MAX,
                col: usize::MAX,
                storage_key: crate::keymap::button_storage_key(side, layer, &button.name),
                label: button.label.clone(),
                rect: button.rect,
                mapping: button.mapping,
            });
        }

        let refs: Vec<BindingRef> = bindings
            .iter()
            .map(|b| BindingRef {
                storage_key: Arc::from(b.storage_key.as_str()),
                label: Arc::from(b.label.as_str()),
                rect: b.rect,
                mapping: b.mapping,
                is_button: b.row == usize::MAX,
            })
            .collect();

        let dims = config.pad;
        let radius_scale = config.snap_radius_percent / 100.0;
        let mut snap_centers_mm = Vec::new();
        let mut snap_radius_sq_mm = Vec::new();
        let mut snap_binding = Vec::new();
        for (i, binding) in bindings.iter().enumerate() {
            if !binding.mapping.primary.is_snappable() {
                continue;
            }
            let center = binding.rect.center();
            // Snap radius reaches `snap_radius_percent` of the key pitch
            // beyond the key's own half-extent, so the inter-key gutters
            // are always recoverable at the default setting.
            let pitch_mm = (binding.rect.w * dims.width_mm).min(binding.rect.h * dims.height_mm);
            let radius_mm = pitch_mm * (0.5 + radius_scale);
            snap_centers_mm.push((center.x * dims.width_mm, center.y * dims.height_mm));
            snap_radius_sq_mm.push(radius_mm * radius_mm);
            snap_binding.push(i);
        }

        let mut buckets = vec![Vec::new(); BUCKET_COLS * BUCKET_ROWS];
        for (i, binding) in bindings.iter().enumerate() {
            let r = binding.rect;
            let col_lo = ((r.x * BUCKET_COLS as f32) as usize).min(BUCKET_COLS - 1);
            let col_hi = (((r.x + r.w) * BUCKET_COLS as f32) as usize).min(BUCKET_COLS - 1);
            let row_lo = ((r.y * BUCKET_ROWS as f32) as usize).min(BUCKET_ROWS - 1);
            let row_hi = (((r.y + r.h) * BUCKET_ROWS as f32) as usize).min(BUCKET_ROWS - 1);
            for row in row_lo..=row_hi {
                for col in col_lo..=col_hi {
                    buckets[row * BUCKET_COLS + col].push(i as u16);
                }
            }
        }

        Self {
            side,
            layer,
            bindings,
            refs,
            snap_centers_mm,
            snap_radius_sq_mm,
            snap_binding,
            buckets,
            dims,
        }
    }

    pub const fn side(&self) -> Side {
        self.side
    }

    pub const fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    pub fn binding_ref(&self, index: usize) -> &BindingRef {
        &self.refs[index]
    }

    /// The single binding whose rect contains the point, preferring the
    /// most-interior containment; smaller area wins exact ties.
    pub fn hit_test(&self, p: Point) -> Option<usize> {
        if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
            return None;
        }
        let col = ((p.x * BUCKET_COLS as f32) as usize).min(BUCKET_COLS - 1);
        let row = ((p.y * BUCKET_ROWS as f32) as usize).min(BUCKET_ROWS - 1);

        let mut best: Option<(usize, f32, f32)> = None;
        for &i in &self.buckets[row * BUCKET_COLS + col] {
            let binding = &self.bindings[i as usize];
            if !binding.rect.contains(p) {
                continue;
            }
            let depth = binding.rect.min_edge_distance(p);
            let area = binding.rect.area();
            let better = match best {
                None => true,
                Some((_, best_depth, best_area)) => {
                    if (depth - best_depth).abs() < 1e-6 {
                        area < best_area
                    } else {
                        depth > best_depth
                    }
                }
            };
            if better {
                best = Some((i as usize, depth, area));
            }
        }
        best.map(|(i, _, _)| i)
    }

    /// Release-time near-miss recovery: the closest snap center within its
    /// radius. When the runner-up is within `ambiguity_ratio²` of the best,
    /// the binding whose rect edge is nearer to the release point wins.
    pub fn snap(&self, p: Point, ambiguity_ratio: f32) -> Option<usize> {
        let px = p.x * self.dims.width_mm;
        let py = p.y * self.dims.height_mm;

        let mut best: Option<(usize, f32)> = None;
        let mut second: Option<(usize, f32)> = None;
        for (slot, &(cx, cy)) in self.snap_centers_mm.iter().enumerate() {
            let dx = px - cx;
            let dy = py - cy;
            let d_sq = dx * dx + dy * dy;
            match best {
                None => best = Some((slot, d_sq)),
                Some((_, best_sq)) if d_sq < best_sq => {
                    second = best;
                    best = Some((slot, d_sq));
                }
                _ => match second {
                    None => second = Some((slot, d_sq)),
                    Some((_, second_sq)) if d_sq < second_sq => second = Some((slot, d_sq)),
                    _ => {}
                },
            }
        }

        let (slot, best_sq) = best?;
        if best_sq > self.snap_radius_sq_mm[slot] {
            return None;
        }

        let mut winner = slot;
        if let Some((second_slot, second_sq)) = second {
            let ratio_sq = ambiguity_ratio * ambiguity_ratio;
            if second_sq <= best_sq * ratio_sq {
                let a = self.snap_binding[slot];
                let b = self.snap_binding[second_slot];
                let edge_a = self.bindings[a].rect.edge_distance(p);
                let edge_b = self.bindings[b].rect.edge_distance(p);
                if edge_b < edge_a {
                    winner = second_slot;
                }
            }
        }
        Some(self.snap_binding[winner])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{Action, Keymap, KeyMapping};
    use crate::keycode::VirtualKey;
    use crate::layout::CustomButton;

    fn index_for(layout: &Layout, keymap: &Keymap) -> BindingIndex {
        BindingIndex::build(Side::Left, 0, layout, keymap, &EngineConfig::default())
    }

    fn standard_index() -> BindingIndex {
        let layout = Layout::standard_split();
        let keymap = Keymap::from_layout(&layout);
        index_for(&layout, &keymap)
    }

    #[test]
    fn hit_test_finds_the_containing_key() {
        let index = standard_index();
        // Row 2 col 1 of the left standard grid is "a".
        let rect = index
            .bindings()
            .iter()
            .find(|b| b.label == "a")
            .map(|b| b.rect)
            .unwrap();
        let hit = index.hit_test(rect.center()).unwrap();
        assert_eq!(index.bindings()[hit].label, "a");
    }

    #[test]
    fn hit_test_misses_outside_all_rects() {
        let index = standard_index();
        assert_eq!(index.hit_test(Point::new(1.5, 0.5)), None);
        // Gutter between the first two keys of the top row.
        let a = index.bindings()[0].rect;
        assert_eq!(index.hit_test(Point::new(a.x + a.w + 0.001, a.y + 0.01)), None);
    }

    #[test]
    fn overlapping_rects_resolve_to_most_interior() {
        let mut layout = Layout::standard_split();
        // A custom button spanning the gutter between "q" and "w" catches
        // points neither grid rect contains, and wins where it is deeper.
        let q_rect = layout.left.rects[1][1];
        let w_rect = layout.left.rects[1][2];
        layout.custom_buttons.push(CustomButton {
            side: Side::Left,
            layer: 0,
            name: "bridge".to_string(),
            label: "bridge".to_string(),
            rect: Rect::new(q_rect.x + q_rect.w - 0.01, q_rect.y, w_rect.x - q_rect.x - q_rect.w + 0.02, q_rect.h),
            mapping: KeyMapping::tap(Action::Key(VirtualKey::F1)),
        });
        let keymap = Keymap::from_layout(&layout);
        let index = index_for(&layout, &keymap);

        // Mid-gutter only the bridge contains the point.
        let gutter_x = q_rect.x + q_rect.w + 0.006;
        let hit = index.hit_test(Point::new(gutter_x, q_rect.y + q_rect.h * 0.5)).unwrap();
        assert_eq!(index.bindings()[hit].label, "bridge");

        // At the q key's center, q is far more interior than the bridge.
        let hit = index.hit_test(q_rect.center()).unwrap();
        assert_eq!(index.bindings()[hit].label, "q");
    }

    #[test]
    fn equal_depth_ties_go_to_the_smaller_rect() {
        let mut layout = Layout::standard_split();
        let mut add = |name: &str, rect: Rect| {
            layout.custom_buttons.push(CustomButton {
                side: Side::Left,
                layer: 3,
                name: name.to_string(),
                label: name.to_string(),
                rect,
                mapping: KeyMapping::tap(Action::Key(VirtualKey::F2)),
            });
        };
        // Same min-edge distance at (0.1, 0.1); the narrow one is smaller.
        add("wide", Rect::new(0.0, 0.0, 0.4, 0.4));
        add("narrow", Rect::new(0.0, 0.0, 0.2, 0.4));

        let keymap = Keymap::from_layout(&layout);
        let index = BindingIndex::build(Side::Left, 3, &layout, &keymap, &EngineConfig::default());
        let hit = index.hit_test(Point::new(0.1, 0.1)).unwrap();
        assert_eq!(index.bindings()[hit].label, "narrow");
    }

    #[test]
    fn snap_recovers_near_misses_within_radius() {
        let index = standard_index();
        let a = index.bindings().iter().find(|b| b.label == "a").unwrap();
        // Just below the "a" key, inside the gutter.
        let p = Point::new(a.rect.x + a.rect.w * 0.5, a.rect.y + a.rect.h + 0.004);
        let snapped = index.snap(p, 1.25).unwrap();
        let label = &index.bindings()[snapped].label;
        assert!(label == "a" || label == "z", "snapped to {label}");
    }

    #[test]
    fn snap_rejects_points_far_from_any_center() {
        let index = standard_index();
        assert_eq!(index.snap(Point::new(3.0, 3.0), 1.25), None);
    }

    #[test]
    fn snap_never_targets_unsnappable_bindings() {
        let mut keymap = Keymap::new();
        let layout = Layout::standard_split();
        // Bind everything to mouse buttons: nothing is snappable.
        for row in 0..layout.left.rects.len() {
            for col in 0..layout.left.rects[row].len() {
                keymap.set(
                    grid_storage_key(Side::Left, row, col),
                    0,
                    KeyMapping::tap(Action::MouseButton(crate::keymap::MouseButton::Left)),
                );
            }
        }
        let index = index_for(&layout, &keymap);
        assert_eq!(index.snap(Point::new(0.5, 0.5), 1.25), None);
    }
}
