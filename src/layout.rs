//! Immutable layout data: the key grid per side plus custom buttons.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::keymap::{KeyMapping, LayerId};
use crate::touch::Side;

/// One side's key grid: rectangles and their display labels, row-major.
/// The two grids must stay shape-identical (`rects[r].len() == labels[r].len()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideLayout {
    pub rects: Vec<Vec<Rect>>,
    pub labels: Vec<Vec<String>>,
    pub allow_hold_bindings: bool,
}

impl SideLayout {
    pub fn rows(&self) -> usize {
        self.rects.len()
    }

    /// Uniform grid filling `[0,1]²` with a small gutter between keys.
    fn uniform_grid(labels: Vec<Vec<&str>>, allow_hold_bindings: bool) -> Self {
        const GUTTER: f32 = 0.012;
        let rows = labels.len();
        let mut rects = Vec::with_capacity(rows);
        for (row, row_labels) in labels.iter().enumerate() {
            let cols = row_labels.len();
            let cell_w = 1.0 / cols as f32;
            let cell_h = 1.0 / rows as f32;
            let mut row_rects = Vec::with_capacity(cols);
            for col in 0..cols {
                row_rects.push(Rect::new(
                    col as f32 * cell_w + GUTTER * 0.5,
                    row as f32 * cell_h + GUTTER * 0.5,
                    cell_w - GUTTER,
                    cell_h - GUTTER,
                ));
            }
            rects.push(row_rects);
        }
        Self {
            rects,
            labels: labels
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
            allow_hold_bindings,
        }
    }
}

/// A custom button overlay: layer-scoped, drawn above grid keys, hit-tested
/// with the same tie-break rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomButton {
    pub side: Side,
    pub layer: LayerId,
    pub name: String,
    pub label: String,
    pub rect: Rect,
    pub mapping: KeyMapping,
}

/// Both surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub left: SideLayout,
    pub right: SideLayout,
    pub custom_buttons: Vec<CustomButton>,
}

impl Layout {
    pub fn side(&self, side: Side) -> &SideLayout {
        match side {
            Side::Right => &self.right,
            // Unknown never reaches hit-testing; left is the safe default.
            _ => &self.left,
        }
    }

    /// The bundled split ortho preset: five rows of six columns per side,
    /// QWERTY letters in the middle, thumb row at the bottom.
    pub fn standard_split() -> Self {
        let left = SideLayout::uniform_grid(
            vec![
                vec!["esc", "1", "2", "3", "4", "5"],
                vec!["tab", "q", "w", "e", "r", "t"],
                vec!["ctrl", "a", "s", "d", "f", "g"],
                vec!["shift", "z", "x", "c", "v", "b"],
                vec!["fn", "cmd", "opt", "hold layer 1", "space", "space"],
            ],
            true,
        );
        let right = SideLayout::uniform_grid(
            vec![
                vec!["6", "7", "8", "9", "0", "bksp"],
                vec!["y", "u", "i", "o", "p", "\\"],
                vec!["h", "j", "k", "l", ";", "'"],
                vec!["n", "m", ",", ".", "/", "rshift"],
                vec!["space", "space", "hold layer 2", "-", "=", "return"],
            ],
            true,
        );
        Self {
            left,
            right,
            custom_buttons: Vec::new(),
        }
    }
}

/// A fully resolved binding: one rect on one side with its action mapping.
/// Built by the binding index from the layout and the keymap.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBinding {
    pub side: Side,
    /// Grid position; custom buttons carry `usize::MAX` for both.
    pub row: usize,
    pub col: usize,
    pub storage_key: String,
    pub label: String,
    pub rect: Rect,
    pub mapping: KeyMapping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn standard_split_grids_are_shape_consistent() {
        let layout = Layout::standard_split();
        for side in [&layout.left, &layout.right] {
            assert_eq!(side.rects.len(), side.labels.len());
            for (rects, labels) in side.rects.iter().zip(&side.labels) {
                assert_eq!(rects.len(), labels.len());
            }
        }
    }

    #[test]
    fn standard_split_rects_do_not_overlap() {
        let layout = Layout::standard_split();
        let rects: Vec<Rect> = layout.left.rects.iter().flatten().copied().collect();
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                let overlap = a.contains(Point::new(b.x + b.w * 0.5, b.y + b.h * 0.5))
                    || b.contains(Point::new(a.x + a.w * 0.5, a.y + a.h * 0.5));
                assert!(!overlap);
            }
        }
    }
}
