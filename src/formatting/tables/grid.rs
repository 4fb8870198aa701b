// src/formatting/tables/grid.rs
//! Reconstructs a document table's row/column grid from its merge info.

use super::{Cell, CellGrid};
use crate::model::TableGeometry;
use crate::types::BlockId;

/// What occupies one grid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridSlot {
    /// The top-left cell of a (possibly 1×1) merge.
    Origin {
        block: Option<BlockId>,
        row_span: usize,
        col_span: usize,
    },
    /// Inside the merge whose origin is at `(row, column)`.
    Covered { row: usize, column: usize },
}

/// Lays out a table's slots, row-major, `rows × columns` in size.
///
/// Merge info is read by flat position. Cell blocks are taken by flat
/// position when the table lists one per position; otherwise they are
/// assigned in order to the origin positions.
pub fn layout(geometry: &TableGeometry) -> Vec<Vec<GridSlot>> {
    let (rows, columns) = (geometry.rows, geometry.columns);
    if rows == 0 || columns == 0 {
        return Vec::new();
    }

    let one_per_position = geometry.cells.len() == rows * columns;
    let mut slots: Vec<Vec<Option<GridSlot>>> = vec![vec![None; columns]; rows];
    let mut cursor = 0;

    for row in 0..rows {
        for column in 0..columns {
            if slots[row][column].is_some() {
                continue;
            }

            let flat = row * columns + column;
            let merge = geometry.merges.get(flat).copied().unwrap_or_default();
            let row_span = merge.row_span.clamp(1, rows - row);
            let col_span = merge.col_span.clamp(1, columns - column);

            let block = if one_per_position {
                geometry.cells.get(flat).cloned()
            } else {
                let block = geometry.cells.get(cursor).cloned();
                cursor += 1;
                block
            };

            for covered_row in row..row + row_span {
                for covered_column in column..column + col_span {
                    if slots[covered_row][covered_column].is_none() {
                        slots[covered_row][covered_column] = Some(GridSlot::Covered { row, column });
                    }
                }
            }
            slots[row][column] = Some(GridSlot::Origin {
                block,
                row_span,
                col_span,
            });
        }
    }

    slots
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|slot| slot.unwrap_or(GridSlot::Origin {
                    block: None,
                    row_span: 1,
                    col_span: 1,
                }))
                .collect()
        })
        .collect()
}

/// Fills a layout with cell text; covered positions repeat their origin.
pub fn fill<F>(slots: &[Vec<GridSlot>], mut text_of: F) -> CellGrid
where
    F: FnMut(&BlockId) -> String,
{
    let origin_texts: Vec<Vec<Option<String>>> = slots
        .iter()
        .map(|row| {
            row.iter()
                .map(|slot| match slot {
                    GridSlot::Origin { block, .. } => {
                        Some(block.as_ref().map(&mut text_of).unwrap_or_default())
                    }
                    GridSlot::Covered { .. } => None,
                })
                .collect()
        })
        .collect();

    let rows = slots
        .iter()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(|(c, slot)| match slot {
                    GridSlot::Origin {
                        row_span, col_span, ..
                    } => Cell {
                        text: origin_texts[r][c].clone().unwrap_or_default(),
                        row_span: *row_span,
                        col_span: *col_span,
                        covered: false,
                    },
                    GridSlot::Covered { row, column } => Cell {
                        text: origin_texts[*row][*column].clone().unwrap_or_default(),
                        row_span: 1,
                        col_span: 1,
                        covered: true,
                    },
                })
                .collect()
        })
        .collect();

    CellGrid {
        rows,
        headerless: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellMerge;
    use pretty_assertions::assert_eq;

    fn geometry(rows: usize, columns: usize, merges: Vec<(usize, usize)>) -> TableGeometry {
        TableGeometry {
            rows,
            columns,
            cells: (0..rows * columns)
                .map(|i| BlockId::from_raw(format!("c{}", i)))
                .collect(),
            merges: merges
                .into_iter()
                .map(|(row_span, col_span)| CellMerge { row_span, col_span })
                .collect(),
            header_row: true,
        }
    }

    #[test]
    fn test_two_by_two_merge_covers_three_cells() {
        let geometry = geometry(3, 3, vec![(2, 2)]);
        let slots = layout(&geometry);

        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|row| row.len() == 3));
        assert_eq!(
            slots[0][0],
            GridSlot::Origin {
                block: Some(BlockId::from_raw("c0")),
                row_span: 2,
                col_span: 2
            }
        );
        assert_eq!(slots[0][1], GridSlot::Covered { row: 0, column: 0 });
        assert_eq!(slots[1][0], GridSlot::Covered { row: 0, column: 0 });
        assert_eq!(slots[1][1], GridSlot::Covered { row: 0, column: 0 });
        assert!(matches!(slots[1][2], GridSlot::Origin { block: Some(ref b), .. } if b.as_str() == "c5"));
    }

    #[test]
    fn test_covered_cells_repeat_origin_text() {
        let slots = layout(&geometry(2, 2, vec![(1, 2)]));
        let grid = fill(&slots, |id| id.as_str().to_uppercase());

        let texts: Vec<Vec<&str>> = grid
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.text.as_str()).collect())
            .collect();
        assert_eq!(texts, vec![vec!["C0", "C0"], vec!["C2", "C3"]]);
        assert!(grid.has_merges());
    }

    #[test]
    fn test_sequential_cells_when_covered_positions_are_omitted() {
        let mut geometry = geometry(2, 2, vec![(2, 1)]);
        geometry.cells = ["a", "b", "d"].iter().map(|c| BlockId::from_raw(*c)).collect();

        let grid = fill(&layout(&geometry), |id| id.to_string());
        let texts: Vec<Vec<&str>> = grid
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.text.as_str()).collect())
            .collect();
        assert_eq!(texts, vec![vec!["a", "b"], vec!["a", "d"]]);
    }

    #[test]
    fn test_spans_are_clamped_to_the_grid() {
        let slots = layout(&geometry(1, 2, vec![(4, 9)]));
        assert_eq!(
            slots[0][0],
            GridSlot::Origin {
                block: Some(BlockId::from_raw("c0")),
                row_span: 1,
                col_span: 2
            }
        );
    }

    #[test]
    fn test_empty_geometry() {
        assert!(layout(&TableGeometry::default()).is_empty());
    }
}
