//! Screen Position Helpers
//!
//! Edge adjacency and bounding boxes for screens laid out in the global
//! coordinate space.

use crate::screen::{Rect, ScreenId};

/// Requested origin of one screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenPositionOptions {
    /// Screen to move
    pub screen_id: ScreenId,

    /// New left edge
    pub start_x: i32,

    /// New top edge
    pub start_y: i32,
}

/// Whether two screens share an edge segment
///
/// Touching means one screen's right (or bottom) edge lies on the other's
/// left (or top) edge with a shared span of positive length. Screens that
/// meet only at a corner do not touch.
pub fn are_screens_touching(main: Rect, second: Rect) -> bool {
    let horizontal_overlap =
        (main.x as i64).max(second.x as i64) < main.right().min(second.right());
    let vertical_overlap =
        (main.y as i64).max(second.y as i64) < main.bottom().min(second.bottom());

    let side_by_side = main.right() == second.x as i64 || second.right() == main.x as i64;
    let stacked = main.bottom() == second.y as i64 || second.bottom() == main.y as i64;

    (side_by_side && vertical_overlap) || (stacked && horizontal_overlap)
}

/// Bounding box of all rectangles
///
/// # Returns
///
/// `None` for an empty slice or when the box does not fit the 32-bit
/// coordinate range
pub fn calculate_bounds(rects: &[Rect]) -> Option<Rect> {
    let first = rects.first()?;
    let mut min_x = first.x as i64;
    let mut min_y = first.y as i64;
    let mut max_x = first.right();
    let mut max_y = first.bottom();

    for rect in &rects[1..] {
        min_x = min_x.min(rect.x as i64);
        min_y = min_y.min(rect.y as i64);
        max_x = max_x.max(rect.right());
        max_y = max_y.max(rect.bottom());
    }

    Some(Rect::new(
        i32::try_from(min_x).ok()?,
        i32::try_from(min_y).ok()?,
        u32::try_from(max_x - min_x).ok()?,
        u32::try_from(max_y - min_y).ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Adjacency Tests
    // =========================================================================

    #[test]
    fn test_side_by_side_touching() {
        let main = Rect::new(0, 0, 1920, 1080);
        let right = Rect::new(1920, 0, 1280, 720);
        let left = Rect::new(-1280, 200, 1280, 720);
        assert!(are_screens_touching(main, right));
        assert!(are_screens_touching(main, left));
    }

    #[test]
    fn test_stacked_touching() {
        let main = Rect::new(0, 0, 1920, 1080);
        let below = Rect::new(500, 1080, 1920, 1080);
        let above = Rect::new(-100, -1080, 1920, 1080);
        assert!(are_screens_touching(main, below));
        assert!(are_screens_touching(main, above));
    }

    #[test]
    fn test_corner_only_is_not_touching() {
        let main = Rect::new(0, 0, 1920, 1080);
        let diagonal = Rect::new(1920, 1080, 1920, 1080);
        let upper_left = Rect::new(-1920, -1080, 1920, 1080);
        assert!(!are_screens_touching(main, diagonal));
        assert!(!are_screens_touching(main, upper_left));
    }

    #[test]
    fn test_gap_is_not_touching() {
        let main = Rect::new(0, 0, 1920, 1080);
        let apart = Rect::new(1921, 0, 1920, 1080);
        let beside_but_below = Rect::new(1920, 1080, 100, 100);
        assert!(!are_screens_touching(main, apart));
        assert!(!are_screens_touching(main, beside_but_below));
    }

    #[test]
    fn test_overlapping_is_not_touching() {
        let main = Rect::new(0, 0, 1920, 1080);
        let overlapping = Rect::new(100, 100, 1920, 1080);
        assert!(!are_screens_touching(main, overlapping));
    }

    // =========================================================================
    // Bounds Tests
    // =========================================================================

    #[test]
    fn test_bounds_of_extend_pair() {
        let bounds = calculate_bounds(&[
            Rect::new(0, 0, 1920, 1080),
            Rect::new(1920, 0, 2560, 1440),
        ])
        .unwrap();
        assert_eq!(bounds, Rect::new(0, 0, 4480, 1440));
    }

    #[test]
    fn test_bounds_with_negative_offset() {
        let bounds = calculate_bounds(&[
            Rect::new(0, 0, 1920, 1080),
            Rect::new(-1280, -200, 1280, 720),
        ])
        .unwrap();
        assert_eq!(bounds, Rect::new(-1280, -200, 3200, 1280));
    }

    #[test]
    fn test_bounds_empty() {
        assert_eq!(calculate_bounds(&[]), None);
    }
}
