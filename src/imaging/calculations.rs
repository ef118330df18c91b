//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Constraint, Layout};

/// Density multipliers generated for a constrained layout.
const CONSTRAINED_DENSITIES: [f64; 5] = [0.25, 0.5, 1.0, 1.5, 2.0];

/// One planned output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// Scale `natural` to `width`, preserving aspect ratio.
///
/// Height is rounded and never drops below one pixel.
///
/// # Examples
/// ```
/// # use quire::imaging::scale_to_width;
/// let size = scale_to_width((2000, 1500), 590);
/// assert_eq!((size.width, size.height), (590, 443));
/// ```
pub fn scale_to_width(natural: (u32, u32), width: u32) -> Size {
    let (nat_w, nat_h) = natural;
    let height = (nat_h as f64 * width as f64 / nat_w as f64).round() as u32;
    Size {
        width,
        height: height.max(1),
    }
}

/// Widths to generate for a constraint, ascending, never above `natural_width`.
///
/// - `MaxWidth(w)` → `min(w, natural)`
/// - `Constrained(w)` → `w × {0.25, 0.5, 1, 1.5, 2}` up to the natural width,
///   plus the natural width itself when the cap cut the list short
/// - `FullWidth` → every breakpoint that fits, or the natural width if none do
/// - `Fixed(w)` → `w` and `2w` when the source is large enough
pub fn plan_widths(natural_width: u32, constraint: &Constraint, breakpoints: &[u32]) -> Vec<u32> {
    let mut widths: Vec<u32> = match constraint {
        Constraint::MaxWidth(w) => vec![(*w).min(natural_width)],
        Constraint::Layout(Layout::Constrained(w)) => {
            let candidates: Vec<u32> = CONSTRAINED_DENSITIES
                .iter()
                .map(|m| ((*w as f64) * m).round() as u32)
                .filter(|&c| c > 0)
                .collect();
            let mut kept: Vec<u32> = candidates
                .iter()
                .copied()
                .filter(|&c| c <= natural_width)
                .collect();
            if kept.len() < candidates.len() {
                kept.push(natural_width);
            }
            kept
        }
        Constraint::Layout(Layout::FullWidth) => {
            let kept: Vec<u32> = breakpoints
                .iter()
                .copied()
                .filter(|&b| b > 0 && b <= natural_width)
                .collect();
            if kept.is_empty() {
                vec![natural_width]
            } else {
                kept
            }
        }
        Constraint::Layout(Layout::Fixed(w)) => {
            let base = (*w).min(natural_width);
            let double = w.saturating_mul(2);
            if double <= natural_width {
                vec![base, double]
            } else {
                vec![base]
            }
        }
    };
    widths.retain(|&w| w > 0);
    widths.sort_unstable();
    widths.dedup();
    widths
}

/// Sizes to generate for a constraint. See [`plan_widths`].
pub fn plan_sizes(natural: (u32, u32), constraint: &Constraint, breakpoints: &[u32]) -> Vec<Size> {
    plan_widths(natural.0, constraint, breakpoints)
        .into_iter()
        .map(|w| scale_to_width(natural, w))
        .collect()
}

/// Display width a constraint asks for, used in `sizes` attributes.
pub fn display_width(natural_width: u32, constraint: &Constraint) -> Option<u32> {
    match constraint {
        Constraint::MaxWidth(w)
        | Constraint::Layout(Layout::Constrained(w))
        | Constraint::Layout(Layout::Fixed(w)) => Some((*w).min(natural_width)),
        Constraint::Layout(Layout::FullWidth) => None,
    }
}

/// Height as a percentage of width, for aspect-ratio boxes.
///
/// # Examples
/// ```
/// # use quire::imaging::aspect_percent;
/// assert_eq!(aspect_percent(560, 315), "56.25");
/// assert_eq!(aspect_percent(3, 1), "33.3333");
/// ```
pub fn aspect_percent(width: u32, height: u32) -> String {
    let pct = height as f64 / width.max(1) as f64 * 100.0;
    let s = format!("{pct:.4}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
