//! Vertical rhythm and modular type scale.
//!
//! Every vertical measurement on a page is a multiple of one rhythm unit, the
//! base line height. Font sizes come from a modular scale and their line
//! heights are rounded *up* to whole rhythm units, so text of any size still
//! lands on the shared baseline grid.
//!
//! ## Fixed-point lengths
//!
//! Lengths are stored as integer ten-thousandths of a pixel. `rhythm(2)` is
//! exactly twice `rhythm(1)`, and a line height of three units is exactly
//! three units, with no float drift between callers.
//!
//! | Call | Default result |
//! |---|---|
//! | `rhythm(1.0)` | `28px` / `1.75rem` |
//! | `rhythm(0.5)` | `14px` / `0.875rem` |
//! | `scale(1.0)` | font `40px`, line height `56px` (2 units) |
//! | `scale(0.0)` | font `16px`, line height `28px` (1 unit) |
//!
//! A [`Rhythm`] is an immutable value built once from [`RhythmConfig`] and
//! passed to whoever needs layout math.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ten-thousandths of a pixel per pixel.
const SCALE: i64 = 10_000;

/// `[typography]` section of `config.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RhythmConfig {
    pub base_font_size_px: f64,
    /// The rhythm unit.
    pub base_line_height_px: f64,
    pub scale_ratio: f64,
    /// Smallest line-height to font-size ratio a scaled style may get.
    pub min_leading: f64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            base_font_size_px: 16.0,
            base_line_height_px: 28.0,
            scale_ratio: 2.5,
            min_leading: 1.2,
        }
    }
}

impl RhythmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.base_font_size_px) || !positive(self.base_line_height_px) {
            return Err(ConfigError::Validation(
                "typography base sizes must be positive".into(),
            ));
        }
        if !positive(self.scale_ratio) {
            return Err(ConfigError::Validation(
                "typography.scale_ratio must be positive".into(),
            ));
        }
        if !self.min_leading.is_finite() || self.min_leading < 1.0 {
            return Err(ConfigError::Validation(
                "typography.min_leading must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A length in ten-thousandths of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Length(i64);

impl Length {
    pub fn from_px(px: f64) -> Self {
        Self((px * SCALE as f64).round() as i64)
    }

    /// Raw fixed-point value.
    pub fn units(self) -> i64 {
        self.0
    }

    pub fn px(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// Value in rem relative to `root`, rendered with at most four decimals.
    pub fn to_rem(self, root: Length) -> String {
        if root.0 == 0 {
            return "0rem".to_string();
        }
        let rem = (self.0 as i128 * SCALE as i128 + root.0 as i128 / 2) / root.0 as i128;
        format!("{}rem", format_fixed(rem as i64))
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px", format_fixed(self.0))
    }
}

/// Render a fixed-point value without trailing zeros (`280000` → `28`).
fn format_fixed(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let whole = abs / SCALE as u64;
    let frac = abs % SCALE as u64;
    if frac == 0 {
        format!("{sign}{whole}")
    } else {
        let digits = format!("{frac:04}");
        format!("{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

/// Font size and grid-aligned line height of one step of the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeStyle {
    pub font_size: Length,
    pub line_height: Length,
    /// Line height in rhythm units.
    pub lines: u32,
}

/// Rhythm and scale functions over one configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rhythm {
    config: RhythmConfig,
    unit: Length,
    base_font: Length,
}

impl Rhythm {
    pub fn new(config: RhythmConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            unit: Length::from_px(config.base_line_height_px),
            base_font: Length::from_px(config.base_font_size_px),
        })
    }

    pub fn config(&self) -> &RhythmConfig {
        &self.config
    }

    /// The root font size, the reference for rem values.
    pub fn base_font(&self) -> Length {
        self.base_font
    }

    /// `multiple` rhythm units.
    pub fn rhythm(&self, multiple: f64) -> Length {
        Length((self.unit.0 as f64 * multiple).round() as i64)
    }

    /// Step `multiple` of the modular scale.
    pub fn scale(&self, multiple: f64) -> TypeStyle {
        let font_size =
            Length::from_px(self.config.base_font_size_px * self.config.scale_ratio.powf(multiple));
        let needed = font_size.0 as f64 * self.config.min_leading;
        // A hair of tolerance so an exact fit does not round up a whole unit.
        let lines = ((needed - 0.5) / self.unit.0 as f64).ceil().max(1.0) as u32;
        TypeStyle {
            font_size,
            line_height: Length(self.unit.0 * i64::from(lines)),
            lines,
        }
    }

    fn rem(&self, length: Length) -> String {
        length.to_rem(self.base_font)
    }

    /// Root and heading rules for the configured rhythm.
    ///
    /// Heading steps follow typography.js: `h1` is one full step up the scale,
    /// `h6` one and a half fifths down.
    pub fn base_css(&self) -> String {
        const HEADINGS: [(&str, f64); 6] = [
            ("h1", 5.0 / 5.0),
            ("h2", 3.0 / 5.0),
            ("h3", 2.0 / 5.0),
            ("h4", 0.0),
            ("h5", -1.0 / 5.0),
            ("h6", -1.5 / 5.0),
        ];
        let mut css = format!(
            "html {{ font-size: {}; line-height: {}; }}\n",
            format_percent(self.base_font),
            self.rem(self.unit),
        );
        css.push_str(&format!(
            "p, ul, ol, blockquote, pre, table, figure {{ margin-top: 0; margin-bottom: {}; }}\n",
            self.rem(self.rhythm(1.0))
        ));
        for (tag, step) in HEADINGS {
            let style = self.scale(step);
            css.push_str(&format!(
                "{tag} {{ font-size: {}; line-height: {}; margin-top: 0; margin-bottom: {}; }}\n",
                self.rem(style.font_size),
                self.rem(style.line_height),
                self.rem(self.rhythm(1.0)),
            ));
        }
        css
    }
}

/// Root font size as a percentage of the 16px browser default.
fn format_percent(base_font: Length) -> String {
    let percent = base_font.0 * 100 / 16;
    format!("{}%", format_fixed(percent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rhythm() -> Rhythm {
        Rhythm::new(RhythmConfig::default()).unwrap()
    }

    #[test]
    fn rhythm_is_multiple_of_unit() {
        let r = rhythm();
        let unit = r.rhythm(1.0).units();
        for m in [0.0, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 24.0] {
            let len = r.rhythm(m).units();
            assert_eq!(len * 4 % unit, 0, "rhythm({m}) = {len}");
        }
        assert_eq!(r.rhythm(2.0).units(), 2 * unit);
        assert_eq!(r.rhythm(1.0).to_string(), "28px");
        assert_eq!(r.rhythm(1.0).to_rem(r.base_font()), "1.75rem");
        assert_eq!(r.rhythm(1.0 / 3.0).to_string(), "9.3333px");
    }

    #[test]
    fn line_height_lands_on_grid() {
        let r = rhythm();
        let unit = r.rhythm(1.0).units();
        for m in [-2.0, -1.0, -0.3, 0.0, 0.2, 0.4, 0.6, 1.0, 1.7, 3.0] {
            let style = r.scale(m);
            assert_eq!(style.line_height.units() % unit, 0, "scale({m})");
            assert!(style.line_height.units() > 0);
            assert!(
                style.line_height.px() >= style.font_size.px() * 1.2 - 1e-3,
                "scale({m}) line height too tight"
            );
        }
    }

    #[test]
    fn scale_steps() {
        let r = rhythm();
        let base = r.scale(0.0);
        assert_eq!(base.font_size.to_string(), "16px");
        assert_eq!(base.lines, 1);

        let up = r.scale(1.0);
        assert_eq!(up.font_size.to_string(), "40px");
        assert_eq!(up.lines, 2);
        assert_eq!(up.line_height.to_string(), "56px");
    }

    #[test]
    fn exact_fit_does_not_round_up() {
        let r = Rhythm::new(RhythmConfig {
            base_font_size_px: 20.0,
            base_line_height_px: 24.0,
            scale_ratio: 2.0,
            min_leading: 1.2,
        })
        .unwrap();
        assert_eq!(r.scale(0.0).lines, 1);
    }

    #[test]
    fn stable_across_calls() {
        let r = rhythm();
        assert_eq!(r.scale(0.6), r.scale(0.6));
        assert_eq!(r.rhythm(1.5), r.rhythm(1.5));
    }

    #[test]
    fn invalid_configs_rejected() {
        for config in [
            RhythmConfig { base_font_size_px: 0.0, ..Default::default() },
            RhythmConfig { base_line_height_px: -1.0, ..Default::default() },
            RhythmConfig { scale_ratio: 0.0, ..Default::default() },
            RhythmConfig { min_leading: 0.9, ..Default::default() },
            RhythmConfig { scale_ratio: f64::NAN, ..Default::default() },
        ] {
            assert!(Rhythm::new(config).is_err(), "{config:?}");
        }
    }

    #[test]
    fn css_covers_headings() {
        let css = rhythm().base_css();
        assert!(css.starts_with("html { font-size: 100%; line-height: 1.75rem; }"));
        assert!(css.contains("h1 { font-size: 2.5rem; line-height: 3.5rem;"));
        for tag in ["h2", "h3", "h4", "h5", "h6"] {
            assert!(css.contains(&format!("{tag} {{")));
        }
        assert!(css.contains("margin-bottom: 1.75rem;"));
    }

    #[test]
    fn fixed_formatting() {
        assert_eq!(format_fixed(280_000), "28");
        assert_eq!(format_fixed(93_333), "9.3333");
        assert_eq!(format_fixed(5_000), "0.5");
        assert_eq!(format_fixed(-12_500), "-1.25");
    }
}
