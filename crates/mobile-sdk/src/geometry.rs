//! Coordinate mapping between the web viewport and device pixels, plus the
//! placement math renderers use for tooltips, picture-in-picture and floaters.

use pushapp_core::types::{Alignment, HorizontalAnchor, VerticalAnchor};
use serde::{Deserialize, Serialize};

/// Rectangle in logical (CSS viewport) pixels, as reported by
/// `getBoundingClientRect()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle in physical device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn center_x(&self) -> i32 {
        self.x.saturating_add(self.width / 2)
    }
}

/// `round(value × density)`. Results outside `i32` saturate at its bounds
/// and NaN maps to 0, so callers validate input ranges first.
pub fn to_pixels(value: f64, density: f64) -> i32 {
    (value * density).round() as i32
}

impl ViewportRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn to_device_pixels(&self, density: f64) -> PixelRect {
        PixelRect {
            x: to_pixels(self.x, density),
            y: to_pixels(self.y, density),
            width: to_pixels(self.width, density),
            height: to_pixels(self.height, density),
        }
    }
}

/// Screen size in device pixels together with its density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub width: i32,
    pub height: i32,
    pub density: f64,
}

impl Screen {
    pub fn dp(&self, dp: i32) -> i32 {
        to_pixels(dp as f64, self.density)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowDirection {
    /// Tooltip sits above the target, arrow points down at it.
    Down,
    /// Tooltip sits below the target, arrow points up at it.
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TooltipPlacement {
    pub frame: PixelRect,
    pub arrow: ArrowDirection,
    /// Arrow offset from the tooltip's left edge.
    pub arrow_x: i32,
    pub arrow_size: i32,
}

const TOOLTIP_ARROW_DP: i32 = 12;
const TOOLTIP_OFFSET_DP: i32 = 16;
const TOOLTIP_CLEARANCE_DP: i32 = 4;
const TOOLTIP_SIDE_MARGIN_DP: i32 = 10;
const TOOLTIP_ARROW_INSET_DP: i32 = 8;

/// `width_percent` of the screen, clamped to 100 and to the side margins.
pub fn tooltip_width(screen: &Screen, width_percent: u32) -> i32 {
    let percent = i64::from(width_percent.min(100));
    let wanted = (i64::from(screen.width) * percent / 100) as i32;
    wanted.min(screen.width - screen.dp(40))
}

/// Place a tooltip of `content_height` px next to `target`. Prefers above,
/// then below, then centred on the target.
pub fn place_tooltip(
    target: &PixelRect,
    screen: &Screen,
    width_percent: u32,
    content_height: i32,
) -> TooltipPlacement {
    let width = tooltip_width(screen, width_percent);
    let arrow = screen.dp(TOOLTIP_ARROW_DP);
    let offset = screen.dp(TOOLTIP_OFFSET_DP);
    let clearance = screen.dp(TOOLTIP_CLEARANCE_DP);

    let content_height = content_height.max(0);
    let required = content_height
        .saturating_add(offset)
        .saturating_add(arrow)
        .saturating_add(clearance);
    let space_above = target.y;
    let space_below = screen.height.saturating_sub(target.bottom());

    let x = target.center_x().saturating_sub(width / 2);
    let (y, direction) = if space_above >= required {
        (target.y.saturating_sub(required), ArrowDirection::Down)
    } else if space_below >= required {
        (
            target.bottom().saturating_add(offset + clearance),
            ArrowDirection::Up,
        )
    } else {
        (
            target
                .y
                .saturating_add(target.height / 2)
                .saturating_sub(content_height / 2 + arrow),
            ArrowDirection::Down,
        )
    };

    let margin = screen.dp(TOOLTIP_SIDE_MARGIN_DP);
    let max_x = (screen.width - width - margin).max(margin);
    let final_x = x.clamp(margin, max_x);
    let final_y = y.max(0);

    let inset = screen.dp(TOOLTIP_ARROW_INSET_DP);
    let max_arrow_x = (width - arrow - inset).max(inset);
    let arrow_x = target
        .center_x()
        .saturating_sub(final_x + arrow / 2)
        .clamp(inset, max_arrow_x);

    TooltipPlacement {
        frame: PixelRect::new(final_x, final_y, width, content_height.saturating_add(arrow)),
        arrow: direction,
        arrow_x,
        arrow_size: arrow,
    }
}

/// Picture-in-picture window: a third of the screen, inset 20dp on the
/// anchored edges.
pub fn pip_frame(screen: &Screen, alignment: Alignment) -> PixelRect {
    let width = screen.width / 3;
    let height = screen.height / 3;
    let margin = screen.dp(20);

    let x = match alignment.horizontal {
        HorizontalAnchor::Left => margin,
        HorizontalAnchor::Center => (screen.width - width) / 2,
        HorizontalAnchor::Right => screen.width - width - margin,
    };
    let y = match alignment.vertical {
        VerticalAnchor::Top => margin,
        VerticalAnchor::Center => (screen.height - height) / 2,
        VerticalAnchor::Bottom => screen.height - height - margin,
    };
    PixelRect::new(x, y, width, height)
}

/// Initial floater frame: 150dp square, 16dp from the right, 80dp from the bottom.
pub fn floater_frame(screen: &Screen) -> PixelRect {
    let size = screen.dp(150);
    PixelRect::new(
        screen.width - size - screen.dp(16),
        screen.height - size - screen.dp(80),
        size,
        size,
    )
}

/// Move a draggable frame, keeping it fully on screen.
pub fn drag_to(frame: &PixelRect, screen: &Screen, x: i32, y: i32) -> PixelRect {
    let max_x = (screen.width - frame.width).max(0);
    let max_y = (screen.height - frame.height).max(0);
    PixelRect::new(x.clamp(0, max_x), y.clamp(0, max_y), frame.width, frame.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Screen = Screen {
        width: 1080,
        height: 2400,
        density: 3.0,
    };

    #[test]
    fn test_viewport_to_device_pixels() {
        let rect = ViewportRect::new(10.5, 20.2, 100.0, 33.3);
        assert_eq!(
            rect.to_device_pixels(2.75),
            PixelRect::new(29, 56, 275, 92)
        );
        // No clamping: negative and off-screen values survive conversion.
        let off = ViewportRect::new(-4.0, 5000.0, 0.0, 1.0);
        assert_eq!(off.to_device_pixels(2.0), PixelRect::new(-8, 10000, 0, 2));
    }

    #[test]
    fn test_tooltip_prefers_above() {
        let target = PixelRect::new(400, 1200, 200, 100);
        let placement = place_tooltip(&target, &SCREEN, 60, 150);
        assert_eq!(placement.arrow, ArrowDirection::Down);
        assert_eq!(placement.frame.width, 648);
        // 1200 - 150 - 48 - 12 - 36
        assert_eq!(placement.frame.y, 954);
        assert_eq!(placement.frame.height, 150 + 36);
    }

    #[test]
    fn test_tooltip_falls_below_near_top() {
        let target = PixelRect::new(0, 10, 100, 50);
        let placement = place_tooltip(&target, &SCREEN, 60, 150);
        assert_eq!(placement.arrow, ArrowDirection::Up);
        assert_eq!(placement.frame.y, 60 + 48 + 12);
        // Clamped to the 10dp side margin.
        assert_eq!(placement.frame.x, 30);
        assert_eq!(placement.arrow_x, 24);
    }

    #[test]
    fn test_tooltip_width_is_capped() {
        assert_eq!(tooltip_width(&SCREEN, 100), 1080 - 120);
        assert_eq!(tooltip_width(&SCREEN, 3_000_000), 1080 - 120);
        assert_eq!(tooltip_width(&SCREEN, u32::MAX), 1080 - 120);
    }

    #[test]
    fn test_extreme_target_saturates() {
        let huge = PixelRect::new(i32::MAX - 10, i32::MAX - 10, i32::MAX, i32::MAX);
        assert_eq!(huge.bottom(), i32::MAX);
        assert_eq!(huge.center_x(), i32::MAX);

        let placement = place_tooltip(&huge, &SCREEN, 3_000_000, i32::MAX);
        assert!(placement.frame.width <= SCREEN.width);
        assert!(placement.frame.x >= 0 && placement.frame.x <= SCREEN.width);
        assert!(placement.frame.y >= 0);

        let below = PixelRect::new(i32::MIN, i32::MIN, 10, 10);
        let placement = place_tooltip(&below, &SCREEN, 60, 150);
        assert_eq!(placement.frame.y, 0);
    }

    #[test]
    fn test_pip_frame_alignment() {
        let frame = pip_frame(&SCREEN, Alignment::default());
        assert_eq!(frame, PixelRect::new(1080 - 360 - 60, 2400 - 800 - 60, 360, 800));
        let top_left = pip_frame(&SCREEN, Alignment::from_flex("flex-start", "flex-start"));
        assert_eq!((top_left.x, top_left.y), (60, 60));
    }

    #[test]
    fn test_floater_drag_is_clamped() {
        let frame = floater_frame(&SCREEN);
        assert_eq!(frame, PixelRect::new(1080 - 450 - 48, 2400 - 450 - 240, 450, 450));
        let moved = drag_to(&frame, &SCREEN, -50, 5000);
        assert_eq!((moved.x, moved.y), (0, 2400 - 450));
    }
}
