//! Core types for tesserae.
//!
//! These types define the foundation that everything builds on: positions,
//! colors, effect flags, the four-channel [`Pixel`], and the narrow
//! [`PixelSource`] seam the transformer pipeline reads shapes through.

use std::ops::{Add, Sub};

// =============================================================================
// Position
// =============================================================================

/// A 2D integer position in cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct V2 {
    pub x: i32,
    pub y: i32,
}

impl V2 {
    /// Create a new position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The origin (0, 0).
    pub const ZERO: Self = Self { x: 0, y: 0 };
}

impl Add for V2 {
    type Output = V2;

    fn add(self, rhs: V2) -> V2 {
        V2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for V2 {
    type Output = V2;

    fn sub(self, rhs: V2) -> V2 {
        V2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<(i32, i32)> for V2 {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<(u16, u16)> for V2 {
    fn from((x, y): (u16, u16)) -> Self {
        Self {
            x: x as i32,
            y: y as i32,
        }
    }
}

// =============================================================================
// Color
// =============================================================================

/// RGBA color with 8-bit channels (0-255).
///
/// Using integers for exact comparison - no floating point epsilon needed.
/// Special value: r=-1 means "terminal default" (let terminal pick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: i16,
    pub g: i16,
    pub b: i16,
    pub a: i16,
}

impl Rgba {
    /// Create a new RGBA color.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as i16,
            g: g as i16,
            b: b as i16,
            a: a as i16,
        }
    }

    /// Create an opaque RGB color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Terminal default color (let terminal decide).
    pub const TERMINAL_DEFAULT: Self = Self {
        r: -1,
        g: -1,
        b: -1,
        a: -1,
    };

    // Standard colors
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const RED: Self = Self::rgb(255, 0, 0);
    pub const GREEN: Self = Self::rgb(0, 255, 0);
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const YELLOW: Self = Self::rgb(255, 255, 0);
    pub const CYAN: Self = Self::rgb(0, 255, 255);
    pub const MAGENTA: Self = Self::rgb(255, 0, 255);
    pub const GRAY: Self = Self::rgb(128, 128, 128);

    /// Check if this is the terminal default color.
    #[inline]
    pub const fn is_terminal_default(&self) -> bool {
        self.r == -1
    }
}

impl From<(u8, u8, u8)> for Rgba {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::rgb(r, g, b)
    }
}

// =============================================================================
// Effects (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Visual effects as a bitfield for efficient storage and comparison.
    ///
    /// Combine with bitwise OR: `Effects::BOLD | Effects::BLINK`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Effects: u16 {
        const NONE = 0;
        const BOLD = 1 << 0;
        const DIM = 1 << 1;
        const ITALIC = 1 << 2;
        const UNDERLINE = 1 << 3;
        const BLINK = 1 << 4;
        const INVERSE = 1 << 5;
        const HIDDEN = 1 << 6;
        const STRIKETHROUGH = 1 << 7;
    }
}

// =============================================================================
// Pixel - The atomic unit the transformer pipeline operates on
// =============================================================================

/// A single styled character cell as read out of a shape.
///
/// Four channels, in fixed order: character, foreground, background,
/// effects. The transformer pipeline decomposes a pixel into these four
/// values, runs each through the active transformer stack, and reassembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub char: char,
    pub foreground: Rgba,
    pub background: Rgba,
    pub effects: Effects,
}

impl Pixel {
    /// Create a pixel from its four channel values.
    pub const fn new(char: char, foreground: Rgba, background: Rgba, effects: Effects) -> Self {
        Self {
            char,
            foreground,
            background,
            effects,
        }
    }

    /// Decompose into the four channel values, in channel order.
    pub const fn channels(&self) -> (char, Rgba, Rgba, Effects) {
        (self.char, self.foreground, self.background, self.effects)
    }

    /// Reconstruct a pixel from four channel values.
    ///
    /// Inverse of [`channels`](Self::channels).
    pub const fn from_channels(channels: (char, Rgba, Rgba, Effects)) -> Self {
        Self::new(channels.0, channels.1, channels.2, channels.3)
    }
}

impl Default for Pixel {
    fn default() -> Self {
        Self {
            char: ' ',
            foreground: Rgba::TERMINAL_DEFAULT,
            background: Rgba::TERMINAL_DEFAULT,
            effects: Effects::NONE,
        }
    }
}

// =============================================================================
// Context - Rendering context attached to a source
// =============================================================================

/// Rendering context associated with a pixel source.
///
/// Carries the current drawing defaults and the logical tick that channel
/// transforms may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// Logical frame counter since app start.
    pub tick: u64,
    pub foreground: Rgba,
    pub background: Rgba,
    pub effects: Effects,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            tick: 0,
            foreground: Rgba::TERMINAL_DEFAULT,
            background: Rgba::TERMINAL_DEFAULT,
            effects: Effects::NONE,
        }
    }
}

// =============================================================================
// PixelSource - The shape seam
// =============================================================================

/// The narrow read-only interface the transformer pipeline consumes shapes
/// through.
///
/// `get_raw` must return the untransformed pixel at a position - it must not
/// re-enter the transformer pipeline, or reads recurse without bound.
pub trait PixelSource {
    /// Read the raw (untransformed) pixel at `pos`.
    fn get_raw(&self, pos: V2) -> Pixel;

    /// The rendering context for this source, if it has one.
    fn context(&self) -> Option<&Context> {
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pixel_channel_round_trip() {
        let pixel = Pixel::new(
            'x',
            Rgba::rgb(10, 20, 30),
            Rgba::BLUE,
            Effects::BOLD | Effects::BLINK,
        );
        assert_eq!(Pixel::from_channels(pixel.channels()), pixel);
    }

    #[test]
    fn test_default_pixel_is_blank() {
        let pixel = Pixel::default();
        assert_eq!(pixel.char, ' ');
        assert!(pixel.foreground.is_terminal_default());
        assert!(pixel.background.is_terminal_default());
        assert_eq!(pixel.effects, Effects::NONE);
    }

    #[test]
    fn test_v2_arithmetic() {
        let a = V2::new(3, 4);
        let b = V2::new(1, 2);
        assert_eq!(a + b, V2::new(4, 6));
        assert_eq!(a - b, V2::new(2, 2));
        assert_eq!(V2::from((5u16, 7u16)), V2::new(5, 7));
    }

    #[test]
    fn test_effects_combine() {
        let fx = Effects::BOLD | Effects::UNDERLINE;
        assert!(fx.contains(Effects::BOLD));
        assert!(!fx.contains(Effects::BLINK));
    }
}
