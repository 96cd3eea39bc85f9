//! Draw primitives produced by the layout code.
//!
//! Layout functions never touch pixels. They emit a list of [`DrawPrimitive`]s
//! in device pixel space, and the [`canvas`](crate::canvas) module rasterizes
//! them. This keeps the geometry testable without a rendering backend.

/// A point in device pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    /// Horizontal position, left edge is 0
    pub x: i32,
    /// Vertical position, top edge is 0
    pub y: i32,
}

impl Point {
    /// Create a point.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in device pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutBox {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl LayoutBox {
    /// Create a box from its top-left corner and size.
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a box spanning two corners, given in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let (x0, x1) = (a.x.min(b.x), a.x.max(b.x));
        let (y0, y1) = (a.y.min(b.y), a.y.max(b.y));
        Self::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    /// Right edge (`x + width`).
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// Bottom edge (`y + height`).
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Whether `other` lies entirely within this box.
    pub fn contains(&self, other: &LayoutBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Whether the point lies within this box (edges included).
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }
}

/// Grayscale palette used by every device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shade {
    Black,
    Dark,
    MidDark,
    Mid,
    Light,
    Faint,
    White,
}

impl Shade {
    /// 8-bit luma value.
    pub const fn luma(self) -> u8 {
        match self {
            Shade::Black => 0,
            Shade::Dark => 64,
            Shade::MidDark => 96,
            Shade::Mid => 128,
            Shade::Light => 192,
            Shade::Faint => 224,
            Shade::White => 255,
        }
    }
}

/// Font selector. Concrete faces are chosen per device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontSize {
    Large,
    Medium,
    MediumSmall,
    Small,
    Tiny,
}

/// Text measurement capability.
///
/// Implementations must be deterministic: the same text, font and spacing
/// always measure the same.
pub trait TextMeasure {
    /// Size `(width, height)` of `text` in pixels.
    ///
    /// `text` may contain `\n`; the width is that of the widest line and
    /// `spacing` pixels are added between lines.
    fn measure(&self, text: &str, font: FontSize, spacing: u32) -> (u32, u32);
}

/// One drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawPrimitive {
    /// One pixel wide line between two points (inclusive).
    Line {
        from: Point,
        to: Point,
        color: Shade,
    },
    /// Rectangle, rounded when `radius > 0`.
    Rectangle {
        bounds: LayoutBox,
        radius: u32,
        fill: Option<Shade>,
        outline: Option<Shade>,
    },
    /// Single line of text with its top-left corner at `origin`.
    Text {
        origin: Point,
        text: String,
        font: FontSize,
        color: Shade,
    },
    /// Newline-delimited text, left aligned.
    MultilineText {
        origin: Point,
        text: String,
        font: FontSize,
        color: Shade,
        spacing: u32,
    },
}

impl DrawPrimitive {
    pub(crate) fn line(from: Point, to: Point, color: Shade) -> Self {
        DrawPrimitive::Line { from, to, color }
    }

    pub(crate) fn text(origin: Point, text: impl Into<String>, font: FontSize, color: Shade) -> Self {
        DrawPrimitive::Text {
            origin,
            text: text.into(),
            font,
            color,
        }
    }

    /// Whether this is a horizontal line.
    pub fn is_horizontal_line(&self) -> bool {
        matches!(self, DrawPrimitive::Line { from, to, .. } if from.y == to.y)
    }
}
