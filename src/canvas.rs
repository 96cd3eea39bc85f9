//! Rasterizes [`DrawPrimitive`]s onto an 8-bit grayscale bitmap.
//!
//! Drawing goes through `embedded-graphics`: [`Canvas`] is a `DrawTarget`
//! backed by an `image::GrayImage`, and text uses the ISO-8859-1 mono fonts
//! bundled with `embedded-graphics` (so `°` renders without font files).

use std::convert::Infallible;
use std::io::Cursor;

use embedded_graphics::mono_font::{iso_8859_1, MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::{Gray8, GrayColor};
use embedded_graphics::prelude::{
    DrawTarget, Drawable, OriginDimensions, Pixel, Point as EgPoint, Primitive, Size,
};
use embedded_graphics::primitives::{
    Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, RoundedRectangle, StrokeAlignment,
};
use embedded_graphics::text::{Baseline, LineHeight, Text, TextStyleBuilder};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::draw::{DrawPrimitive, FontSize, LayoutBox, Point, Shade, TextMeasure};
use crate::Error;

/// Font table for one device family.
#[derive(Debug, Clone, Copy)]
pub struct MonoFonts {
    large: &'static MonoFont<'static>,
    medium: &'static MonoFont<'static>,
    medium_small: &'static MonoFont<'static>,
    small: &'static MonoFont<'static>,
    tiny: &'static MonoFont<'static>,
}

impl MonoFonts {
    /// Fonts for high resolution panels (Kindle, 758x1024).
    pub fn large_display() -> Self {
        Self {
            large: &iso_8859_1::FONT_10X20,
            medium: &iso_8859_1::FONT_9X18,
            medium_small: &iso_8859_1::FONT_9X15,
            small: &iso_8859_1::FONT_8X13,
            tiny: &iso_8859_1::FONT_7X13,
        }
    }

    /// Fonts for small panels (TRMNL 7.5", 800x480).
    pub fn compact() -> Self {
        Self {
            large: &iso_8859_1::FONT_9X18,
            medium: &iso_8859_1::FONT_8X13,
            medium_small: &iso_8859_1::FONT_7X13,
            small: &iso_8859_1::FONT_6X10,
            tiny: &iso_8859_1::FONT_5X8,
        }
    }

    fn font(&self, size: FontSize) -> &'static MonoFont<'static> {
        match size {
            FontSize::Large => self.large,
            FontSize::Medium => self.medium,
            FontSize::MediumSmall => self.medium_small,
            FontSize::Small => self.small,
            FontSize::Tiny => self.tiny,
        }
    }
}

impl TextMeasure for MonoFonts {
    fn measure(&self, text: &str, font: FontSize, spacing: u32) -> (u32, u32) {
        let f = self.font(font);
        let advance = f.character_size.width + f.character_spacing;

        let width = text
            .split('\n')
            .map(|line| match line.chars().count() as u32 {
                0 => 0,
                n => n * advance - f.character_spacing,
            })
            .max()
            .unwrap_or(0);
        let lines = text.split('\n').count() as u32;
        let height = lines * f.character_size.height + (lines - 1) * spacing;

        (width, height)
    }
}

/// Grayscale drawing surface.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: GrayImage,
}

impl Canvas {
    /// White canvas of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([Shade::White.luma()])),
        }
    }

    /// Draw primitives in order; later primitives paint over earlier ones.
    pub fn draw_all(&mut self, primitives: &[DrawPrimitive], fonts: &MonoFonts) {
        for primitive in primitives {
            self.draw(primitive, fonts);
        }
    }

    /// Draw one primitive.
    pub fn draw(&mut self, primitive: &DrawPrimitive, fonts: &MonoFonts) {
        // Canvas drawing is infallible
        let _ = match primitive {
            DrawPrimitive::Line { from, to, color } => Line::new(eg(*from), eg(*to))
                .into_styled(PrimitiveStyle::with_stroke(gray(*color), 1))
                .draw(self),
            DrawPrimitive::Rectangle {
                bounds,
                radius,
                fill,
                outline,
            } => self.rectangle(bounds, *radius, *fill, *outline),
            DrawPrimitive::Text {
                origin,
                text,
                font,
                color,
            } => self.text(*origin, text, fonts.font(*font), *color, 0),
            DrawPrimitive::MultilineText {
                origin,
                text,
                font,
                color,
                spacing,
            } => self.text(*origin, text, fonts.font(*font), *color, *spacing),
        };
    }

    fn rectangle(
        &mut self,
        bounds: &LayoutBox,
        radius: u32,
        fill: Option<Shade>,
        outline: Option<Shade>,
    ) -> Result<(), Infallible> {
        let mut style = PrimitiveStyleBuilder::new().stroke_alignment(StrokeAlignment::Inside);
        if let Some(fill) = fill {
            style = style.fill_color(gray(fill));
        }
        if let Some(outline) = outline {
            style = style.stroke_color(gray(outline)).stroke_width(1);
        }
        let style = style.build();

        let rect = Rectangle::new(
            EgPoint::new(bounds.x, bounds.y),
            Size::new(bounds.width, bounds.height),
        );
        if radius > 0 {
            RoundedRectangle::with_equal_corners(rect, Size::new(radius, radius))
                .into_styled(style)
                .draw(self)
        } else {
            rect.into_styled(style).draw(self)
        }
    }

    fn text(
        &mut self,
        origin: Point,
        text: &str,
        font: &'static MonoFont<'static>,
        color: Shade,
        spacing: u32,
    ) -> Result<(), Infallible> {
        let character_style = MonoTextStyle::new(font, gray(color));
        let text_style = TextStyleBuilder::new()
            .baseline(Baseline::Top)
            .line_height(LineHeight::Pixels(font.character_size.height + spacing))
            .build();
        Text::with_text_style(text, eg(origin), character_style, text_style)
            .draw(self)
            .map(|_| ())
    }

    /// Borrow the bitmap.
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Take the bitmap.
    pub fn into_image(self) -> GrayImage {
        self.image
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Gray8;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (w, h) = self.image.dimensions();
        for Pixel(p, c) in pixels {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < w && (p.y as u32) < h {
                self.image.put_pixel(p.x as u32, p.y as u32, Luma([c.luma()]));
            }
        }
        Ok(())
    }
}

fn eg(p: Point) -> EgPoint {
    EgPoint::new(p.x, p.y)
}

fn gray(shade: Shade) -> Gray8 {
    Gray8::new(shade.luma())
}

/// Encode a grayscale bitmap as PNG.
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, Error> {
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image.clone()).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}
