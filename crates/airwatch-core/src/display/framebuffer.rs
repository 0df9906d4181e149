//! RAM framebuffer with dirty-rectangle tracking
//!
//! Writes that do not change a pixel leave the dirty region untouched, so
//! redrawing an unchanged screen flushes nothing.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::trace;

/// Inclusive bounding box of changed pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dirty {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl Dirty {
    fn point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    fn area(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.min_x as i32, self.min_y as i32),
            Size::new(self.width() as u32, self.height() as u32),
        )
    }
}

pub struct FrameBuffer {
    width: usize,
    height: usize,
    pixels: Vec<Rgb565>,
    dirty: Option<Dirty>,
}

impl FrameBuffer {
    /// Allocate a black framebuffer. The first flush covers nothing until
    /// something is drawn.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        Self {
            width,
            height,
            pixels: vec![Rgb565::BLACK; width * height],
            dirty: None,
        }
    }

    /// Region that the next flush will send, if any.
    pub fn dirty_area(&self) -> Option<Rectangle> {
        self.dirty.map(|d| d.area())
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb565> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, color: Rgb565) {
        let idx = y * self.width + x;
        if self.pixels[idx] == color {
            return;
        }
        self.pixels[idx] = color;
        match &mut self.dirty {
            Some(dirty) => dirty.include(x, y),
            None => self.dirty = Some(Dirty::point(x, y)),
        }
    }

    /// Clip `area` to the buffer, as half-open pixel ranges.
    fn clip(&self, area: &Rectangle) -> (core::ops::Range<usize>, core::ops::Range<usize>) {
        let x0 = area.top_left.x.clamp(0, self.width as i32) as usize;
        let y0 = area.top_left.y.clamp(0, self.height as i32) as usize;
        let x1 = (area.top_left.x as i64 + area.size.width as i64).clamp(0, self.width as i64) as usize;
        let y1 = (area.top_left.y as i64 + area.size.height as i64).clamp(0, self.height as i64) as usize;
        (x0..x1, y0..y1)
    }

    /// Send the dirty region to `panel` in one `fill_contiguous` call and
    /// reset the dirty state.
    pub fn flush<D>(&mut self, panel: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let Some(dirty) = self.dirty.take() else {
            return Ok(());
        };
        trace!(
            " Display: flushing {}x{} at ({}, {})",
            dirty.width(),
            dirty.height(),
            dirty.min_x,
            dirty.min_y
        );

        let pixels = &self.pixels;
        let stride = self.width;
        let width = dirty.width();
        let rows = (dirty.min_y..=dirty.max_y).flat_map(move |y| {
            let start = y * stride + dirty.min_x;
            pixels[start..start + width].iter().copied()
        });
        panel.fill_contiguous(&dirty.area(), rows)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if let (Ok(x), Ok(y)) = (usize::try_from(coord.x), usize::try_from(coord.y))
                && x < self.width
                && y < self.height
            {
                self.set(x, y, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let (xs, ys) = self.clip(area);
        for y in ys {
            for x in xs.clone() {
                self.set(x, y, color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let area = self.bounding_box();
        self.fill_solid(&area, color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mock_display::MockDisplay;
    use embedded_graphics::primitives::PrimitiveStyle;

    #[test]
    fn test_unchanged_pixels_stay_clean() {
        let mut frame = FrameBuffer::new(16, 16);
        frame.clear(Rgb565::BLACK).unwrap();
        assert_eq!(frame.dirty_area(), None);
    }

    #[test]
    fn test_dirty_area_bounds_changes() {
        let mut frame = FrameBuffer::new(16, 16);
        Pixel(Point::new(2, 3), Rgb565::RED).draw(&mut frame).unwrap();
        Pixel(Point::new(5, 1), Rgb565::RED).draw(&mut frame).unwrap();
        assert_eq!(
            frame.dirty_area(),
            Some(Rectangle::new(Point::new(2, 1), Size::new(4, 3)))
        );
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut frame = FrameBuffer::new(8, 8);
        Rectangle::new(Point::new(-4, 6), Size::new(20, 20))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::GREEN))
            .draw(&mut frame)
            .unwrap();
        assert_eq!(
            frame.dirty_area(),
            Some(Rectangle::new(Point::new(0, 6), Size::new(8, 2)))
        );
        assert_eq!(frame.pixel(7, 7), Some(Rgb565::GREEN));
        assert_eq!(frame.pixel(8, 7), None);
    }

    #[test]
    fn test_flush_sends_only_dirty_region() {
        let mut frame = FrameBuffer::new(8, 8);
        Pixel(Point::new(1, 1), Rgb565::BLUE).draw(&mut frame).unwrap();

        let mut panel = MockDisplay::<Rgb565>::new();
        frame.flush(&mut panel).unwrap();
        assert_eq!(panel.affected_area(), Rectangle::new(Point::new(1, 1), Size::new(1, 1)));
        assert_eq!(frame.dirty_area(), None, "flush resets the dirty state");
    }
}
