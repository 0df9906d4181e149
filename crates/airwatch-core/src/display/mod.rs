//! Rendering to the 320x240 panel
//!
//! Screens draw into a RAM [`FrameBuffer`]; [`DisplayDevice::present`] then
//! pushes only the changed region to the panel.

mod framebuffer;
pub mod quality;
pub mod screens;

pub use framebuffer::FrameBuffer;

use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::error::{AppError, message};

pub const DISPLAY_WIDTH_PX: u32 = 320;
pub const DISPLAY_HEIGHT_PX: u32 = 240;

/// A draw target whose output becomes visible on [`present`](Self::present).
pub trait DisplayDevice: DrawTarget<Color = Rgb565> {
    fn present(&mut self) -> Result<(), AppError>;
}

/// Framebuffer in front of a panel driver.
pub struct BufferedDisplay<P> {
    frame: FrameBuffer,
    panel: P,
}

impl<P> BufferedDisplay<P>
where
    P: DrawTarget<Color = Rgb565>,
{
    pub fn new(panel: P) -> Self {
        Self {
            frame: FrameBuffer::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX),
            panel,
        }
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }
}

impl<P> OriginDimensions for BufferedDisplay<P> {
    fn size(&self) -> Size {
        self.frame.size()
    }
}

impl<P> DrawTarget for BufferedDisplay<P> {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.frame.draw_iter(pixels)
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.frame.fill_solid(area, color)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.frame.clear(color)
    }
}

impl<P> DisplayDevice for BufferedDisplay<P>
where
    P: DrawTarget<Color = Rgb565>,
    P::Error: core::fmt::Debug,
{
    fn present(&mut self) -> Result<(), AppError> {
        self.frame.flush(&mut self.panel).map_err(|e| {
            AppError::Display(message(&alloc::format!("panel write failed: {:?}", e)))
        })
    }
}
