//! Pixel format and buffer geometry.
//!
//! Only one format is supported: 32-bit ARGB, little endian, premultiplied
//! alpha (`ARGB8888` in wl_shm terms). Everything else in the crate derives
//! strides and sizes from here.

use crate::error::{Error, Result};

/// Pixel formats understood by the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PixelFormat {
    /// ARGB 8-bit per channel, packed (32 bits/pixel).
    #[default]
    Argb8888 = 0,
}

impl PixelFormat {
    /// Bits per pixel.
    #[inline]
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Argb8888 => 32,
        }
    }

    /// Bytes per pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        self.bits_per_pixel() as usize / 8
    }

    /// Format code as carried on the shared-memory buffer protocol.
    #[inline]
    pub const fn wire_code(self) -> u32 {
        self as u32
    }

    /// Row stride in bytes for `width` pixels.
    ///
    /// Rows are padded to a multiple of 4 bytes.
    #[inline]
    pub const fn stride_for_width(self, width: u32) -> usize {
        ((self.bits_per_pixel() as usize * width as usize + 0x1f) >> 5) * 4
    }
}

/// Row stride for `width` pixels of the fixed pixel format.
#[inline]
pub const fn stride_for_width(width: u32) -> usize {
    PixelFormat::Argb8888.stride_for_width(width)
}

/// Width, height and the derived stride/size of one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferGeometry {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl BufferGeometry {
    /// Geometry for a `width` x `height` ARGB8888 buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero or the byte size does not
    /// fit in `usize`.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidGeometry(format!(
                "{width}x{height}: dimensions must be greater than 0"
            )));
        }

        let format = PixelFormat::Argb8888;
        let stride = format.stride_for_width(width);
        stride.checked_mul(height as usize).ok_or_else(|| {
            Error::InvalidGeometry(format!("{width}x{height}: size overflows"))
        })?;

        Ok(Self {
            width,
            height,
            stride,
            format,
        })
    }

    /// Width in pixels.
    #[inline]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels (rows).
    #[inline]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    #[inline]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Total size in bytes (`stride * height`).
    #[inline]
    pub const fn size(&self) -> usize {
        self.stride * self.height as usize
    }

    /// Pixel format.
    #[inline]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// True if this geometry has the given dimensions.
    #[inline]
    pub const fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}
