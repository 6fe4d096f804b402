//! Zero-copy pixel access over a mapped buffer.

use crate::error::{Error, Result};
use crate::format::{BufferGeometry, PixelFormat};
use std::ptr::NonNull;

/// Pixel-access handle over the bytes of one instantiated buffer.
///
/// The view does not own memory. It is created over a live [`Mapping`]
/// (offset by the page skew) and lives exactly as long as the mapping it
/// points into; the pool drops it first whenever a buffer is torn down.
///
/// Row `r` starts at byte `r * stride`. Each row holds `width` native-endian
/// `u32` ARGB pixels followed by padding up to the stride.
///
/// [`Mapping`]: crate::memory::Mapping
pub struct PixelView {
    ptr: NonNull<u8>,
    geometry: BufferGeometry,
}

impl PixelView {
    /// Create a view of `geometry.size()` bytes at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `geometry.size()` bytes,
    /// 4-byte aligned, and stay valid for as long as the view is used.
    pub(crate) unsafe fn new(ptr: NonNull<u8>, geometry: BufferGeometry) -> Self {
        debug_assert_eq!(ptr.as_ptr() as usize % 4, 0);
        Self { ptr, geometry }
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.geometry.width()
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> u32 {
        self.geometry.height()
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.geometry.stride()
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.geometry.format()
    }

    /// Pointer to the first byte of row 0.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// All rows as one byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.geometry.size()) }
    }

    /// All rows as one mutable byte slice.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.geometry.size()) }
    }

    /// Bytes of row `row`, including stride padding.
    ///
    /// # Panics
    ///
    /// Panics if `row >= height()`.
    pub fn row(&self, row: u32) -> &[u8] {
        let range = self.row_range(row);
        &self.as_bytes()[range]
    }

    /// Mutable bytes of row `row`, including stride padding.
    ///
    /// # Panics
    ///
    /// Panics if `row >= height()`.
    pub fn row_mut(&mut self, row: u32) -> &mut [u8] {
        let range = self.row_range(row);
        &mut self.as_bytes_mut()[range]
    }

    /// Pixels of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= height()`.
    pub fn pixels(&self, row: u32) -> &[u32] {
        let start = self.row_range(row).start;
        // SAFETY: rows start at multiples of the stride (a multiple of 4) from
        // a 4-byte aligned pointer, and `width` pixels fit in one stride.
        unsafe {
            std::slice::from_raw_parts(
                self.ptr.as_ptr().add(start).cast::<u32>(),
                self.width() as usize,
            )
        }
    }

    /// Mutable pixels of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= height()`.
    pub fn pixels_mut(&mut self, row: u32) -> &mut [u32] {
        let start = self.row_range(row).start;
        // SAFETY: see `pixels`.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.ptr.as_ptr().add(start).cast::<u32>(),
                self.width() as usize,
            )
        }
    }

    /// Read one pixel.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels(y)[x as usize]
    }

    /// Write one pixel.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: u32) {
        self.pixels_mut(y)[x as usize] = color;
    }

    /// Fill every pixel with `color`.
    pub fn fill(&mut self, color: u32) {
        for row in 0..self.height() {
            self.pixels_mut(row).fill(color);
        }
    }

    /// Move `count` rows starting at row `src` so they start at row `dst`.
    ///
    /// Source and destination may overlap; the copy has `memmove` semantics.
    ///
    /// # Errors
    ///
    /// Returns an error if either range extends past the last row.
    pub fn copy_rows(&mut self, src: u32, dst: u32, count: u32) -> Result<()> {
        let height = self.height() as u64;
        if src as u64 + count as u64 > height || dst as u64 + count as u64 > height {
            return Err(Error::InvalidGeometry(format!(
                "row move {src} -> {dst} of {count} rows exceeds {height} rows"
            )));
        }

        let stride = self.stride();
        let src = src as usize * stride;
        let dst = dst as usize * stride;
        let len = count as usize * stride;
        self.as_bytes_mut().copy_within(src..src + len, dst);
        Ok(())
    }

    fn row_range(&self, row: u32) -> std::ops::Range<usize> {
        assert!(
            row < self.height(),
            "row {} out of bounds ({} rows)",
            row,
            self.height()
        );
        let start = row as usize * self.stride();
        start..start + self.stride()
    }
}

impl std::fmt::Debug for PixelView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelView")
            .field("ptr", &self.ptr)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("stride", &self.stride())
            .finish()
    }
}

// SAFETY: the view only aliases memory owned by the buffer that contains it
// and is handed out behind `&`/`&mut` borrows of that buffer.
unsafe impl Send for PixelView {}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_view(width: u32, height: u32) -> (Vec<u32>, PixelView) {
        let geometry = BufferGeometry::new(width, height).unwrap();
        let mut storage = vec![0u32; geometry.size() / 4];
        let ptr = NonNull::new(storage.as_mut_ptr().cast::<u8>()).unwrap();
        let view = unsafe { PixelView::new(ptr, geometry) };
        (storage, view)
    }

    fn fill_rows_with_index(view: &mut PixelView) {
        for row in 0..view.height() {
            view.pixels_mut(row).fill(row);
        }
    }

    #[test]
    fn test_row_layout() {
        let (_storage, view) = heap_view(25, 3);
        assert_eq!(view.stride(), 100);
        assert_eq!(view.row(0).len(), 100);
        assert_eq!(view.pixels(2).len(), 25);
        assert_eq!(view.row(2).as_ptr() as usize - view.as_ptr() as usize, 200);
    }

    #[test]
    fn test_put_and_read_pixel() {
        let (_storage, mut view) = heap_view(8, 8);
        view.fill(0xff00_0000);
        view.put_pixel(3, 5, 0xff12_3456);
        assert_eq!(view.pixel(3, 5), 0xff12_3456);
        assert_eq!(view.pixel(4, 5), 0xff00_0000);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_row_out_of_bounds_panics() {
        let (_storage, view) = heap_view(4, 4);
        let _ = view.row(4);
    }

    #[test]
    fn test_copy_rows_down_overlapping() {
        let (_storage, mut view) = heap_view(4, 6);
        fill_rows_with_index(&mut view);

        // rows 1..4 -> 2..5
        view.copy_rows(1, 2, 3).unwrap();

        let rows: Vec<u32> = (0..6).map(|r| view.pixel(0, r)).collect();
        assert_eq!(rows, vec![0, 1, 1, 2, 3, 5]);
    }

    #[test]
    fn test_copy_rows_up_overlapping() {
        let (_storage, mut view) = heap_view(4, 6);
        fill_rows_with_index(&mut view);

        // rows 2..5 -> 1..4
        view.copy_rows(2, 1, 3).unwrap();

        let rows: Vec<u32> = (0..6).map(|r| view.pixel(0, r)).collect();
        assert_eq!(rows, vec![0, 2, 3, 4, 4, 5]);
    }

    #[test]
    fn test_copy_rows_boundary() {
        let (_storage, mut view) = heap_view(4, 6);
        fill_rows_with_index(&mut view);

        // Last row is a valid destination; one past it is not.
        view.copy_rows(0, 5, 1).unwrap();
        assert_eq!(view.pixel(0, 5), 0);
        assert!(view.copy_rows(0, 5, 2).is_err());
        assert!(view.copy_rows(5, 0, 2).is_err());
    }
}
