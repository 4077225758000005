// ── Signal sources ──
//
// What the engines sample: the pixel under the pointer, whole-display
// snapshots, and a banded audio spectrum. Platform code implements the
// traits; `PixelBuffer` is a plain RGB snapshot usable by any of them.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::color::{Rgb, to_component};

/// Mean luma at or below which a row or column counts as letterbox.
const BORDER_LUMA: f64 = 16.0;

/// Pixel rectangle on a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Overlap of two rectangles, empty when they are disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// Samples the color under the mouse pointer.
pub trait PointerSampler: Send + Sync + 'static {
    /// `None` when the pointer position cannot be read.
    fn pixel_under_pointer(&self) -> impl Future<Output = Option<Rgb>> + Send;
}

/// Captures whole-display snapshots.
pub trait ScreenCapture: Send + Sync + 'static {
    type Snapshot: DisplaySnapshot;

    /// Geometry of the configured monitor.
    fn monitor(&self) -> Rect;

    fn capture(&self) -> impl Future<Output = Option<Self::Snapshot>> + Send;
}

pub trait DisplaySnapshot: Send {
    /// Mean color of `rect`. Black when the rectangle is empty.
    fn average_color(&self, rect: Rect) -> Rgb;

    /// The part of `monitor` showing content, with black borders trimmed.
    fn content_bounds(&self, monitor: Rect) -> Rect;
}

/// A fixed-band audio spectrum.
pub trait SpectrumSource: Send + Sync + 'static {
    /// Start delivering `bands` band energies every `interval`. Dropping
    /// the receiver releases the source.
    fn subscribe(&self, bands: usize, interval: Duration) -> mpsc::Receiver<Vec<f64>>;
}

// ── PixelBuffer ──────────────────────────────────────────────────────

/// Packed 8-bit RGB snapshot, row-major.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap packed RGB data. `None` if the length does not match.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = usize::try_from(u64::from(width) * u64::from(height) * 3).ok()?;
        (data.len() == expected).then_some(Self { width, height, data })
    }

    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let pixels = usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(0);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&[color.r, color.g, color.b]);
        }
        Self { width, height, data }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn set(&mut self, x: u32, y: u32, color: Rgb) {
        if let Some(offset) = self.offset(x, y) {
            self.data[offset..offset + 3].copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        let rect = rect.intersect(&self.bounds());
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                self.set(x, y, color);
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let offset = self.offset(x, y)?;
        let px = self.data.get(offset..offset + 3)?;
        Some(Rgb::new(px[0], px[1], px[2]))
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        usize::try_from((u64::from(y) * u64::from(self.width) + u64::from(x)) * 3).ok()
    }

    fn sum(&self, rect: Rect) -> (u64, [u64; 3]) {
        let rect = rect.intersect(&self.bounds());
        let mut totals = [0u64; 3];
        let mut count = 0u64;
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if let Some(px) = self.pixel(x, y) {
                    totals[0] += u64::from(px.r);
                    totals[1] += u64::from(px.g);
                    totals[2] += u64::from(px.b);
                    count += 1;
                }
            }
        }
        (count, totals)
    }

    fn is_dark(&self, rect: Rect) -> bool {
        let (count, [r, g, b]) = self.sum(rect);
        if count == 0 {
            return true;
        }
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let luma = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / count as f64;
        luma <= BORDER_LUMA
    }
}

impl DisplaySnapshot for PixelBuffer {
    fn average_color(&self, rect: Rect) -> Rgb {
        let (count, [r, g, b]) = self.sum(rect);
        if count == 0 {
            return Rgb::BLACK;
        }
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let mean = |total: u64| to_component(total as f64 / count as f64);
        Rgb::new(mean(r), mean(g), mean(b))
    }

    fn content_bounds(&self, monitor: Rect) -> Rect {
        let area = monitor.intersect(&self.bounds());
        if area.is_empty() {
            return area;
        }

        let row = |y: u32| Rect::new(area.x, y, area.width, 1);
        let column = |x: u32| Rect::new(x, area.y, 1, area.height);

        let mut top = area.y;
        while top < area.bottom() && self.is_dark(row(top)) {
            top += 1;
        }
        // Fully dark: keep the whole monitor rather than a zero-size rect.
        if top == area.bottom() {
            return area;
        }
        let mut bottom = area.bottom();
        while bottom > top && self.is_dark(row(bottom - 1)) {
            bottom -= 1;
        }
        let mut left = area.x;
        while left < area.right() && self.is_dark(column(left)) {
            left += 1;
        }
        let mut right = area.right();
        while right > left && self.is_dark(column(right - 1)) {
            right -= 1;
        }

        Rect::new(left, top, right - left, bottom - top)
    }
}
