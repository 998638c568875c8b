//! Core playback types: pixel formats, frame buffers, slot metadata, timelines

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Pixel layout of a presentation buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit red, green, blue, alpha
    Rgba8,
    /// 8-bit blue, green, red, alpha
    Bgra8,
    /// 16-bit packed 5-6-5
    Rgb565,
    /// 8-bit luma
    Gray8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 4] = [
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
        PixelFormat::Rgb565,
        PixelFormat::Gray8,
    ];

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Gray8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Bgra8 => "bgra8",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Gray8 => "gray8",
        }
    }

    /// Encode an RGBA colour as one pixel in this format
    pub fn encode(self, [r, g, b, a]: [u8; 4]) -> Vec<u8> {
        match self {
            PixelFormat::Rgba8 => vec![r, g, b, a],
            PixelFormat::Bgra8 => vec![b, g, r, a],
            PixelFormat::Rgb565 => {
                let packed: u16 =
                    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                packed.to_le_bytes().to_vec()
            }
            PixelFormat::Gray8 => {
                // Rec. 601 luma
                let y = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
                vec![y as u8]
            }
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        PixelFormat::ALL
            .into_iter()
            .find(|f| f.name() == lower)
            .ok_or_else(|| format!("unknown pixel format '{}'", s))
    }
}

/// One presentation buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameBuffer {
    format: Option<PixelFormat>,
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Zero-filled buffer of the given geometry
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            format: Some(format),
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// Bytes a buffer of this geometry occupies
    pub fn size_for(format: PixelFormat, width: u32, height: u32) -> usize {
        width as usize * height as usize * format.bytes_per_pixel()
    }

    /// `None` only for a released (taken) buffer
    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Clear to blank (all zero)
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Fill every pixel with one colour
    pub fn fill(&mut self, rgba: [u8; 4]) {
        let Some(format) = self.format else { return };
        let pixel = format.encode(rgba);
        for chunk in self.data.chunks_exact_mut(pixel.len()) {
            chunk.copy_from_slice(&pixel);
        }
    }

    /// Fill a single row with one colour (out-of-range rows are ignored)
    pub fn fill_row(&mut self, row: u32, rgba: [u8; 4]) {
        let Some(format) = self.format else { return };
        if row >= self.height {
            return;
        }
        let pixel = format.encode(rgba);
        let start = row as usize * self.stride;
        let end = start + self.stride;
        for chunk in self.data[start..end].chunks_exact_mut(pixel.len()) {
            chunk.copy_from_slice(&pixel);
        }
    }

    /// Raw bytes of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let format = self.format?;
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = format.bytes_per_pixel();
        let start = y as usize * self.stride + x as usize * bpp;
        self.data.get(start..start + bpp)
    }
}

/// Which passes the compositor runs for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    /// Background clear plus content
    Full,
    /// Content only; used while the displayer is dropping late frames
    Minimal,
}

/// What a slot was last asked to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFrame {
    /// Generator sequence number (0-based, +1 per produced frame)
    pub sequence: u64,
    /// Timeline frame rendered, `None` for a blank frame
    pub timeline_frame: Option<u64>,
    /// Performance time the frame is due on screen
    pub performance_time: i64,
}

/// Answer to the audio pipeline's timing query
///
/// All values are in performance-time ticks. `content_*` are positions on the
/// current timeline's own axis (frame index times the unit length).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackInterval {
    pub end: i64,
    pub content_start: i64,
    pub content_end: i64,
    /// 1.0 while playing a timeline, 0.0 otherwise
    pub speed: f64,
}

/// Externally owned playable content
pub trait Timeline: Send + Sync {
    fn id(&self) -> Uuid;

    /// Number of frames before the timeline wraps
    fn duration_frames(&self) -> u64;

    fn name(&self) -> &str;
}

impl fmt::Debug for dyn Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("duration_frames", &self.duration_frames())
            .finish()
    }
}
