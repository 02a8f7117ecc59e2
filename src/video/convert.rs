//! Pixel format conversion utilities
//!
//! Reshapes captured RGB24/RGBA frames into the layout and (even) size an
//! encoder backend asks for. Scaling is nearest-neighbour; colour conversion
//! uses integer BT.601 coefficients.

use crate::error::{AppError, Result};
use crate::video::format::{PixelFormat, Resolution};

/// Frame conversion capability bound to one source/destination geometry
pub trait FrameConverter: Send {
    /// Convert one frame, returning a view of the internal output buffer
    fn convert(&mut self, input: &[u8]) -> Result<&[u8]>;

    /// Destination pixel format
    fn output_format(&self) -> PixelFormat;

    /// Destination resolution
    fn output_resolution(&self) -> Resolution;
}

/// Software pixel converter (scale + colour space)
pub struct PixelConverter {
    src_format: PixelFormat,
    src_resolution: Resolution,
    dst_format: PixelFormat,
    dst_resolution: Resolution,
    /// Byte offset inside a source row for every destination column
    x_offsets: Vec<usize>,
    /// Byte offset of the source row for every destination row
    y_rows: Vec<usize>,
    /// Output buffer (reused across conversions)
    output: Vec<u8>,
}

impl PixelConverter {
    /// Create a converter from `src` to `dst`.
    ///
    /// Only packed RGB sources are accepted. Planar YUV destinations need even
    /// dimensions.
    pub fn new(
        src_resolution: Resolution,
        src_format: PixelFormat,
        dst_resolution: Resolution,
        dst_format: PixelFormat,
    ) -> Result<Self> {
        let src_bpp = src_format.bytes_per_pixel().ok_or_else(|| {
            AppError::BackendInitFailed(format!("unsupported converter source format {}", src_format))
        })?;

        if src_resolution.is_empty() || dst_resolution.is_empty() {
            return Err(AppError::BackendInitFailed(format!(
                "empty converter geometry: {} -> {}",
                src_resolution, dst_resolution
            )));
        }

        if dst_format.is_yuv() && (dst_resolution.width % 2 != 0 || dst_resolution.height % 2 != 0) {
            return Err(AppError::BackendInitFailed(format!(
                "{} output requires even dimensions, got {}",
                dst_format, dst_resolution
            )));
        }

        let src_w = src_resolution.width as u64;
        let src_h = src_resolution.height as u64;
        let dst_w = dst_resolution.width as u64;
        let dst_h = dst_resolution.height as u64;

        let x_offsets = (0..dst_w)
            .map(|x| ((x * src_w / dst_w).min(src_w - 1) as usize) * src_bpp)
            .collect();
        let row_stride = src_w as usize * src_bpp;
        let y_rows = (0..dst_h)
            .map(|y| ((y * src_h / dst_h).min(src_h - 1) as usize) * row_stride)
            .collect();

        Ok(Self {
            src_format,
            src_resolution,
            dst_format,
            dst_resolution,
            x_offsets,
            y_rows,
            output: vec![0u8; dst_format.frame_size(dst_resolution)],
        })
    }

    /// Expected input length in bytes
    pub fn input_len(&self) -> usize {
        self.src_format.frame_size(self.src_resolution)
    }

    /// Get output buffer length
    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    pub fn src_resolution(&self) -> Resolution {
        self.src_resolution
    }

    fn is_passthrough(&self) -> bool {
        self.src_format == self.dst_format && self.src_resolution == self.dst_resolution
    }

    fn write_packed(&mut self, input: &[u8]) {
        let src_bpp = self.src_format.bytes_per_pixel().unwrap_or(3);
        let dst_bpp = self.dst_format.bytes_per_pixel().unwrap_or(3);
        let width = self.dst_resolution.width as usize;

        for (y, &row) in self.y_rows.iter().enumerate() {
            for (x, &col) in self.x_offsets.iter().enumerate() {
                let s = row + col;
                let d = (y * width + x) * dst_bpp;
                self.output[d..d + 3].copy_from_slice(&input[s..s + 3]);
                if dst_bpp == 4 {
                    self.output[d + 3] = if src_bpp == 4 { input[s + 3] } else { 0xFF };
                }
            }
        }
    }

    fn write_yuv(&mut self, input: &[u8], interleaved: bool) {
        let width = self.dst_resolution.width as usize;
        let height = self.dst_resolution.height as usize;
        let y_size = width * height;
        let half_width = width / 2;
        let quarter = y_size / 4;

        let x_offsets = &self.x_offsets;
        let y_rows = &self.y_rows;
        let sample = |x: usize, y: usize| -> (i32, i32, i32) {
            let s = y_rows[y] + x_offsets[x];
            (input[s] as i32, input[s + 1] as i32, input[s + 2] as i32)
        };

        let (y_plane, chroma) = self.output.split_at_mut(y_size);

        for y in 0..height {
            for x in 0..width {
                let (r, g, b) = sample(x, y);
                y_plane[y * width + x] = luma(r, g, b);
            }
        }

        for cy in 0..height / 2 {
            for cx in 0..half_width {
                let (mut r, mut g, mut b) = (0, 0, 0);
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let (pr, pg, pb) = sample(cx * 2 + dx, cy * 2 + dy);
                    r += pr;
                    g += pg;
                    b += pb;
                }
                let (u, v) = chroma_uv(r / 4, g / 4, b / 4);
                let idx = cy * half_width + cx;
                if interleaved {
                    chroma[idx * 2] = u;
                    chroma[idx * 2 + 1] = v;
                } else {
                    chroma[idx] = u;
                    chroma[quarter + idx] = v;
                }
            }
        }
    }
}

impl FrameConverter for PixelConverter {
    fn convert(&mut self, input: &[u8]) -> Result<&[u8]> {
        let expected = self.input_len();
        if input.len() != expected {
            return Err(AppError::ConversionFailed(format!(
                "input buffer is {} bytes, expected {} for {} {}",
                input.len(),
                expected,
                self.src_format,
                self.src_resolution
            )));
        }

        if self.is_passthrough() {
            self.output.copy_from_slice(input);
            return Ok(&self.output);
        }

        match self.dst_format {
            PixelFormat::Rgb24 | PixelFormat::Rgba => self.write_packed(input),
            PixelFormat::Yuv420 => self.write_yuv(input, false),
            PixelFormat::Nv12 => self.write_yuv(input, true),
        }

        Ok(&self.output)
    }

    fn output_format(&self) -> PixelFormat {
        self.dst_format
    }

    fn output_resolution(&self) -> Resolution {
        self.dst_resolution
    }
}

fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

fn chroma_uv(r: i32, g: i32, b: i32) -> (u8, u8) {
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (u.clamp(0, 255) as u8, v.clamp(0, 255) as u8)
}
