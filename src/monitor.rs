//! Metrics sinks for scalars and image panels
//!
//! The training loop pushes windowed scalars ("loss", "dice_coef") and
//! diagnostic image panels through a `MetricsSink`. Two sinks ship:
//! `MemorySink` keeps records in memory for tests, `JsonlSink` appends
//! scalars to a JSONL file and writes image panels as PNG files.
//!
//! # Example
//!
//! ```
//! use segmentar::monitor::{MemorySink, MetricsSink};
//!
//! let mut sink = MemorySink::new();
//! sink.add_scalar("loss", 0.5, 10);
//! assert_eq!(sink.scalars()[0].value, 0.5);
//! ```

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for training telemetry
///
/// Emission failures must not abort training, so the methods are
/// infallible; sinks log and drop records they cannot persist.
pub trait MetricsSink {
    /// Record a scalar value at a global step
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize);

    /// Record an image panel, shape (channels, h, w) with values in [0, 1]
    fn add_image(&mut self, tag: &str, image: &Array3<f32>, step: usize);
}

/// A single scalar record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f32,
    pub step: usize,
}

/// An image record retained by [`MemorySink`]
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub tag: String,
    pub shape: (usize, usize, usize),
    pub step: usize,
}

/// In-memory sink, mostly for tests
#[derive(Debug, Default)]
pub struct MemorySink {
    scalars: Vec<ScalarRecord>,
    images: Vec<ImageRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All scalar records, in emission order
    pub fn scalars(&self) -> &[ScalarRecord] {
        &self.scalars
    }

    /// All image records, in emission order
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    /// Scalar records with the given tag
    pub fn scalars_tagged(&self, tag: &str) -> Vec<&ScalarRecord> {
        self.scalars.iter().filter(|r| r.tag == tag).collect()
    }
}

impl MetricsSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) {
        self.scalars.push(ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        });
    }

    fn add_image(&mut self, tag: &str, image: &Array3<f32>, step: usize) {
        self.images.push(ImageRecord {
            tag: tag.to_string(),
            shape: image.dim(),
            step,
        });
    }
}

/// File-backed sink: scalars to `scalars.jsonl`, image panels to PNG
pub struct JsonlSink {
    writer: BufWriter<File>,
    image_dir: PathBuf,
}

impl JsonlSink {
    /// Create a sink rooted at `dir`, creating directories as needed
    pub fn create(dir: &Path) -> crate::error::Result<Self> {
        let image_dir = dir.join("images");
        fs::create_dir_all(&image_dir)?;
        let file = File::create(dir.join("scalars.jsonl"))?;
        Ok(Self {
            writer: BufWriter::new(file),
            image_dir,
        })
    }

    /// Flush buffered scalar records to disk
    pub fn flush(&mut self) -> crate::error::Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn sanitize(tag: &str) -> String {
        tag.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl MetricsSink for JsonlSink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) {
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        };
        match serde_json::to_string(&record) {
            Ok(line) => {
                if let Err(e) = writeln!(self.writer, "{}", line) {
                    eprintln!("monitor: failed to write scalar '{}': {}", tag, e);
                }
            }
            Err(e) => eprintln!("monitor: failed to encode scalar '{}': {}", tag, e),
        }
    }

    fn add_image(&mut self, tag: &str, image: &Array3<f32>, step: usize) {
        let (c, h, w) = image.dim();
        if c == 0 || h == 0 || w == 0 {
            return;
        }

        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0) as u8;
        let buffer = if c >= 3 {
            // First three channels as RGB
            let mut buf = image::RgbImage::new(w as u32, h as u32);
            for y in 0..h {
                for x in 0..w {
                    buf.put_pixel(
                        x as u32,
                        y as u32,
                        image::Rgb([
                            to_byte(image[[0, y, x]]),
                            to_byte(image[[1, y, x]]),
                            to_byte(image[[2, y, x]]),
                        ]),
                    );
                }
            }
            image::DynamicImage::ImageRgb8(buf)
        } else {
            let mut buf = image::GrayImage::new(w as u32, h as u32);
            for y in 0..h {
                for x in 0..w {
                    buf.put_pixel(x as u32, y as u32, image::Luma([to_byte(image[[0, y, x]])]));
                }
            }
            image::DynamicImage::ImageLuma8(buf)
        };

        let path = self
            .image_dir
            .join(format!("{}_{}.png", Self::sanitize(tag), step));
        if let Err(e) = buffer.save(&path) {
            eprintln!("monitor: failed to save image '{}': {}", tag, e);
        }
    }
}
