//! Image file reader and writer for 2-D rasters.
//!
//! The reader learns the image extent from the file header during the
//! information pass, without decoding. Pixels are decoded once, on the first
//! update that needs them, and then served region by region. The writer is a
//! [`RasterSink`]: streamed pieces are pasted into one buffer that is encoded
//! when the stream finishes.

use crate::core::context::{ExecutionContext, InformationContext, ThreadContext};
use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::PortDefinition;
use crate::core::raster::{Raster, RasterSlabMut, SampleType};
use crate::core::region::Region;
use crate::streaming::sink::RasterSink;
use image::{ColorType, DynamicImage, ImageBuffer, ImageDecoder, ImageReader};
use log::{debug, info};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn pixel_format(color: ColorType) -> PipelineResult<(usize, SampleType)> {
    let format = match color {
        ColorType::L8 => (1, SampleType::U8),
        ColorType::La8 => (2, SampleType::U8),
        ColorType::Rgb8 => (3, SampleType::U8),
        ColorType::Rgba8 => (4, SampleType::U8),
        ColorType::L16 => (1, SampleType::U16),
        ColorType::La16 => (2, SampleType::U16),
        ColorType::Rgb16 => (3, SampleType::U16),
        ColorType::Rgba16 => (4, SampleType::U16),
        ColorType::Rgb32F => (3, SampleType::F32),
        ColorType::Rgba32F => (4, SampleType::F32),
        other => {
            return Err(PipelineError::configuration(
                "path",
                format!("unsupported pixel format {:?}", other),
            ))
        }
    };
    Ok(format)
}

fn to_u32(extent: u64) -> PipelineResult<u32> {
    u32::try_from(extent)
        .map_err(|_| PipelineError::Other(format!("extent {} does not fit an image", extent)))
}

/// Pipeline source reading an image file.
pub struct ImageFileReader {
    path: PathBuf,
    region: Region<2>,
    components: usize,
    sample_type: SampleType,
    decoded: Mutex<Option<Arc<Raster<2>>>>,
    decodes: Arc<AtomicUsize>,
}

impl ImageFileReader {
    /// Open `path` and read its header.
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let decoder = ImageReader::open(&path)?
            .with_guessed_format()?
            .into_decoder()?;
        let (width, height) = decoder.dimensions();
        let (components, sample_type) = pixel_format(decoder.color_type())?;
        debug!(
            "Header of {}: {}x{}, {} components of {}",
            path.display(),
            width,
            height,
            components,
            sample_type
        );
        Ok(Self {
            path,
            region: Region::from_size([u64::from(width), u64::from(height)]),
            components,
            sample_type,
            decoded: Mutex::new(None),
            decodes: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Largest possible region, from the header.
    pub fn region(&self) -> Region<2> {
        self.region
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Shared count of full decodes, valid after the reader is moved into a
    /// graph.
    pub fn decode_counter(&self) -> Arc<AtomicUsize> {
        self.decodes.clone()
    }

    fn decode(&self) -> PipelineResult<Raster<2>> {
        let image = ImageReader::open(&self.path)?.with_guessed_format()?.decode()?;
        let data: Vec<f64> = match (self.sample_type, self.components) {
            (SampleType::U8, 1) => image.into_luma8().into_raw().into_iter().map(f64::from).collect(),
            (SampleType::U8, 2) => image.into_luma_alpha8().into_raw().into_iter().map(f64::from).collect(),
            (SampleType::U8, 3) => image.into_rgb8().into_raw().into_iter().map(f64::from).collect(),
            (SampleType::U8, _) => image.into_rgba8().into_raw().into_iter().map(f64::from).collect(),
            (SampleType::U16, 1) => image.into_luma16().into_raw().into_iter().map(f64::from).collect(),
            (SampleType::U16, 2) => image.into_luma_alpha16().into_raw().into_iter().map(f64::from).collect(),
            (SampleType::U16, 3) => image.into_rgb16().into_raw().into_iter().map(f64::from).collect(),
            (SampleType::U16, _) => image.into_rgba16().into_raw().into_iter().map(f64::from).collect(),
            (_, 3) => image.into_rgb32f().into_raw().into_iter().map(f64::from).collect(),
            _ => image.into_rgba32f().into_raw().into_iter().map(f64::from).collect(),
        };
        Raster::from_data(self.region, self.components, self.sample_type, data)
    }
}

impl FilterNode<2> for ImageFileReader {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("image_file_reader", "Image File Reader")
            .category(Category::Source)
            .description("Reads a PNG, TIFF or JPEG file")
            .output(PortDefinition::new("image"))
            .build()
    }

    fn generate_output_information(
        &self,
        _ctx: &InformationContext<'_, 2>,
    ) -> PipelineResult<Vec<ImageDescriptor<2>>> {
        Ok(vec![ImageDescriptor::new(
            self.region,
            self.components,
            self.sample_type,
        )])
    }

    fn before_threaded_generate_data(&self, ctx: &ExecutionContext<'_, 2>) -> PipelineResult<()> {
        let mut decoded = self.decoded.lock();
        if decoded.is_none() {
            info!("Decoding {} for node {}", self.path.display(), ctx.node_id);
            *decoded = Some(Arc::new(self.decode()?));
            self.decodes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, 2>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, 2>],
    ) -> PipelineResult<()> {
        let decoded = self.decoded.lock().clone().ok_or_else(|| {
            PipelineError::inconsistent(ctx.node_id, "image was not decoded before dispatch")
        })?;
        let out = &mut outputs[0];
        out.copy_from(&decoded);
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

/// Samples of the image being written, already at the file's depth.
enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

/// The whole output region, filled piece by piece.
struct Canvas {
    region: Region<2>,
    components: usize,
    samples: Samples,
}

impl Canvas {
    fn new(region: Region<2>, components: usize, sample_type: SampleType) -> Self {
        let len = region.number_of_pixels() as usize * components;
        let samples = match sample_type {
            SampleType::U16 => Samples::U16(vec![0; len]),
            _ => Samples::U8(vec![0; len]),
        };
        Self {
            region,
            components,
            samples,
        }
    }

    fn sample_type(&self) -> SampleType {
        match self.samples {
            Samples::U8(_) => SampleType::U8,
            Samples::U16(_) => SampleType::U16,
        }
    }

    /// Quantize the overlap of `piece` into the canvas.
    fn paste(&mut self, piece: &Raster<2>) -> PipelineResult<()> {
        if piece.components() != self.components {
            return Err(PipelineError::Other(format!(
                "piece has {} components, image has {}",
                piece.components(),
                self.components
            )));
        }
        let sample_type = self.sample_type();
        let overlap = piece.region().intersect(&self.region);
        for index in overlap.iter() {
            let Some(values) = piece.get(&index) else {
                continue;
            };
            let base = self.region.linear_offset(&index) * self.components;
            match &mut self.samples {
                Samples::U8(data) => {
                    for (slot, &v) in data[base..base + self.components].iter_mut().zip(values) {
                        *slot = sample_type.quantize(v) as u8;
                    }
                }
                Samples::U16(data) => {
                    for (slot, &v) in data[base..base + self.components].iter_mut().zip(values) {
                        *slot = sample_type.quantize(v) as u16;
                    }
                }
            }
        }
        Ok(())
    }

    fn encode(self) -> PipelineResult<DynamicImage> {
        let size = self.region.size();
        let (width, height) = (to_u32(size[0])?, to_u32(size[1])?);
        let image = match self.samples {
            Samples::U8(raw) => match self.components {
                1 => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
                2 => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageLumaA8),
                3 => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
                _ => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
            },
            Samples::U16(raw) => match self.components {
                1 => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageLuma16),
                2 => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageLumaA16),
                3 => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgb16),
                _ => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgba16),
            },
        };
        image.ok_or_else(|| PipelineError::Other("sample buffer does not match image size".into()))
    }
}

/// Sink encoding the streamed pieces into an image file.
///
/// `U16` images are written with 16 bits per sample and everything else with
/// 8, unless [`with_sample_type`](Self::with_sample_type) says otherwise.
/// One to four components are written as grey, grey+alpha, RGB or RGBA.
/// Pieces are held at the file's depth until the stream finishes.
pub struct ImageFileWriter {
    path: PathBuf,
    sample_type: Option<SampleType>,
    canvas: Option<Canvas>,
}

impl ImageFileWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sample_type: None,
            canvas: None,
        }
    }

    /// Force 8-bit (`U8`) or 16-bit (`U16`) samples.
    pub fn with_sample_type(mut self, sample_type: SampleType) -> PipelineResult<Self> {
        if !matches!(sample_type, SampleType::U8 | SampleType::U16) {
            return Err(PipelineError::configuration(
                "sample_type",
                format!("cannot write {} samples, use u8 or u16", sample_type),
            ));
        }
        self.sample_type = Some(sample_type);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSink<2> for ImageFileWriter {
    fn begin(&mut self, descriptor: &ImageDescriptor<2>) -> PipelineResult<()> {
        let components = descriptor.number_of_components();
        if !(1..=4).contains(&components) {
            return Err(PipelineError::configuration(
                "components",
                format!("cannot write {} components to an image file", components),
            ));
        }
        let sample_type = self.sample_type.unwrap_or(match descriptor.sample_type() {
            SampleType::U16 => SampleType::U16,
            _ => SampleType::U8,
        });
        let region = descriptor.requested_region();
        to_u32(region.size()[0])?;
        to_u32(region.size()[1])?;
        self.canvas = Some(Canvas::new(region, components, sample_type));
        Ok(())
    }

    fn write(&mut self, piece: &Raster<2>) -> PipelineResult<()> {
        self.canvas
            .as_mut()
            .ok_or_else(|| PipelineError::Other("write before begin".into()))?
            .paste(piece)
    }

    fn finish(&mut self) -> PipelineResult<()> {
        let canvas = self
            .canvas
            .take()
            .ok_or_else(|| PipelineError::Other("finish before begin".into()))?;
        info!(
            "Writing {} ({} components of {})",
            self.path.display(),
            canvas.components,
            canvas.sample_type()
        );
        canvas.encode()?.save(&self.path)?;
        Ok(())
    }
}
