//! PDF page rasterisation.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::{ScratchResourceError, ServiceError, ServiceResult};

/// Output settings for rendered pages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub dpi: f32,
    pub jpeg_quality: u8,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn page_count(&self, pdf: &Path) -> ServiceResult<u32>;

    /// Render the 0-based `page_index` as a JPEG at `dest`.
    async fn render_page(&self, pdf: &Path, page_index: u32, dest: &Path) -> ServiceResult<()>;
}

/// Renders with PDFium on the blocking pool
pub struct PdfiumRenderer {
    options: RenderOptions,
}

impl PdfiumRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Fail fast at startup if the library cannot be bound.
    pub fn check_available() -> ServiceResult<()> {
        shared_pdfium().map(|_| ())
    }
}

static PDFIUM: OnceLock<Pdfium> = OnceLock::new();
static PDFIUM_BIND: Mutex<()> = Mutex::new(());

/// The process-wide PDFium binding, bound on first use.
fn shared_pdfium() -> ServiceResult<&'static Pdfium> {
    init_once(&PDFIUM, &PDFIUM_BIND, create_pdfium)
}

/// Initialize `cell` at most once. A failed `init` leaves it empty so a
/// later call can retry.
fn init_once<'a, T>(
    cell: &'a OnceLock<T>,
    lock: &Mutex<()>,
    init: impl FnOnce() -> ServiceResult<T>,
) -> ServiceResult<&'a T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    // Only one thread binds; a second binding would tear down the first on drop
    let _guard = lock.lock().map_err(|_| ServiceError::Internal {
        message: "PDFium bind lock poisoned".to_string(),
    })?;
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

/// Bind PDFium from the working directory, the vendored copy, or the system.
fn create_pdfium() -> ServiceResult<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ScratchResourceError::RendererUnavailable {
            message: format!("Failed to load PDFium library: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

fn render_error(page: u32, message: String) -> ServiceError {
    ServiceError::Scratch(ScratchResourceError::Render { page, message })
}

fn count_pages(pdf: &Path) -> ServiceResult<u32> {
    let pdfium = shared_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| render_error(0, format!("Failed to load PDF: {}", e)))?;
    Ok(u32::from(document.pages().len()))
}

fn render_to_jpeg(
    pdf: &Path,
    page_index: u32,
    dest: &Path,
    options: RenderOptions,
) -> ServiceResult<()> {
    let page_number = page_index + 1;
    let pdfium = shared_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| render_error(page_number, format!("Failed to load PDF: {}", e)))?;

    let index = u16::try_from(page_index)
        .map_err(|_| render_error(page_number, "page index out of range".to_string()))?;
    let page = document
        .pages()
        .get(index)
        .map_err(|e| render_error(page_number, format!("Failed to get page: {}", e)))?;

    // Page sizes are in points (1/72 inch)
    let scale = options.dpi / 72.0;
    let width = (page.width().value * scale).ceil() as i32;
    let height = (page.height().value * scale).ceil() as i32;

    let config = PdfRenderConfig::new()
        .set_target_width(width)
        .set_target_height(height);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| render_error(page_number, format!("Failed to render page: {}", e)))?;
    let rgb = bitmap.as_image().to_rgb8();

    let file = File::create(dest).map_err(ScratchResourceError::Io)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, options.jpeg_quality)
        .encode_image(&rgb)
        .map_err(|e| ScratchResourceError::Encode {
            page: page_number,
            source: e,
        })?;

    debug!(page = page_number, width, height, dest = %dest.display(), "Rendered page");
    Ok(())
}

async fn run_blocking<T, F>(task: F) -> ServiceResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Render task failed: {}", e),
        })?
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn page_count(&self, pdf: &Path) -> ServiceResult<u32> {
        let pdf = pdf.to_path_buf();
        run_blocking(move || count_pages(&pdf)).await
    }

    async fn render_page(&self, pdf: &Path, page_index: u32, dest: &Path) -> ServiceResult<()> {
        let pdf: PathBuf = pdf.to_path_buf();
        let dest: PathBuf = dest.to_path_buf();
        let options = self.options;
        run_blocking(move || render_to_jpeg(&pdf, page_index, &dest, options)).await
    }
}
