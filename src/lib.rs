mod block;
mod debug;
mod error;
mod frame;
mod html;
mod measure;
mod metrics;
mod paginate;
mod print;
mod types;

pub use block::{Block, FlowBlock, TableBlock, TableData};
pub use error::FolioError;
pub use frame::{AddResult, Frame};
pub use measure::{FlowMeasurer, LayoutMeasurer, MeasureSurface};
pub use metrics::{PageMetrics, PaginationMetrics};
pub use print::{FilePrintSurface, PrintSummary, PrintSurface};
pub use types::{Margins, Pt, Size};

use debug::DebugLogger;
use paginate::Paginator;
use print::{ComposeContext, compose_document};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PageHeaderSpec {
    pub first: Option<String>,
    pub each: Option<String>,
    pub last: Option<String>,
    pub y_from_top: Pt,
}

#[derive(Debug, Clone)]
pub struct PageFooterSpec {
    pub first: Option<String>,
    pub each: Option<String>,
    pub last: Option<String>,
    pub y_from_bottom: Pt,
}

#[derive(Debug, Clone)]
pub enum WatermarkKind {
    Text(String),
    Image(String),
}

#[derive(Debug, Clone)]
pub struct WatermarkSpec {
    pub kind: WatermarkKind,
    pub opacity: f32,
    pub rotation_deg: f32,
}

impl WatermarkSpec {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: WatermarkKind::Text(text.into()),
            opacity: 0.15,
            rotation_deg: 0.0,
        }
    }

    pub fn image(path: impl Into<String>) -> Self {
        Self {
            kind: WatermarkKind::Image(path.into()),
            opacity: 0.15,
            rotation_deg: 0.0,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation_deg = degrees;
        self
    }
}

/// The engine. Owns page geometry, chrome, and the measurement capability;
/// built once and reused across print actions.
pub struct Folio {
    page_size: Size,
    margins: Margins,
    measurer: Arc<dyn LayoutMeasurer>,
    header: Option<PageHeaderSpec>,
    footer: Option<PageFooterSpec>,
    watermark: Option<WatermarkSpec>,
    page_number_format: Option<String>,
    debug: Option<Arc<DebugLogger>>,
}

#[derive(Clone)]
pub struct FolioBuilder {
    page_size: Size,
    margins: Margins,
    measurer: Option<Arc<dyn LayoutMeasurer>>,
    header: Option<PageHeaderSpec>,
    footer: Option<PageFooterSpec>,
    watermark: Option<WatermarkSpec>,
    page_number_format: Option<String>,
    debug_path: Option<PathBuf>,
}

impl Folio {
    pub fn builder() -> FolioBuilder {
        FolioBuilder {
            page_size: Size::a4(),
            margins: Margins::all(Pt::from_cm(2.0)),
            measurer: None,
            header: None,
            footer: None,
            watermark: None,
            page_number_format: Some("{page} of {pages}".to_string()),
            debug_path: None,
        }
    }

    /// The printable content region: page size minus the simulated margins.
    pub fn content_size(&self) -> Size {
        Size {
            width: self.page_size.width - self.margins.left - self.margins.right,
            height: self.page_size.height - self.margins.top - self.margins.bottom,
        }
    }

    pub fn paginate(&self, html: &str) -> Result<Vec<String>, FolioError> {
        self.paginate_with_metrics(html).map(|(pages, _)| pages)
    }

    pub fn paginate_with_metrics(
        &self,
        html: &str,
    ) -> Result<(Vec<String>, PaginationMetrics), FolioError> {
        Paginator {
            content: self.content_size(),
            measurer: self.measurer.as_ref(),
            debug: self.debug.as_deref(),
        }
        .run(html)
    }

    /// Paginates independent documents concurrently. Every document gets its
    /// own measurement surface, so runs cannot interfere with each other.
    pub fn paginate_many_parallel(
        &self,
        documents: &[String],
    ) -> Result<Vec<Vec<String>>, FolioError> {
        documents
            .par_iter()
            .map(|document| self.paginate(document))
            .collect()
    }

    pub fn compose(&self, pages: &[String]) -> Result<String, FolioError> {
        compose_document(
            pages,
            &ComposeContext {
                page_size: self.page_size,
                margins: self.margins,
                header: self.header.as_ref(),
                footer: self.footer.as_ref(),
                watermark: self.watermark.as_ref(),
                page_number_format: self.page_number_format.as_deref(),
            },
        )
    }

    /// Paginate, compose, and hand the result to the host's print surface.
    pub fn print(
        &self,
        html: &str,
        surface: &mut dyn PrintSurface,
    ) -> Result<PrintSummary, FolioError> {
        let pages = self.paginate(html)?;
        let document = self.compose(&pages)?;
        surface.present(&document)?;
        Ok(PrintSummary {
            page_count: pages.len(),
        })
    }
}

impl FolioBuilder {
    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn measurer(mut self, measurer: impl LayoutMeasurer + 'static) -> Self {
        self.measurer = Some(Arc::new(measurer));
        self
    }

    pub fn page_header(mut self, spec: PageHeaderSpec) -> Self {
        self.header = Some(spec);
        self
    }

    pub fn page_footer(mut self, spec: PageFooterSpec) -> Self {
        self.footer = Some(spec);
        self
    }

    pub fn watermark(mut self, spec: WatermarkSpec) -> Self {
        self.watermark = Some(spec);
        self
    }

    pub fn page_number_format(mut self, format: impl Into<String>) -> Self {
        self.page_number_format = Some(format.into());
        self
    }

    pub fn without_page_numbers(mut self) -> Self {
        self.page_number_format = None;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Folio, FolioError> {
        let content_width =
            self.page_size.width - self.margins.left - self.margins.right;
        let content_height =
            self.page_size.height - self.margins.top - self.margins.bottom;
        if content_width <= Pt::ZERO || content_height <= Pt::ZERO {
            return Err(FolioError::InvalidConfiguration(
                "margins leave no content region on the page".to_string(),
            ));
        }
        if let Some(watermark) = &self.watermark {
            if !(watermark.opacity > 0.0 && watermark.opacity <= 1.0) {
                return Err(FolioError::InvalidConfiguration(
                    "watermark opacity must be within (0, 1]".to_string(),
                ));
            }
        }
        if let Some(format) = &self.page_number_format {
            if !format.contains("{page}") {
                return Err(FolioError::InvalidConfiguration(
                    "page_number_format must contain the {page} placeholder".to_string(),
                ));
            }
        }
        let debug = match &self.debug_path {
            Some(path) => Some(Arc::new(DebugLogger::new(path)?)),
            None => None,
        };
        Ok(Folio {
            page_size: self.page_size,
            margins: self.margins,
            measurer: self
                .measurer
                .unwrap_or_else(|| Arc::new(FlowMeasurer::new())),
            header: self.header,
            footer: self.footer,
            watermark: self.watermark,
            page_number_format: self.page_number_format,
            debug,
        })
    }
}
