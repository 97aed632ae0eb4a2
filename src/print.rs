use crate::error::FolioError;
use crate::types::{Margins, Pt, Size};
use crate::{PageFooterSpec, PageHeaderSpec, WatermarkKind, WatermarkSpec};
use base64::Engine;
use std::path::PathBuf;

/// Host boundary that shows the composed document and drives the actual
/// print interaction. Failures surface to the caller; nothing is retried.
pub trait PrintSurface {
    fn present(&mut self, document_html: &str) -> Result<(), FolioError>;
}

/// Writes the composed document to a file, for headless hosts and tests.
pub struct FilePrintSurface {
    path: PathBuf,
}

impl FilePrintSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PrintSurface for FilePrintSurface {
    fn present(&mut self, document_html: &str) -> Result<(), FolioError> {
        std::fs::write(&self.path, document_html).map_err(|err| {
            FolioError::SurfaceUnavailable(format!(
                "cannot write {}: {err}",
                self.path.display()
            ))
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrintSummary {
    pub page_count: usize,
}

pub(crate) struct ComposeContext<'a> {
    pub page_size: Size,
    pub margins: Margins,
    pub header: Option<&'a PageHeaderSpec>,
    pub footer: Option<&'a PageFooterSpec>,
    pub watermark: Option<&'a WatermarkSpec>,
    pub page_number_format: Option<&'a str>,
}

/// Builds the standalone printable document: one fixed-size container per
/// fragment, chrome regions pinned inside the simulated margins, and print
/// rules that keep the engine's row-level decisions intact on paper.
pub(crate) fn compose_document(
    pages: &[String],
    ctx: &ComposeContext<'_>,
) -> Result<String, FolioError> {
    let watermark_html = match ctx.watermark {
        Some(spec) => Some(watermark_markup(spec)?),
        None => None,
    };

    let mut out = String::with_capacity(pages.iter().map(String::len).sum::<usize>() + 2048);
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");
    out.push_str(&page_styles(ctx));
    out.push_str("</style>\n</head>\n<body>\n");

    let total = pages.len();
    for (idx0, fragment) in pages.iter().enumerate() {
        let page_number = idx0 + 1;
        out.push_str("<div class=\"folio-page\">\n");
        if let Some(markup) = &watermark_html {
            out.push_str(markup);
        }
        if let Some(spec) = ctx.header {
            if let Some(template) = select_template(&spec.first, &spec.each, &spec.last, page_number, total)
            {
                out.push_str("<div class=\"folio-header\">");
                out.push_str(&substitute_counters(template, page_number, total));
                out.push_str("</div>\n");
            }
        }
        out.push_str("<div class=\"folio-content\">\n");
        out.push_str(fragment);
        out.push_str("\n</div>\n");

        let footer_template = ctx.footer.and_then(|spec| {
            select_template(&spec.first, &spec.each, &spec.last, page_number, total)
        });
        if footer_template.is_some() || ctx.page_number_format.is_some() {
            out.push_str("<div class=\"folio-footer\">");
            if let Some(template) = footer_template {
                out.push_str(&substitute_counters(template, page_number, total));
            }
            if let Some(format) = ctx.page_number_format {
                out.push_str("<div class=\"folio-pageno\">");
                out.push_str(&substitute_counters(format, page_number, total));
                out.push_str("</div>");
            }
            out.push_str("</div>\n");
        }
        out.push_str("</div>\n");
    }

    out.push_str("</body>\n</html>\n");
    Ok(out)
}

// Same template choice the header/footer chrome has always had: `first`
// beats `each` on page 1, `last` beats `each` on the final page.
fn select_template<'a>(
    first: &'a Option<String>,
    each: &'a Option<String>,
    last: &'a Option<String>,
    page_number: usize,
    total_pages: usize,
) -> Option<&'a str> {
    if total_pages == 1 {
        first.as_deref().or(last.as_deref())
    } else if page_number == 1 {
        first.as_deref()
    } else if page_number == total_pages {
        last.as_deref().or(each.as_deref())
    } else {
        each.as_deref()
    }
}

fn substitute_counters(template: &str, page_number: usize, total_pages: usize) -> String {
    template
        .replace("{page}", &page_number.to_string())
        .replace("{pages}", &total_pages.to_string())
}

fn watermark_markup(spec: &WatermarkSpec) -> Result<String, FolioError> {
    let opacity = spec.opacity;
    let rotation = spec.rotation_deg;
    match &spec.kind {
        WatermarkKind::Text(text) => Ok(format!(
            "<div class=\"folio-watermark\" style=\"opacity:{opacity};transform:translate(-50%,-50%) rotate({rotation}deg)\">{}</div>\n",
            escape_text(text)
        )),
        WatermarkKind::Image(path) => {
            let bytes = std::fs::read(path)?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            Ok(format!(
                "<img class=\"folio-watermark\" style=\"opacity:{opacity};transform:translate(-50%,-50%) rotate({rotation}deg)\" src=\"data:{};base64,{encoded}\">\n",
                mime_for_path(path)
            ))
        }
    }
}

fn mime_for_path(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "image/png"
    }
}

fn page_styles(ctx: &ComposeContext<'_>) -> String {
    let page_w = fmt_pt(ctx.page_size.width);
    let page_h = fmt_pt(ctx.page_size.height);
    let top = fmt_pt(ctx.margins.top);
    let right = fmt_pt(ctx.margins.right);
    let bottom = fmt_pt(ctx.margins.bottom);
    let left = fmt_pt(ctx.margins.left);
    let header_y = fmt_pt(
        ctx.header
            .map(|spec| spec.y_from_top)
            .unwrap_or(Pt::from_f32(18.0)),
    );
    let footer_y = fmt_pt(
        ctx.footer
            .map(|spec| spec.y_from_bottom)
            .unwrap_or(Pt::from_f32(18.0)),
    );
    format!(
        "@page {{ size: {page_w} {page_h}; margin: 0; }}\n\
         html, body {{ margin: 0; padding: 0; }}\n\
         .folio-page {{ position: relative; width: {page_w}; height: {page_h}; \
overflow: hidden; page-break-after: always; }}\n\
         .folio-content {{ position: absolute; top: {top}; right: {right}; \
bottom: {bottom}; left: {left}; z-index: 1; }}\n\
         .folio-header {{ position: absolute; top: {header_y}; left: {left}; \
right: {right}; z-index: 2; }}\n\
         .folio-footer {{ position: absolute; bottom: {footer_y}; left: {left}; \
right: {right}; z-index: 2; }}\n\
         .folio-watermark {{ position: absolute; top: 50%; left: 50%; \
max-width: 70%; z-index: 0; }}\n\
         .folio-content thead {{ display: table-header-group; }}\n\
         .folio-content tr {{ page-break-inside: avoid; }}\n"
    )
}

fn fmt_pt(value: Pt) -> String {
    format!("{:.2}pt", value.to_f32())
}

fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
