use crate::error::FolioError;
use crate::types::Pt;
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use std::sync::Arc;

/// Capability that opens one isolated measurement surface per pagination
/// call. Opening may fail (no usable metrics); pagination reports that
/// failure instead of guessing heights.
pub trait LayoutMeasurer: Send + Sync {
    fn open_surface(&self, content_width: Pt) -> Result<Box<dyn MeasureSurface>, FolioError>;
}

/// Scoped measurement context. Owned by a single pagination call and dropped
/// on every exit path.
pub trait MeasureSurface {
    /// Height the fragment would occupy when laid out at the surface width.
    fn content_height(&mut self, fragment_html: &str) -> Result<Pt, FolioError>;
}

/// Deterministic flow-layout calculator: greedy word wrap against glyph
/// advances, per-tag vertical spacing, table row heights from per-column
/// cell wrapping. Advances come from a registered font face or from the
/// built-in Helvetica table.
pub struct FlowMeasurer {
    base_font_size: Pt,
    line_height: f32,
    font_bytes: Option<Arc<Vec<u8>>>,
}

impl FlowMeasurer {
    pub fn new() -> Self {
        Self {
            base_font_size: Pt::from_f32(12.0),
            line_height: 1.4,
            font_bytes: None,
        }
    }

    pub fn with_base_font_size(mut self, size: Pt) -> Self {
        self.base_font_size = size;
        self
    }

    pub fn with_line_height(mut self, factor: f32) -> Self {
        self.line_height = factor;
        self
    }

    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.font_bytes = Some(Arc::new(bytes));
        self
    }
}

impl Default for FlowMeasurer {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutMeasurer for FlowMeasurer {
    fn open_surface(&self, content_width: Pt) -> Result<Box<dyn MeasureSurface>, FolioError> {
        if content_width <= Pt::ZERO {
            return Err(FolioError::MeasurementUnavailable(
                "content width must be positive".to_string(),
            ));
        }
        if self.base_font_size <= Pt::ZERO || self.line_height <= 0.0 {
            return Err(FolioError::MeasurementUnavailable(
                "font size and line height must be positive".to_string(),
            ));
        }
        let advances = match &self.font_bytes {
            Some(bytes) => AdvanceTable::from_font_bytes(bytes)?,
            None => AdvanceTable::builtin(),
        };
        Ok(Box::new(FlowSurface {
            width: content_width,
            font_size: self.base_font_size,
            line_height: self.line_height,
            advances,
        }))
    }
}

/// Glyph advances in 1000-unit em space for Basic Latin, with a fallback
/// width for everything outside the table.
struct AdvanceTable {
    widths: [u16; 95],
    missing: u16,
}

// Helvetica AFM advances for 0x20..=0x7E.
const BUILTIN_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278,
    333, 278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667, 611,
    778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667,
    611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

impl AdvanceTable {
    fn builtin() -> Self {
        Self {
            widths: BUILTIN_WIDTHS,
            missing: 556,
        }
    }

    fn from_font_bytes(bytes: &[u8]) -> Result<Self, FolioError> {
        let face = ttf_parser::Face::parse(bytes, 0)
            .map_err(|err| FolioError::MeasurementUnavailable(format!("font face rejected: {err}")))?;
        let units = face.units_per_em().max(1) as i64;
        let mut widths = [0u16; 95];
        let mut sum = 0u64;
        let mut covered = 0u64;
        for (idx, slot) in widths.iter_mut().enumerate() {
            let ch = (0x20 + idx as u8) as char;
            let advance = face
                .glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .unwrap_or(0);
            let scaled = (((advance as i64) * 1000 + (units / 2)) / units) as u16;
            *slot = scaled;
            if scaled > 0 {
                sum += scaled as u64;
                covered += 1;
            }
        }
        if covered == 0 {
            return Err(FolioError::MeasurementUnavailable(
                "font face has no advances for basic latin".to_string(),
            ));
        }
        Ok(Self {
            widths,
            missing: (sum / covered) as u16,
        })
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        if (0x20..=0x7E).contains(&code) {
            self.widths[(code - 0x20) as usize]
        } else {
            self.missing
        }
    }

    fn text_width(&self, font_size: Pt, text: &str) -> Pt {
        let mut total_units: i32 = 0;
        for ch in text.chars() {
            total_units = total_units.saturating_add(self.advance_for_char(ch) as i32);
        }
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }
}

struct FlowSurface {
    width: Pt,
    font_size: Pt,
    line_height: f32,
    advances: AdvanceTable,
}

/// Vertical extent of one block: collapsible margins around a fixed height.
struct BlockExtent {
    margin_top: Pt,
    height: Pt,
    margin_bottom: Pt,
}

struct TagMetrics {
    scale: f32,
    margin_top_em: f32,
    margin_bottom_em: f32,
    indent: Pt,
}

fn tag_metrics(tag: &str) -> TagMetrics {
    let (scale, top, bottom, indent) = match tag {
        "h1" => (2.0, 0.67, 0.67, 0.0),
        "h2" => (1.5, 0.83, 0.83, 0.0),
        "h3" => (1.17, 1.0, 1.0, 0.0),
        "h4" => (1.0, 1.33, 1.33, 0.0),
        "h5" => (0.83, 1.67, 1.67, 0.0),
        "h6" => (0.67, 2.33, 2.33, 0.0),
        "p" | "pre" => (1.0, 1.0, 1.0, 0.0),
        "blockquote" => (1.0, 1.0, 1.0, 30.0),
        "ul" | "ol" => (1.0, 1.0, 1.0, 30.0),
        _ => (1.0, 0.0, 0.0, 0.0),
    };
    TagMetrics {
        scale,
        margin_top_em: top,
        margin_bottom_em: bottom,
        indent: Pt::from_f32(indent),
    }
}

const BLOCK_TAGS: [&str; 18] = [
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "table", "blockquote", "pre", "hr",
    "div", "section", "article", "figure",
];

impl MeasureSurface for FlowSurface {
    fn content_height(&mut self, fragment_html: &str) -> Result<Pt, FolioError> {
        if fragment_html.trim().is_empty() {
            return Ok(Pt::ZERO);
        }
        let document = kuchiki::parse_html().one(fragment_html);
        let root = match document.select_first("body") {
            Ok(body) => body.as_node().clone(),
            Err(()) => document,
        };
        Ok(self.sequence_height(root.children(), self.width))
    }
}

impl FlowSurface {
    fn em(&self, factor: f32) -> Pt {
        self.font_size * factor
    }

    fn line_pt(&self, scale: f32) -> Pt {
        self.font_size * (scale * self.line_height)
    }

    /// Stacks sibling blocks, collapsing adjacent vertical margins the way
    /// block flow does.
    fn sequence_height(&self, nodes: impl Iterator<Item = NodeRef>, width: Pt) -> Pt {
        let mut total = Pt::ZERO;
        let mut pending_margin = Pt::ZERO;
        let mut first = true;
        for node in nodes {
            let Some(extent) = self.block_extent(&node, width) else {
                continue;
            };
            let gap = if first {
                extent.margin_top
            } else {
                pending_margin.max(extent.margin_top)
            };
            total += gap + extent.height;
            pending_margin = extent.margin_bottom;
            first = false;
        }
        if !first {
            total += pending_margin;
        }
        total
    }

    fn block_extent(&self, node: &NodeRef, width: Pt) -> Option<BlockExtent> {
        match node.data() {
            NodeData::Text(text) => {
                let text = text.borrow();
                if text.trim().is_empty() {
                    return None;
                }
                let lines = self.wrapped_line_count(&text, width, self.font_size);
                Some(BlockExtent {
                    margin_top: Pt::ZERO,
                    height: self.line_pt(1.0) * (lines as i32),
                    margin_bottom: Pt::ZERO,
                })
            }
            NodeData::Element(el) => {
                let tag = el.name.local.as_ref().to_ascii_lowercase();
                match tag.as_str() {
                    "table" => Some(BlockExtent {
                        margin_top: Pt::ZERO,
                        height: self.table_height(node, width),
                        margin_bottom: Pt::ZERO,
                    }),
                    "hr" => Some(BlockExtent {
                        margin_top: self.em(0.5),
                        height: Pt::from_f32(2.0),
                        margin_bottom: self.em(0.5),
                    }),
                    "br" => Some(BlockExtent {
                        margin_top: Pt::ZERO,
                        height: self.line_pt(1.0),
                        margin_bottom: Pt::ZERO,
                    }),
                    "ul" | "ol" => {
                        let metrics = tag_metrics(&tag);
                        let inner = (width - metrics.indent).max(Pt::ZERO);
                        let mut height = Pt::ZERO;
                        for item in node.children() {
                            let Some(item_el) = item.as_element() else {
                                continue;
                            };
                            if !item_el.name.local.as_ref().eq_ignore_ascii_case("li") {
                                continue;
                            }
                            height += self.item_height(&item, inner);
                        }
                        Some(BlockExtent {
                            margin_top: self.em(metrics.margin_top_em),
                            height,
                            margin_bottom: self.em(metrics.margin_bottom_em),
                        })
                    }
                    "img" => Some(BlockExtent {
                        margin_top: Pt::ZERO,
                        height: image_height(el),
                        margin_bottom: Pt::ZERO,
                    }),
                    _ => {
                        let metrics = tag_metrics(&tag);
                        let inner = (width - metrics.indent).max(Pt::ZERO);
                        let height = if self.has_block_children(node) {
                            self.sequence_height(node.children(), inner)
                        } else {
                            self.text_height(node, inner, metrics.scale)
                        };
                        Some(BlockExtent {
                            margin_top: self.em(metrics.margin_top_em),
                            height,
                            margin_bottom: self.em(metrics.margin_bottom_em),
                        })
                    }
                }
            }
            _ => None,
        }
    }

    fn item_height(&self, item: &NodeRef, width: Pt) -> Pt {
        if self.has_block_children(item) {
            self.sequence_height(item.children(), width)
        } else {
            self.text_height(item, width, 1.0)
        }
    }

    fn text_height(&self, node: &NodeRef, width: Pt, scale: f32) -> Pt {
        let mut text = String::new();
        collect_text(node, &mut text);
        if text.trim().is_empty() {
            return Pt::ZERO;
        }
        let lines = self.wrapped_line_count(&text, width, self.font_size * scale);
        self.line_pt(scale) * (lines as i32)
    }

    fn has_block_children(&self, node: &NodeRef) -> bool {
        node.children().any(|child| {
            child
                .as_element()
                .map(|el| {
                    let tag = el.name.local.as_ref().to_ascii_lowercase();
                    BLOCK_TAGS.contains(&tag.as_str())
                })
                .unwrap_or(false)
        })
    }

    fn wrapped_line_count(&self, text: &str, avail: Pt, font_size: Pt) -> usize {
        if avail <= Pt::ZERO {
            return text.split('\n').count().max(1);
        }
        let space = self.advances.text_width(font_size, " ");
        let mut lines = 0usize;
        for segment in text.split('\n') {
            let mut cursor = Pt::ZERO;
            let mut segment_lines = 1usize;
            for word in segment.split_whitespace() {
                let word_width = self.advances.text_width(font_size, word);
                if word_width > avail {
                    // Overlong word: it owns as many full lines as it needs.
                    if cursor > Pt::ZERO {
                        segment_lines += 1;
                    }
                    let mut remaining = word_width;
                    while remaining > avail {
                        segment_lines += 1;
                        remaining -= avail;
                    }
                    cursor = remaining;
                    continue;
                }
                if cursor == Pt::ZERO {
                    cursor = word_width;
                } else if cursor + space + word_width <= avail {
                    cursor = cursor + space + word_width;
                } else {
                    segment_lines += 1;
                    cursor = word_width;
                }
            }
            lines += segment_lines;
        }
        lines.max(1)
    }

    fn table_height(&self, node: &NodeRef, width: Pt) -> Pt {
        let rows = table_rows(node);
        if rows.is_empty() {
            return Pt::ZERO;
        }
        let columns = rows
            .iter()
            .map(|row| row_column_count(row))
            .max()
            .unwrap_or(1)
            .max(1);
        let col_width = width / (columns as i32);
        let cell_pad = self.em(0.5);
        let mut height = Pt::ZERO;
        for row in &rows {
            height += self.row_height(row, col_width, columns, cell_pad);
        }
        height
    }

    fn row_height(&self, row: &NodeRef, col_width: Pt, columns: usize, cell_pad: Pt) -> Pt {
        let mut max_height = self.line_pt(1.0);
        for cell in row.children() {
            let Some(el) = cell.as_element() else {
                continue;
            };
            let tag = el.name.local.as_ref().to_ascii_lowercase();
            if tag != "td" && tag != "th" {
                continue;
            }
            let span = cell_col_span(&cell).min(columns).max(1);
            let avail = (col_width * (span as i32) - self.em(0.7)).max(Pt::from_f32(1.0));
            let cell_height = if self.has_block_children(&cell) {
                self.sequence_height(cell.children(), avail)
            } else {
                self.text_height(&cell, avail, 1.0)
            };
            max_height = max_height.max(cell_height);
        }
        max_height + cell_pad
    }
}

fn image_height(el: &kuchiki::ElementData) -> Pt {
    let attrs = el.attributes.borrow();
    let parsed = attrs
        .get("height")
        .and_then(|raw| raw.trim().trim_end_matches("px").parse::<f32>().ok());
    match parsed {
        // CSS pixels at 96dpi.
        Some(px) if px > 0.0 => Pt::from_f32(px * 0.75),
        _ => Pt::from_f32(100.0),
    }
}

fn table_rows(node: &NodeRef) -> Vec<NodeRef> {
    let mut rows = Vec::new();
    for child in node.children() {
        let Some(el) = child.as_element() else {
            continue;
        };
        match el.name.local.as_ref().to_ascii_lowercase().as_str() {
            "thead" | "tbody" | "tfoot" => {
                for row in child.children() {
                    if row
                        .as_element()
                        .map(|row_el| row_el.name.local.as_ref().eq_ignore_ascii_case("tr"))
                        .unwrap_or(false)
                    {
                        rows.push(row);
                    }
                }
            }
            "tr" => rows.push(child.clone()),
            _ => {}
        }
    }
    rows
}

fn row_column_count(row: &NodeRef) -> usize {
    let mut count = 0usize;
    for cell in row.children() {
        let Some(el) = cell.as_element() else {
            continue;
        };
        let tag = el.name.local.as_ref().to_ascii_lowercase();
        if tag == "td" || tag == "th" {
            count += cell_col_span(&cell);
        }
    }
    count
}

fn cell_col_span(cell: &NodeRef) -> usize {
    cell.as_element()
        .and_then(|el| {
            el.attributes
                .borrow()
                .get("colspan")
                .and_then(|raw| raw.trim().parse::<usize>().ok())
        })
        .unwrap_or(1)
        .max(1)
}

fn collect_text(node: &NodeRef, out: &mut String) {
    match node.data() {
        NodeData::Text(text) => out.push_str(&text.borrow()),
        NodeData::Element(el) => {
            if el.name.local.as_ref().eq_ignore_ascii_case("br") {
                out.push('\n');
                return;
            }
            for child in node.children() {
                collect_text(&child, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(width: f32) -> Box<dyn MeasureSurface> {
        FlowMeasurer::new()
            .open_surface(Pt::from_f32(width))
            .expect("open surface")
    }

    #[test]
    fn empty_fragment_measures_zero() {
        let mut surface = surface(400.0);
        assert_eq!(surface.content_height("").unwrap(), Pt::ZERO);
        assert_eq!(surface.content_height("  \n ").unwrap(), Pt::ZERO);
    }

    #[test]
    fn narrow_glyphs_measure_narrower_than_wide_glyphs() {
        let table = AdvanceTable::builtin();
        let size = Pt::from_f32(12.0);
        assert!(table.text_width(size, "iiii") < table.text_width(size, "MMMM"));
    }

    #[test]
    fn adding_a_block_never_shrinks_the_fragment() {
        let mut surface = surface(400.0);
        let one = surface.content_height("<p>alpha beta</p>").unwrap();
        let two = surface
            .content_height("<p>alpha beta</p>\n<p>gamma delta</p>")
            .unwrap();
        assert!(two > one);
    }

    #[test]
    fn longer_text_never_measures_shorter() {
        let mut surface = surface(200.0);
        let short = surface.content_height("<p>one two three</p>").unwrap();
        let long = surface
            .content_height("<p>one two three four five six seven eight nine ten</p>")
            .unwrap();
        assert!(long >= short);
    }

    #[test]
    fn narrow_width_forces_more_lines() {
        let measurer = FlowMeasurer::new();
        let html = "<p>several words that need to wrap somewhere</p>";
        let wide = measurer
            .open_surface(Pt::from_f32(500.0))
            .unwrap()
            .content_height(html)
            .unwrap();
        let narrow = measurer
            .open_surface(Pt::from_f32(80.0))
            .unwrap()
            .content_height(html)
            .unwrap();
        assert!(narrow > wide);
    }

    #[test]
    fn explicit_line_break_adds_a_line() {
        let mut surface = surface(400.0);
        let flat = surface.content_height("<p>a b</p>").unwrap();
        let broken = surface.content_height("<p>a<br>b</p>").unwrap();
        assert!(broken > flat);
    }

    #[test]
    fn heading_measures_taller_than_paragraph() {
        let mut surface = surface(400.0);
        let p = surface.content_height("<p>title</p>").unwrap();
        let h1 = surface.content_height("<h1>title</h1>").unwrap();
        assert!(h1 > p);
    }

    #[test]
    fn each_table_row_adds_height() {
        let mut surface = surface(400.0);
        let one = surface
            .content_height("<table><tbody><tr><td>a</td></tr></tbody></table>")
            .unwrap();
        let two = surface
            .content_height("<table><tbody><tr><td>a</td></tr><tr><td>b</td></tr></tbody></table>")
            .unwrap();
        assert!(two > one);
        assert!(one > Pt::ZERO);
    }

    #[test]
    fn list_items_stack() {
        let mut surface = surface(400.0);
        let short = surface.content_height("<ul><li>a</li></ul>").unwrap();
        let long = surface
            .content_height("<ul><li>a</li><li>b</li><li>c</li></ul>")
            .unwrap();
        assert!(long > short);
    }

    #[test]
    fn overlong_word_occupies_multiple_lines() {
        let measurer = FlowMeasurer::new();
        let mut narrow = measurer.open_surface(Pt::from_f32(40.0)).unwrap();
        let tall = narrow
            .content_height("<p>incomprehensibilities</p>")
            .unwrap();
        let mut wide = measurer.open_surface(Pt::from_f32(400.0)).unwrap();
        let flat = wide.content_height("<p>incomprehensibilities</p>").unwrap();
        assert!(tall > flat);
    }

    #[test]
    fn garbage_font_bytes_fail_surface_open() {
        let err = FlowMeasurer::new()
            .with_font_bytes(vec![0u8; 16])
            .open_surface(Pt::from_f32(400.0))
            .err()
            .expect("must fail");
        assert!(matches!(err, FolioError::MeasurementUnavailable(_)));
    }

    #[test]
    fn non_positive_width_fails_surface_open() {
        let err = FlowMeasurer::new()
            .open_surface(Pt::ZERO)
            .err()
            .expect("must fail");
        assert!(matches!(err, FolioError::MeasurementUnavailable(_)));
    }

    #[test]
    fn measurement_is_deterministic() {
        let mut surface = surface(300.0);
        let html = "<h2>head</h2><p>body text that wraps across lines</p><ul><li>x</li></ul>";
        let first = surface.content_height(html).unwrap();
        let second = surface.content_height(html).unwrap();
        assert_eq!(first, second);
    }
}
