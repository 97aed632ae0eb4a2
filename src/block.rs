use std::ops::Range;
use std::sync::Arc;

/// One top-level node of the parsed document. Pagination only ever reasons
/// about block boundaries; the markup inside a flow block is opaque.
#[derive(Debug, Clone)]
pub enum Block {
    Flow(FlowBlock),
    Table(TableBlock),
    PageBreak,
}

impl Block {
    pub fn to_html(&self) -> String {
        match self {
            Block::Flow(flow) => flow.html().to_string(),
            Block::Table(table) => table.to_html(),
            Block::PageBreak => String::new(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Block::Flow(_) => "flow",
            Block::Table(_) => "table",
            Block::PageBreak => "page_break",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowBlock {
    html: String,
}

impl FlowBlock {
    pub fn new(html: String) -> Self {
        Self { html }
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

/// Immutable table markup shared by every fragment of a split table.
#[derive(Debug)]
pub struct TableData {
    /// The serialized `<table ...>` open tag, attributes included.
    pub open_tag: String,
    /// Serialized `<colgroup>` markup, re-emitted with every fragment so
    /// column sizing survives the split.
    pub colgroup: String,
    /// Serialized `<caption>` markup; belongs to the first fragment only.
    pub caption: String,
    /// Serialized header section, re-emitted atop every fragment.
    pub header: String,
    /// Serialized `<tr>` body rows.
    pub rows: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TableBlock {
    data: Arc<TableData>,
    body_range: Range<usize>,
    include_caption: bool,
    include_header: bool,
}

impl TableBlock {
    pub fn new(data: TableData) -> Self {
        let len = data.rows.len();
        let has_header = !data.header.is_empty();
        Self {
            data: Arc::new(data),
            body_range: 0..len,
            include_caption: true,
            include_header: has_header,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body_range.end.saturating_sub(self.body_range.start)
    }

    pub fn has_header(&self) -> bool {
        !self.data.header.is_empty()
    }

    /// A fragment holding only the first `count` rows of this window, used to
    /// probe how many rows fit in the remaining page space.
    pub fn leading(&self, count: usize) -> TableBlock {
        let end = (self.body_range.start + count).min(self.body_range.end);
        TableBlock {
            data: self.data.clone(),
            body_range: self.body_range.start..end,
            include_caption: self.include_caption,
            include_header: self.include_header,
        }
    }

    /// Splits the row window after `count` rows. The first fragment keeps the
    /// caption (when it still owns it); the remainder re-includes the header
    /// and never the caption.
    pub fn split_rows(&self, count: usize) -> (TableBlock, TableBlock) {
        let mid = (self.body_range.start + count).min(self.body_range.end);
        let first = TableBlock {
            data: self.data.clone(),
            body_range: self.body_range.start..mid,
            include_caption: self.include_caption,
            include_header: self.include_header,
        };
        let rest = TableBlock {
            data: self.data.clone(),
            body_range: mid..self.body_range.end,
            include_caption: false,
            include_header: self.has_header(),
        };
        (first, rest)
    }

    pub fn to_html(&self) -> String {
        let mut out = String::with_capacity(128);
        out.push_str(&self.data.open_tag);
        if self.include_caption {
            out.push_str(&self.data.caption);
        }
        out.push_str(&self.data.colgroup);
        if self.include_header {
            out.push_str(&self.data.header);
        }
        out.push_str("<tbody>");
        for row in &self.data.rows[self.body_range.clone()] {
            out.push_str(row);
        }
        out.push_str("</tbody></table>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table(rows: usize) -> TableBlock {
        TableBlock::new(TableData {
            open_tag: "<table class=\"items\">".to_string(),
            colgroup: "<colgroup><col><col></colgroup>".to_string(),
            caption: "<caption>Items</caption>".to_string(),
            header: "<thead><tr><th>a</th><th>b</th></tr></thead>".to_string(),
            rows: (0..rows)
                .map(|i| format!("<tr><td>r{i}</td><td>x</td></tr>"))
                .collect(),
        })
    }

    #[test]
    fn split_keeps_every_row_exactly_once() {
        let table = sample_table(5);
        let (first, rest) = table.split_rows(2);
        assert_eq!(first.body_len(), 2);
        assert_eq!(rest.body_len(), 3);
        let joined = format!("{}{}", first.to_html(), rest.to_html());
        for i in 0..5 {
            assert_eq!(joined.matches(&format!("r{i}<")).count(), 1);
        }
    }

    #[test]
    fn header_repeats_on_both_fragments() {
        let table = sample_table(4);
        let (first, rest) = table.split_rows(1);
        assert!(first.to_html().contains("<thead>"));
        assert!(rest.to_html().contains("<thead>"));
    }

    #[test]
    fn caption_stays_with_first_fragment_only() {
        let table = sample_table(4);
        let (first, rest) = table.split_rows(3);
        assert!(first.to_html().contains("<caption>"));
        assert!(!rest.to_html().contains("<caption>"));
        // A second split of the remainder must not resurrect the caption.
        let (again, tail) = rest.split_rows(1);
        assert!(!again.to_html().contains("<caption>"));
        assert!(!tail.to_html().contains("<caption>"));
    }

    #[test]
    fn colgroup_repeats_on_every_fragment() {
        let table = sample_table(4);
        let (first, rest) = table.split_rows(2);
        assert!(first.to_html().contains("<colgroup>"));
        assert!(rest.to_html().contains("<colgroup>"));
    }

    #[test]
    fn leading_probe_does_not_consume_rows() {
        let table = sample_table(6);
        let probe = table.leading(2);
        assert_eq!(probe.body_len(), 2);
        assert_eq!(table.body_len(), 6);
        assert!(probe.to_html().contains("r0<"));
        assert!(probe.to_html().contains("r1<"));
        assert!(!probe.to_html().contains("r2<"));
    }

    #[test]
    fn headerless_table_never_emits_thead() {
        let table = TableBlock::new(TableData {
            open_tag: "<table>".to_string(),
            colgroup: String::new(),
            caption: String::new(),
            header: String::new(),
            rows: vec!["<tr><td>only</td></tr>".to_string()],
        });
        assert!(!table.has_header());
        assert!(!table.to_html().contains("<thead>"));
    }
}
