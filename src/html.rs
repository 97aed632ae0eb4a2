use crate::block::{Block, FlowBlock, TableBlock, TableData};
use kuchiki::traits::TendrilSink;
use kuchiki::{ElementData, NodeData, NodeRef};

/// Class token that marks a block element as a forced page boundary.
const BREAK_MARKER_CLASS: &str = "page-break";

/// Parses body content into the flat block list the paginator walks.
/// Unparseable nodes (comments, doctypes, processing instructions) are
/// dropped; bare text between blocks is promoted to a paragraph.
pub(crate) fn parse_blocks(html: &str) -> Vec<Block> {
    let document = kuchiki::parse_html().one(html);
    let root = match document.select_first("body") {
        Ok(body) => body.as_node().clone(),
        Err(()) => document,
    };

    let mut blocks = Vec::new();
    for child in root.children() {
        match child.data() {
            NodeData::Element(el) => {
                if is_break_marker(el) {
                    blocks.push(Block::PageBreak);
                    continue;
                }
                if el.name.local.as_ref().eq_ignore_ascii_case("table") {
                    blocks.push(Block::Table(parse_table(&child, el)));
                    continue;
                }
                let markup = serialize_node(&child);
                if !markup.is_empty() {
                    blocks.push(Block::Flow(FlowBlock::new(markup)));
                }
            }
            NodeData::Text(text) => {
                let text = text.borrow();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    let mut markup = String::with_capacity(trimmed.len() + 7);
                    markup.push_str("<p>");
                    escape_text(trimmed, &mut markup);
                    markup.push_str("</p>");
                    blocks.push(Block::Flow(FlowBlock::new(markup)));
                }
            }
            _ => {}
        }
    }
    blocks
}

pub(crate) fn is_break_marker(el: &ElementData) -> bool {
    let attrs = el.attributes.borrow();
    attrs
        .get("class")
        .map(|classes| {
            classes
                .split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case(BREAK_MARKER_CLASS))
        })
        .unwrap_or(false)
}

fn parse_table(node: &NodeRef, el: &ElementData) -> TableBlock {
    let mut caption = String::new();
    let mut colgroup = String::new();
    let mut header = String::new();
    let mut body_rows: Vec<NodeRef> = Vec::new();
    let mut foot_rows: Vec<NodeRef> = Vec::new();

    for child in node.children() {
        let Some(child_el) = child.as_element() else {
            continue;
        };
        match child_el.name.local.as_ref().to_ascii_lowercase().as_str() {
            "caption" => caption.push_str(&serialize_node(&child)),
            "colgroup" => colgroup.push_str(&serialize_node(&child)),
            "thead" => header.push_str(&serialize_node(&child)),
            "tbody" => body_rows.extend(element_children(&child, "tr")),
            "tfoot" => foot_rows.extend(element_children(&child, "tr")),
            "tr" => body_rows.push(child.clone()),
            _ => {}
        }
    }
    // Footer rows trail the body; they are ordinary rows for splitting.
    body_rows.extend(foot_rows);

    // Without a <thead>, a leading all-<th> row is the header section.
    if header.is_empty() && !body_rows.is_empty() && row_is_all_header_cells(&body_rows[0]) {
        let promoted = body_rows.remove(0);
        header.push_str("<thead>");
        header.push_str(&serialize_node(&promoted));
        header.push_str("</thead>");
    }

    TableBlock::new(TableData {
        open_tag: serialize_open_tag(el, "table"),
        colgroup,
        caption,
        header,
        rows: body_rows.iter().map(serialize_node).collect(),
    })
}

fn element_children(node: &NodeRef, tag: &str) -> Vec<NodeRef> {
    node.children()
        .filter(|child| {
            child
                .as_element()
                .map(|el| el.name.local.as_ref().eq_ignore_ascii_case(tag))
                .unwrap_or(false)
        })
        .collect()
}

fn row_is_all_header_cells(row: &NodeRef) -> bool {
    let mut cell_count = 0usize;
    for cell in row.children() {
        let Some(el) = cell.as_element() else {
            continue;
        };
        match el.name.local.as_ref().to_ascii_lowercase().as_str() {
            "th" => cell_count += 1,
            "td" => return false,
            _ => {}
        }
    }
    cell_count > 0
}

// kuchiki can serialize nodes itself, but its output is tied to html5ever's
// serializer options. We emit markup by hand so fragments stay byte-stable
// across kuchiki upgrades; pagination compares and re-measures these strings.
pub(crate) fn serialize_node(node: &NodeRef) -> String {
    let mut out = String::new();
    write_html(node, &mut out);
    out
}

fn write_html(node: &NodeRef, out: &mut String) {
    match node.data() {
        NodeData::Element(el) => {
            let tag = el.name.local.as_ref();
            out.push_str(&serialize_open_tag(el, tag));
            if is_void_element(tag) {
                return;
            }
            for child in node.children() {
                write_html(&child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Text(text) => {
            escape_text(&text.borrow(), out);
        }
        _ => {}
    }
}

fn serialize_open_tag(el: &ElementData, tag: &str) -> String {
    let mut out = String::with_capacity(tag.len() + 2);
    out.push('<');
    out.push_str(tag);
    let attrs = el.attributes.borrow();
    for (key, value) in attrs.map.iter() {
        out.push(' ');
        out.push_str(key.local.as_ref());
        out.push_str("=\"");
        escape_attr(&value.value, &mut out);
        out.push('"');
    }
    out.push('>');
    out
}

fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "source"
            | "track"
            | "wbr"
    )
}

fn escape_attr(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn escape_text(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_flow_table_and_marker() {
        let blocks = parse_blocks(
            "<p>intro</p><hr class=\"page-break\"><table><tr><td>x</td></tr></table>",
        );
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], Block::Flow(_)));
        assert!(matches!(blocks[1], Block::PageBreak));
        assert!(matches!(blocks[2], Block::Table(_)));
    }

    #[test]
    fn marker_class_matches_among_other_tokens() {
        let blocks = parse_blocks("<div class=\"spacer page-break wide\"></div>");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], Block::PageBreak));
    }

    #[test]
    fn plain_class_is_not_a_marker() {
        let blocks = parse_blocks("<div class=\"page-breaker\">text</div>");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], Block::Flow(_)));
    }

    #[test]
    fn bare_text_becomes_a_paragraph() {
        let blocks = parse_blocks("loose text &amp; more");
        assert_eq!(blocks.len(), 1);
        let Block::Flow(flow) = &blocks[0] else {
            panic!("expected flow block");
        };
        assert_eq!(flow.html(), "<p>loose text &amp; more</p>");
    }

    #[test]
    fn comments_are_dropped() {
        let blocks = parse_blocks("<!-- note --><p>kept</p>");
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn thead_is_captured_as_header() {
        let blocks = parse_blocks(
            "<table><thead><tr><th>h</th></tr></thead><tbody><tr><td>1</td></tr><tr><td>2</td></tr></tbody></table>",
        );
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table");
        };
        assert!(table.has_header());
        assert_eq!(table.body_len(), 2);
    }

    #[test]
    fn leading_th_row_is_promoted_to_header() {
        let blocks =
            parse_blocks("<table><tr><th>h1</th><th>h2</th></tr><tr><td>1</td><td>2</td></tr></table>");
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table");
        };
        assert!(table.has_header());
        assert_eq!(table.body_len(), 1);
        assert!(table.to_html().contains("<thead><tr><th>h1</th>"));
    }

    #[test]
    fn mixed_first_row_stays_in_the_body() {
        let blocks = parse_blocks("<table><tr><th>h</th><td>v</td></tr></table>");
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table");
        };
        assert!(!table.has_header());
        assert_eq!(table.body_len(), 1);
    }

    #[test]
    fn caption_and_colgroup_are_separated_from_rows() {
        let blocks = parse_blocks(
            "<table><caption>Totals</caption><colgroup><col span=\"2\"></colgroup><tr><td>a</td><td>b</td></tr></table>",
        );
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table");
        };
        let html = table.to_html();
        assert!(html.contains("<caption>Totals</caption>"));
        assert!(html.contains("<colgroup><col span=\"2\"></colgroup>"));
        assert_eq!(table.body_len(), 1);
    }

    #[test]
    fn tfoot_rows_trail_the_body() {
        let blocks = parse_blocks(
            "<table><tfoot><tr><td>sum</td></tr></tfoot><tbody><tr><td>1</td></tr></tbody></table>",
        );
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.body_len(), 2);
        let html = table.to_html();
        let body_pos = html.find("<td>1</td>").expect("body row");
        let foot_pos = html.find("<td>sum</td>").expect("foot row");
        assert!(body_pos < foot_pos);
    }

    #[test]
    fn serializer_keeps_attributes_and_void_elements() {
        let blocks = parse_blocks("<p class=\"x\">a<br>b &amp; c</p>");
        let Block::Flow(flow) = &blocks[0] else {
            panic!("expected flow block");
        };
        assert_eq!(flow.html(), "<p class=\"x\">a<br>b &amp; c</p>");
    }

    #[test]
    fn table_open_tag_keeps_attributes() {
        let blocks = parse_blocks("<table border=\"1\"><tr><td>x</td></tr></table>");
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table");
        };
        assert!(table.to_html().starts_with("<table border=\"1\">"));
    }

    #[test]
    fn whitespace_only_input_yields_no_blocks() {
        assert!(parse_blocks("  \n\t  ").is_empty());
    }
}
