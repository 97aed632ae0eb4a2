use crate::block::Block;
use crate::error::FolioError;
use crate::measure::MeasureSurface;
use crate::types::{Pt, Size};

pub enum AddResult {
    Placed,
    Split(Block),
    Overflow(Block),
}

/// The in-progress page buffer. Blocks are committed once the measured
/// height of the whole buffer, candidate included, stays within the content
/// region.
pub struct Frame {
    height: Pt,
    content: String,
    blocks: usize,
    used: Pt,
    measure_calls: usize,
}

impl Frame {
    pub fn new(region: Size) -> Self {
        Self {
            height: region.height,
            content: String::new(),
            blocks: 0,
            used: Pt::ZERO,
            measure_calls: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks
    }

    pub fn used_height(&self) -> Pt {
        self.used
    }

    pub fn measure_calls(&self) -> usize {
        self.measure_calls
    }

    pub fn into_fragment(self) -> String {
        self.content
    }

    pub fn add(
        &mut self,
        block: Block,
        surface: &mut dyn MeasureSurface,
    ) -> Result<AddResult, FolioError> {
        let candidate = self.candidate(&block.to_html());
        let measured = self.measure(surface, &candidate)?;
        if measured <= self.height {
            self.commit(candidate, measured);
            return Ok(AddResult::Placed);
        }

        match block {
            Block::Table(table) => {
                let total = table.body_len();
                let mut fit = 0usize;
                let mut fit_candidate = String::new();
                let mut fit_height = Pt::ZERO;
                for count in 1..=total {
                    let probe = self.candidate(&table.leading(count).to_html());
                    let probe_height = self.measure(surface, &probe)?;
                    if probe_height > self.height {
                        break;
                    }
                    fit = count;
                    fit_candidate = probe;
                    fit_height = probe_height;
                }
                if fit > 0 && fit < total {
                    let (_, rest) = table.split_rows(fit);
                    self.commit(fit_candidate, fit_height);
                    return Ok(AddResult::Split(Block::Table(rest)));
                }
                if fit == total && total > 0 {
                    // Only reachable when the surface disagrees with its own
                    // earlier answer for identical markup; trust the row probe.
                    self.commit(fit_candidate, fit_height);
                    return Ok(AddResult::Placed);
                }
                if self.is_empty() {
                    // Not even one row fits an empty frame: the table is
                    // larger than a page and rides alone, past the bound.
                    self.commit(candidate, measured);
                    return Ok(AddResult::Placed);
                }
                Ok(AddResult::Overflow(Block::Table(table)))
            }
            other => {
                if self.is_empty() {
                    // Oversized unsplittable block: it owns this page.
                    self.commit(candidate, measured);
                    return Ok(AddResult::Placed);
                }
                Ok(AddResult::Overflow(other))
            }
        }
    }

    fn candidate(&self, block_html: &str) -> String {
        if self.content.is_empty() {
            block_html.to_string()
        } else {
            format!("{}\n{}", self.content, block_html)
        }
    }

    fn commit(&mut self, content: String, measured: Pt) {
        self.content = content;
        self.blocks += 1;
        self.used = measured;
    }

    fn measure(
        &mut self,
        surface: &mut dyn MeasureSurface,
        fragment: &str,
    ) -> Result<Pt, FolioError> {
        self.measure_calls += 1;
        surface.content_height(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{FlowBlock, TableBlock, TableData};

    /// Deterministic stand-in: every `data-h="N"` attribute in the fragment
    /// contributes N points.
    struct AttrSurface;

    impl MeasureSurface for AttrSurface {
        fn content_height(&mut self, fragment_html: &str) -> Result<Pt, FolioError> {
            let mut total = 0i64;
            let mut rest = fragment_html;
            while let Some(pos) = rest.find("data-h=\"") {
                rest = &rest[pos + 8..];
                let end = rest.find('"').unwrap_or(0);
                total += rest[..end].parse::<i64>().unwrap_or(0);
                rest = &rest[end..];
            }
            Ok(Pt::from_f32(total as f32))
        }
    }

    fn para(height: u32) -> Block {
        Block::Flow(FlowBlock::new(format!("<p data-h=\"{height}\">x</p>")))
    }

    fn table(rows: usize, row_height: u32, header_height: u32) -> Block {
        Block::Table(TableBlock::new(TableData {
            open_tag: "<table>".to_string(),
            colgroup: String::new(),
            caption: String::new(),
            header: format!("<thead><tr data-h=\"{header_height}\"><th>h</th></tr></thead>"),
            rows: (0..rows)
                .map(|i| format!("<tr data-h=\"{row_height}\"><td>r{i}</td></tr>"))
                .collect(),
        }))
    }

    fn frame(height: f32) -> Frame {
        Frame::new(Size::new(Pt::from_f32(400.0), Pt::from_f32(height)))
    }

    #[test]
    fn fitting_blocks_are_placed() {
        let mut frame = frame(100.0);
        let mut surface = AttrSurface;
        assert!(matches!(
            frame.add(para(40), &mut surface).unwrap(),
            AddResult::Placed
        ));
        assert!(matches!(
            frame.add(para(60), &mut surface).unwrap(),
            AddResult::Placed
        ));
        assert_eq!(frame.block_count(), 2);
        assert_eq!(frame.used_height(), Pt::from_f32(100.0));
    }

    #[test]
    fn overflowing_block_is_returned() {
        let mut frame = frame(100.0);
        let mut surface = AttrSurface;
        frame.add(para(80), &mut surface).unwrap();
        let result = frame.add(para(30), &mut surface).unwrap();
        assert!(matches!(result, AddResult::Overflow(_)));
        assert_eq!(frame.block_count(), 1);
    }

    #[test]
    fn oversized_block_rides_alone_on_an_empty_frame() {
        let mut frame = frame(100.0);
        let mut surface = AttrSurface;
        assert!(matches!(
            frame.add(para(500), &mut surface).unwrap(),
            AddResult::Placed
        ));
        assert!(frame.used_height() > Pt::from_f32(100.0));
    }

    #[test]
    fn table_splits_at_the_last_fitting_row() {
        let mut frame = frame(100.0);
        let mut surface = AttrSurface;
        // header 10 + 8 rows of 20 = 170; header plus 4 rows = 90 fits.
        let result = frame.add(table(8, 20, 10), &mut surface).unwrap();
        let AddResult::Split(Block::Table(rest)) = result else {
            panic!("expected split");
        };
        assert_eq!(rest.body_len(), 4);
        assert!(frame.into_fragment().contains("r3<"));
    }

    #[test]
    fn table_that_fits_no_row_overflows_a_busy_frame() {
        let mut frame = frame(100.0);
        let mut surface = AttrSurface;
        frame.add(para(85), &mut surface).unwrap();
        // header 10 + first row 20 exceeds the 15 left over.
        let result = frame.add(table(3, 20, 10), &mut surface).unwrap();
        let AddResult::Overflow(Block::Table(rest)) = result else {
            panic!("expected overflow");
        };
        assert_eq!(rest.body_len(), 3);
        assert_eq!(frame.block_count(), 1);
    }

    #[test]
    fn giant_header_table_rides_alone_on_an_empty_frame() {
        let mut frame = frame(100.0);
        let mut surface = AttrSurface;
        let result = frame.add(table(2, 10, 300), &mut surface).unwrap();
        assert!(matches!(result, AddResult::Placed));
        assert!(frame.used_height() > Pt::from_f32(100.0));
    }

    #[test]
    fn fragment_preserves_placement_order() {
        let mut frame = frame(300.0);
        let mut surface = AttrSurface;
        frame
            .add(
                Block::Flow(FlowBlock::new("<p data-h=\"10\">first</p>".to_string())),
                &mut surface,
            )
            .unwrap();
        frame
            .add(
                Block::Flow(FlowBlock::new("<p data-h=\"10\">second</p>".to_string())),
                &mut surface,
            )
            .unwrap();
        let fragment = frame.into_fragment();
        let first = fragment.find("first").unwrap();
        let second = fragment.find("second").unwrap();
        assert!(first < second);
    }
}
