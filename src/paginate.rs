use crate::block::Block;
use crate::debug::DebugLogger;
use crate::error::FolioError;
use crate::frame::{AddResult, Frame};
use crate::html::parse_blocks;
use crate::measure::LayoutMeasurer;
use crate::metrics::{PageMetrics, PaginationMetrics};
use crate::types::Size;
use std::collections::VecDeque;
use std::time::Instant;

/// Single forward pass over a work queue of blocks. Split remainders go back
/// to the front of the queue so a continued table leads the next page.
pub(crate) struct Paginator<'a> {
    pub content: Size,
    pub measurer: &'a dyn LayoutMeasurer,
    pub debug: Option<&'a DebugLogger>,
}

impl Paginator<'_> {
    pub fn run(&self, html: &str) -> Result<(Vec<String>, PaginationMetrics), FolioError> {
        let started = Instant::now();
        // The surface lives exactly as long as this call; every early return
        // below drops it.
        let mut surface = self.measurer.open_surface(self.content.width)?;

        let mut queue: VecDeque<Block> = parse_blocks(html).into();
        let mut pages: Vec<String> = Vec::new();
        let mut metrics = PaginationMetrics::default();
        let mut frame = Frame::new(self.content);

        let log_break = |reason: &str, page_number: usize, frame: &Frame| {
            let Some(logger) = self.debug else {
                return;
            };
            logger.event(
                "paginate.page_break",
                &[("reason", reason)],
                &[
                    ("page", page_number as u64),
                    ("blocks", frame.block_count() as u64),
                ],
            );
            logger.increment("paginate.page_break");
        };

        let mut page_start = Instant::now();
        let flush = |frame: &mut Frame,
                     pages: &mut Vec<String>,
                     metrics: &mut PaginationMetrics,
                     page_start: &mut Instant,
                     content: Size| {
            let done = std::mem::replace(frame, Frame::new(content));
            metrics.total_measure_calls += done.measure_calls();
            metrics.pages.push(PageMetrics {
                page_number: pages.len() + 1,
                block_count: done.block_count(),
                content_height: done.used_height(),
                measure_calls: done.measure_calls(),
                layout_ms: page_start.elapsed().as_secs_f64() * 1000.0,
            });
            pages.push(done.into_fragment());
            *page_start = Instant::now();
        };

        while let Some(block) = queue.pop_front() {
            if matches!(block, Block::PageBreak) {
                if !frame.is_empty() {
                    log_break("manual_break", pages.len() + 1, &frame);
                    flush(&mut frame, &mut pages, &mut metrics, &mut page_start, self.content);
                }
                continue;
            }
            let kind = block.kind_name();
            match frame.add(block, surface.as_mut())? {
                AddResult::Placed => {}
                AddResult::Split(rest) => {
                    log_break("table_split", pages.len() + 1, &frame);
                    flush(&mut frame, &mut pages, &mut metrics, &mut page_start, self.content);
                    queue.push_front(rest);
                }
                AddResult::Overflow(rest) => {
                    let reason = if kind == "table" {
                        "table_defer"
                    } else {
                        "block_overflow"
                    };
                    log_break(reason, pages.len() + 1, &frame);
                    flush(&mut frame, &mut pages, &mut metrics, &mut page_start, self.content);
                    queue.push_front(rest);
                }
            }
        }

        if !frame.is_empty() {
            log_break("queue_exhausted", pages.len() + 1, &frame);
            flush(&mut frame, &mut pages, &mut metrics, &mut page_start, self.content);
        }

        metrics.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Some(logger) = self.debug {
            logger.event("paginate.done", &[], &[("pages", pages.len() as u64)]);
            logger.emit_summary("paginate");
            logger.flush();
        }
        Ok((pages, metrics))
    }
}
