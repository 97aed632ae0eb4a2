use crate::types::Pt;

#[derive(Debug, Clone)]
pub struct PageMetrics {
    pub page_number: usize,
    pub block_count: usize,
    pub content_height: Pt,
    pub measure_calls: usize,
    pub layout_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PaginationMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_measure_calls: usize,
    pub total_ms: f64,
}
