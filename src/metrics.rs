use crate::types::Pt;

#[derive(Debug, Clone, Default)]
pub struct PageMetrics {
    pub page_number: usize,
    pub template: String,
    pub fragment_count: usize,
    pub frames_used: usize,
    pub used_height: Pt,
}

#[derive(Debug, Clone, Default)]
pub struct FlowMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_fragments: usize,
}
