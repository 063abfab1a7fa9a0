use crate::error::{RecordViewError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Requested page: a positive size and a zero-based index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPageSpec")]
pub struct PageSpec {
    size: usize,
    index: usize,
}

#[derive(Deserialize)]
struct RawPageSpec {
    size: usize,
    #[serde(default)]
    index: usize,
}

impl TryFrom<RawPageSpec> for PageSpec {
    type Error = RecordViewError;

    fn try_from(raw: RawPageSpec) -> Result<Self> {
        PageSpec::new(raw.size, raw.index)
    }
}

impl PageSpec {
    pub fn new(size: usize, index: usize) -> Result<Self> {
        if size == 0 {
            return Err(RecordViewError::InvalidPageSize(size));
        }
        Ok(PageSpec { size, index })
    }

    /// First page of the given size
    pub fn first(size: usize) -> Result<Self> {
        Self::new(size, 0)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn with_index(self, index: usize) -> Self {
        PageSpec { index, ..self }
    }
}

/// Pagination metadata for rendering controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page_count: usize,
    /// The index actually served, after clamping
    pub page_index: usize,
    pub total_count: usize,
    pub page_size: usize,
}

impl PageInfo {
    pub fn compute(total_count: usize, spec: PageSpec) -> Self {
        let page_count = page_count(total_count, spec.size);
        PageInfo {
            page_count,
            page_index: spec.index.min(page_count - 1),
            total_count,
            page_size: spec.size,
        }
    }

    /// Positions of this page's rows within the full sequence
    pub fn row_range(&self) -> Range<usize> {
        let start = (self.page_index * self.page_size).min(self.total_count);
        let end = (start + self.page_size).min(self.total_count);
        start..end
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next(&self) -> bool {
        self.page_index + 1 < self.page_count
    }
}

/// One page of rows plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<R> {
    pub rows: Vec<R>,
    pub info: PageInfo,
}

impl<R> Page<R> {
    pub fn map<U, F: FnMut(R) -> U>(self, f: F) -> Page<U> {
        Page {
            rows: self.rows.into_iter().map(f).collect(),
            info: self.info,
        }
    }
}

/// Number of pages for `total` rows; never less than one
pub fn page_count(total: usize, size: usize) -> usize {
    total.div_ceil(size).max(1)
}

/// Slice out the requested page, clamping an out-of-range index to the last page.
pub fn paginate<R: Clone>(records: &[R], spec: PageSpec) -> Page<R> {
    let info = PageInfo::compute(records.len(), spec);
    Page {
        rows: records[info.row_range()].to_vec(),
        info,
    }
}
