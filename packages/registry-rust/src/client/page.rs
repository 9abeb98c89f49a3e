//! Windowed result pages.

/// A window over a logical ordered sequence.
///
/// `total_size` is the length of the whole sequence; `data` holds at most
/// `request_size` items starting at `request_offset`, and is empty when the
/// offset is at or past the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    request_offset: usize,
    request_size: usize,
    total_size: usize,
    data: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(
        request_offset: usize,
        request_size: usize,
        total_size: usize,
        data: Vec<T>,
    ) -> Self {
        Self {
            request_offset,
            request_size,
            total_size,
            data,
        }
    }

    /// Cuts the window `[offset, offset + size)` out of `items`.
    #[must_use]
    pub fn window(items: Vec<T>, offset: usize, size: usize) -> Self {
        let total_size = items.len();
        let data = if offset < total_size {
            items.into_iter().skip(offset).take(size).collect()
        } else {
            Vec::new()
        };
        Self::new(offset, size, total_size, data)
    }

    /// Drops items from the window only. `total_size` still counts the whole
    /// sequence.
    #[must_use]
    pub fn retain(mut self, keep: impl FnMut(&T) -> bool) -> Self {
        self.data.retain(keep);
        self
    }

    #[must_use]
    pub fn request_offset(&self) -> usize {
        self.request_offset
    }

    #[must_use]
    pub fn request_size(&self) -> usize {
        self.request_size
    }

    #[must_use]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    #[must_use]
    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}
