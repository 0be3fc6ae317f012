use std::fmt;
use std::num::NonZeroUsize;

/// An ordered list of chunks, none larger than the caller-supplied limit.
///
/// Concatenating the chunks yields the original input in its original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan<T> {
    max_size: NonZeroUsize,
    chunks: Vec<Vec<T>>,
}

impl<T> BatchPlan<T> {
    /// Splits `items` into `ceil(len / max_size)` ordered chunks.
    pub fn chunk(items: impl IntoIterator<Item = T>, max_size: NonZeroUsize) -> Self {
        let limit = max_size.get();
        let mut chunks = Vec::new();
        let mut current = Vec::with_capacity(limit);

        for item in items {
            current.push(item);
            if current.len() == limit {
                chunks.push(std::mem::replace(&mut current, Vec::with_capacity(limit)));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        Self { max_size, chunks }
    }

    pub fn max_size(&self) -> NonZeroUsize {
        self.max_size
    }

    pub fn chunks(&self) -> &[Vec<T>] {
        &self.chunks
    }

    /// Number of chunks (i.e. remote calls) in the plan.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total number of items across all chunks.
    pub fn item_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Reassembles the original ordered input.
    pub fn concat(self) -> Vec<T> {
        self.chunks.into_iter().flatten().collect()
    }
}

impl<T> IntoIterator for BatchPlan<T> {
    type Item = Vec<T>;
    type IntoIter = std::vec::IntoIter<Vec<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

/// One item a batch call did not process, with the remote's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprocessedItem<T> {
    pub item: T,
    pub code: String,
    pub message: String,
}

impl<T> UnprocessedItem<T> {
    pub fn new(item: T, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> UnprocessedItem<U> {
        UnprocessedItem {
            item: f(self.item),
            code: self.code,
            message: self.message,
        }
    }
}

impl<T: fmt::Display> fmt::Display for UnprocessedItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.item, self.code, self.message)
    }
}
