use crate::error::SegmentResult;

/// Source of the large working buffers.
///
/// Every buffer the segmenter sizes up front is requested through this
/// trait, so that a failed reservation surfaces as an error rather than an
/// abort.
pub trait BufferAllocator {
    fn allocate<T: Clone>(&self, len: usize, fill: T) -> SegmentResult<Vec<T>>;
}

#[derive(Default, Debug, Clone, Copy)]
pub struct SystemAllocator;

impl BufferAllocator for SystemAllocator {
    fn allocate<T: Clone>(&self, len: usize, fill: T) -> SegmentResult<Vec<T>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len)?;
        buffer.resize(len, fill);
        Ok(buffer)
    }
}

/// Appends `value`, reporting a failed reservation instead of aborting.
/// Returns the index of the new element.
pub(crate) fn try_push<T>(vec: &mut Vec<T>, value: T) -> SegmentResult<usize> {
    vec.try_reserve(1)?;
    vec.push(value);
    Ok(vec.len() - 1)
}

/// Copies `source` into a freshly reserved vector.
pub(crate) fn try_copy<T: Clone>(source: &[T]) -> SegmentResult<Vec<T>> {
    let mut copy = Vec::new();
    copy.try_reserve_exact(source.len())?;
    copy.extend_from_slice(source);
    Ok(copy)
}
