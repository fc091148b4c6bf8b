//! Result extraction: pulls the artifact out of an algorithm's stdout.
//!
//! The algorithm may print arbitrary diagnostics. The artifact is whatever
//! lies between the FIRST and the LAST occurrence of the marker:
//!
//!   noise ===MODEL_MARKER=== <artifact> ===MODEL_MARKER=== noise
//!
//! If the artifact itself contains the marker, first-to-last still spans
//! the whole region, marker bytes included. Only stray markers printed
//! before or after the bracketed artifact shift the boundaries.

/// Stdout did not carry a bracketed artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("marker must not be empty")]
    EmptyMarker,
    #[error("marker not found in output")]
    MarkerNotFound,
    #[error("marker found only once in output")]
    SingleMarker,
    #[error("marker occurrences overlap at offsets {first} and {last}")]
    Overlapping { first: usize, last: usize },
}

/// Return the bytes strictly between the first and last occurrence of
/// `marker` in `output`.
pub fn extract<'a>(output: &'a [u8], marker: &[u8]) -> Result<&'a [u8], ExtractionError> {
    if marker.is_empty() {
        return Err(ExtractionError::EmptyMarker);
    }
    let first = find(output, marker).ok_or(ExtractionError::MarkerNotFound)?;
    let last = rfind(output, marker).ok_or(ExtractionError::MarkerNotFound)?;

    if last <= first {
        return Err(ExtractionError::SingleMarker);
    }
    let start = first + marker.len();
    if last < start {
        return Err(ExtractionError::Overlapping { first, last });
    }
    Ok(&output[start..last])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
