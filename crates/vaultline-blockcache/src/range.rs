//! Bounds-checked byte ranges

use crate::error::RangeError;

/// Return the window `offset..offset + length` of `buffer`.
///
/// `length: None` selects everything from `offset` to the end. An offset
/// equal to the buffer length is valid and yields an empty slice.
pub fn slice_range(buffer: &[u8], offset: u64, length: Option<u64>) -> Result<&[u8], RangeError> {
    let err = RangeError {
        offset,
        length,
        actual: buffer.len(),
    };

    let start = usize::try_from(offset).map_err(|_| err)?;
    if start > buffer.len() {
        return Err(err);
    }

    let Some(length) = length else {
        return Ok(&buffer[start..]);
    };

    let end = usize::try_from(length)
        .ok()
        .and_then(|len| start.checked_add(len))
        .filter(|&end| end <= buffer.len())
        .ok_or(err)?;

    Ok(&buffer[start..end])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"0123456789";

    #[test]
    fn open_length_returns_suffix() {
        assert_eq!(slice_range(DATA, 3, None), Ok(&b"3456789"[..]));
        assert_eq!(slice_range(DATA, 0, None), Ok(DATA));
    }

    #[test]
    fn offset_at_end_is_empty_not_error() {
        assert_eq!(slice_range(DATA, 10, None), Ok(&b""[..]));
        assert_eq!(slice_range(DATA, 10, Some(0)), Ok(&b""[..]));
    }

    #[test]
    fn offset_past_end_is_rejected() {
        let err = slice_range(DATA, 11, None).unwrap_err();
        assert_eq!(err.offset, 11);
        assert_eq!(err.actual, 10);
        assert!(slice_range(DATA, 11, Some(0)).is_err());
    }

    #[test]
    fn window_past_end_is_rejected() {
        assert!(slice_range(DATA, 5, Some(6)).is_err());
        assert!(slice_range(DATA, 1, Some(u64::MAX)).is_err());
    }

    #[test]
    fn exact_window() {
        assert_eq!(slice_range(DATA, 2, Some(3)), Ok(&b"234"[..]));
        assert_eq!(slice_range(DATA, 0, Some(10)), Ok(DATA));
        assert_eq!(slice_range(DATA, 4, Some(0)), Ok(&b""[..]));
    }
}
