//! Buffer-passing conventions.

use crate::error::SecurityResult;

/// Read-only byte span.
pub type ReadOnlyMemRegion<'a> = &'a [u8];

/// Writable byte span.
pub type ReadWriteMemRegion<'a> = &'a mut [u8];

/// Run a size-query operation and collect its output into a vector.
///
/// `op` is called first with an empty buffer and must return the required
/// size, then with a buffer of that size and must return the bytes written.
/// The first error of either call is returned unchanged.
pub fn fill_to_vec<F>(mut op: F) -> SecurityResult<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> SecurityResult<usize>,
{
    let required = op(&mut [])?;
    let mut buf = vec![0u8; required];
    let written = op(&mut buf)?;
    buf.truncate(written);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityError;

    #[test]
    fn fills_after_size_query() {
        let data = b"payload";
        let out = fill_to_vec(|buf| {
            if buf.is_empty() {
                return Ok(data.len());
            }
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        })
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn surfaces_inner_error() {
        let mut calls = 0;
        let err = fill_to_vec(|buf| {
            calls += 1;
            if buf.is_empty() {
                Ok(4)
            } else {
                Err(SecurityError::UnexpectedValue)
            }
        })
        .unwrap_err();
        assert_eq!(err, SecurityError::UnexpectedValue);
        assert_eq!(calls, 2);
    }

    #[test]
    fn truncates_to_written() {
        let out = fill_to_vec(|buf| Ok(if buf.is_empty() { 8 } else { 3 })).unwrap();
        assert_eq!(out.len(), 3);
    }
}
