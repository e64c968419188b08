use std::io::{self, Read};

/// Why a request body could not be read.
#[derive(Debug)]
pub enum BodyError {
    TooLarge { limit: u64 },
    Io(io::Error),
}

/// Reads at most `limit` bytes from `reader`. A body longer than `limit` is
/// rejected rather than truncated.
pub fn read_capped<R: Read>(reader: R, limit: u64) -> Result<Vec<u8>, BodyError> {
    let mut body = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(BodyError::Io)?;
    if body.len() as u64 > limit {
        return Err(BodyError::TooLarge { limit });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn body_within_limit_is_returned_whole() {
        let body = read_capped(Cursor::new(vec![7u8; 64]), 64).unwrap();
        assert_eq!(body, vec![7u8; 64]);
    }

    #[test]
    fn oversized_body_is_rejected() {
        let err = read_capped(Cursor::new(vec![0u8; 65]), 64).unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 64 }));
    }

    #[test]
    fn oversized_stream_stops_after_limit() {
        // an endless source must not be drained
        let err = read_capped(io::repeat(1), 1024).unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 1024 }));
    }
}
