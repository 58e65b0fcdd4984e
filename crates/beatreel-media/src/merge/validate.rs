//! Recording size validation.

use crate::error::MergeRejection;

/// Accept a recording whose size is at least `min_ratio` of the input video.
///
/// Returns the size ratio. A recording that silently dropped most of the
/// video stream comes out far smaller than its input.
pub fn validate_recording(output_size: u64, input_size: u64, min_ratio: f64) -> Result<f64, MergeRejection> {
    let ratio = if input_size == 0 {
        0.0
    } else {
        output_size as f64 / input_size as f64
    };

    if output_size == 0 || ratio < min_ratio {
        return Err(MergeRejection::Undersized {
            output: output_size,
            input: input_size,
            ratio,
            minimum: min_ratio,
        });
    }
    Ok(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_at_threshold() {
        let ratio = validate_recording(300, 1000, 0.3).unwrap();
        assert!((ratio - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_below_threshold() {
        let result = validate_recording(100, 1000, 0.3);
        match result {
            Err(MergeRejection::Undersized { ratio, minimum, .. }) => {
                assert!((ratio - 0.1).abs() < 1e-9);
                assert!((minimum - 0.3).abs() < 1e-9);
            }
            other => panic!("expected undersized, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_output() {
        assert!(validate_recording(0, 1000, 0.3).is_err());
    }

    #[test]
    fn test_larger_output_is_fine() {
        let ratio = validate_recording(1500, 1000, 0.3).unwrap();
        assert!(ratio > 1.0);
    }
}
