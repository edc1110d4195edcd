use crate::GenerateError;

/// Closed resolution bounds accepted by the pipeline.
pub const MIN_DIM: usize = 256;
pub const MAX_DIM: usize = 2048;

/// Closed scheduler-step bounds.
pub const MIN_STEPS: usize = 1;
pub const MAX_STEPS: usize = 50;

pub const DEFAULT_DIM: usize = 1024;
/// 9 scheduler points, i.e. 8 transformer forward passes for this turbo
/// family.
pub const DEFAULT_STEPS: usize = 9;

/// A validated generation request. Construction is the only validation
/// gate: once a value of this type exists, the sampler can be invoked
/// without further checks. Out-of-range values are rejected, never clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub width: usize,
    pub height: usize,
    pub steps: usize,
    /// Caller-supplied seed, passed through verbatim. `None` means the
    /// service draws one.
    pub seed: Option<u64>,
}

impl GenerationParams {
    pub fn new(
        prompt: impl Into<String>,
        width: usize,
        height: usize,
        steps: usize,
        seed: Option<u64>,
    ) -> Result<Self, GenerateError> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(GenerateError::invalid("prompt must not be empty"));
        }
        check_range("width", width, MIN_DIM, MAX_DIM)?;
        check_range("height", height, MIN_DIM, MAX_DIM)?;
        check_range("num_inference_steps", steps, MIN_STEPS, MAX_STEPS)?;
        Ok(Self {
            prompt,
            width,
            height,
            steps,
            seed,
        })
    }
}

fn check_range(field: &str, value: usize, min: usize, max: usize) -> Result<(), GenerateError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(GenerateError::invalid(format!(
            "{field} must be between {min} and {max}, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(width: usize, height: usize, steps: usize) -> Result<GenerationParams, GenerateError> {
        GenerationParams::new("a red circle", width, height, steps, None)
    }

    #[test]
    fn accepts_bounds() {
        assert!(params(MIN_DIM, MIN_DIM, MIN_STEPS).is_ok());
        assert!(params(MAX_DIM, MAX_DIM, MAX_STEPS).is_ok());
        assert!(params(DEFAULT_DIM, DEFAULT_DIM, DEFAULT_STEPS).is_ok());
    }

    #[test]
    fn rejects_width_below_minimum() {
        let err = params(100, 512, 9).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidParameter(_)));
        assert!(err.to_string().contains("width"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn rejects_height_above_maximum() {
        let err = params(512, 4000, 9).unwrap_err();
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn rejects_out_of_range_steps() {
        assert!(params(512, 512, 0).is_err());
        assert!(params(512, 512, 51).is_err());
    }

    #[test]
    fn rejects_empty_prompt() {
        let err = GenerationParams::new("", 512, 512, 9, None).unwrap_err();
        assert!(err.to_string().contains("prompt"));
    }

    #[test]
    fn does_not_clamp() {
        assert!(params(MIN_DIM - 1, 512, 9).is_err());
        assert!(params(MAX_DIM + 1, 512, 9).is_err());
    }

    #[test]
    fn seed_passes_through_verbatim() {
        let p = GenerationParams::new("a red circle", 512, 512, 9, Some(42)).unwrap();
        assert_eq!(p.seed, Some(42));
    }
}
