use thiserror::Error;

/// Failures reported to the caller.
///
/// Every variant describes invalid input: either the image cannot support the
/// requested pyramid, a parameter is out of range, or the matcher was handed
/// descriptor sets it cannot compare. Numeric trouble with individual keypoint candidates is
/// handled inside the detector and never shows up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SiftError {
    #[error(
        "image of {width}x{height} pixels is too small for {octaves} octaves \
         (the coarsest octave must be at least {min_size} pixels wide and high)"
    )]
    ImageTooSmall {
        width: u32,
        height: u32,
        octaves: usize,
        min_size: u32,
    },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("descriptor set {0} is empty")]
    EmptyDescriptorSet(&'static str),

    #[error("descriptor {index} of set {set} has {found} features, expected {expected}")]
    DescriptorLengthMismatch {
        set: &'static str,
        index: usize,
        expected: usize,
        found: usize,
    },
}

impl SiftError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SiftError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SiftError> = std::result::Result<T, E>;
