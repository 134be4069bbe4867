//! Re-encode request value object and its validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Argument errors caught before anything reaches the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingArgument(&'static str),

    #[error("{name} must be between 0 and {max}")]
    DimensionOutOfRange { name: &'static str, max: i32 },

    #[error("Negative bitrate is illegal!")]
    NegativeBitrate,

    #[error("Bitrate must not exceed {max}")]
    BitrateOutOfRange { max: i32 },
}

/// A validated re-encode request.
///
/// Dimensions are in `(0, i32::MAX]`, bitrate is in `[0, i32::MAX]` with 0
/// meaning "engine default". Fields are private so a request can only be
/// built through [`ReencodeRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReencodeRequest {
    input_path: String,
    output_path: String,
    target_width: i32,
    target_height: i32,
    bitrate: i32,
}

impl ReencodeRequest {
    /// Validate raw arguments into a request.
    ///
    /// Checks run in the order the plugin reports them: paths, height,
    /// width, bitrate.
    pub fn new(
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        width: i64,
        height: i64,
        bitrate: i64,
    ) -> Result<Self, ValidationError> {
        let input_path = input_path.into();
        let output_path = output_path.into();

        if input_path.is_empty() {
            return Err(ValidationError::MissingArgument("Input path"));
        }
        if output_path.is_empty() {
            return Err(ValidationError::MissingArgument("Output path"));
        }

        let target_height = dimension("Height", height)?;
        let target_width = dimension("Width", width)?;

        if bitrate < 0 {
            return Err(ValidationError::NegativeBitrate);
        }
        let bitrate = i32::try_from(bitrate)
            .map_err(|_| ValidationError::BitrateOutOfRange { max: i32::MAX })?;

        Ok(Self {
            input_path,
            output_path,
            target_width,
            target_height,
            bitrate,
        })
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    pub fn target_width(&self) -> i32 {
        self.target_width
    }

    pub fn target_height(&self) -> i32 {
        self.target_height
    }

    /// Bitrate in bits per second, 0 for the engine default.
    pub fn bitrate(&self) -> i32 {
        self.bitrate
    }

    pub fn uses_default_bitrate(&self) -> bool {
        self.bitrate == 0
    }

    /// Short human label for the job (input file name).
    pub fn display_name(&self) -> &str {
        self.input_path
            .rsplit(['/', '\\'])
            .find(|part| !part.is_empty())
            .unwrap_or(&self.input_path)
    }
}

fn dimension(name: &'static str, value: i64) -> Result<i32, ValidationError> {
    match i32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ValidationError::DimensionOutOfRange {
            name,
            max: i32::MAX,
        }),
    }
}
