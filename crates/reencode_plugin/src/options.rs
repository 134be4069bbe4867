//! Reading `reencodeVideo` options from JSON.

use reencode_core::models::ReencodeRequest;
use serde_json::Value;

use crate::errors::{PluginError, PluginResult};

/// Build a validated request from the JS options object.
///
/// Missing or mistyped options are reported in the order inputPath,
/// outputPath, height, width. An absent or non-numeric `bitrate` means 0,
/// the engine default.
pub fn parse_reencode_options(options: &Value) -> PluginResult<ReencodeRequest> {
    let input_path = string_option(options, "inputPath").ok_or(PluginError::MissingOption("Input path"))?;
    let output_path =
        string_option(options, "outputPath").ok_or(PluginError::MissingOption("Output path"))?;
    let height = int_option(options, "height").ok_or(PluginError::MissingOption("Height"))?;
    let width = int_option(options, "width").ok_or(PluginError::MissingOption("Width"))?;
    let bitrate = int_option(options, "bitrate").unwrap_or(0);

    Ok(ReencodeRequest::new(
        input_path,
        output_path,
        width,
        height,
        bitrate,
    )?)
}

fn string_option<'a>(options: &'a Value, key: &str) -> Option<&'a str> {
    options.get(key)?.as_str()
}

/// Integers, or floats without a fractional part. Out-of-range floats
/// saturate so range checks still reject them.
fn int_option(options: &Value, key: &str) -> Option<i64> {
    let value = options.get(key)?;
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if value.as_u64().is_some() {
        return Some(i64::MAX);
    }
    let f = value.as_f64()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn err(options: Value) -> String {
        parse_reencode_options(&options).unwrap_err().to_string()
    }

    #[test]
    fn parses_full_options() {
        let req = parse_reencode_options(&json!({
            "inputPath": "/tmp/a.mov",
            "outputPath": "/tmp/b.mp4",
            "width": 960,
            "height": 540,
            "bitrate": 2097152
        }))
        .unwrap();
        assert_eq!(req.input_path(), "/tmp/a.mov");
        assert_eq!(req.output_path(), "/tmp/b.mp4");
        assert_eq!((req.target_width(), req.target_height()), (960, 540));
        assert_eq!(req.bitrate(), 2_097_152);
    }

    #[test]
    fn bitrate_is_optional() {
        let req = parse_reencode_options(&json!({
            "inputPath": "a", "outputPath": "b", "width": 2, "height": 2
        }))
        .unwrap();
        assert!(req.uses_default_bitrate());

        let req = parse_reencode_options(&json!({
            "inputPath": "a", "outputPath": "b", "width": 2, "height": 2, "bitrate": null
        }))
        .unwrap();
        assert!(req.uses_default_bitrate());
    }

    #[test]
    fn missing_options_in_reporting_order() {
        assert_eq!(err(json!({})), "Input path is required");
        assert_eq!(err(json!({"inputPath": 5})), "Input path is required");
        assert_eq!(err(json!({"inputPath": "a"})), "Output path is required");
        assert_eq!(
            err(json!({"inputPath": "a", "outputPath": "b", "width": 1})),
            "Height is required"
        );
        assert_eq!(
            err(json!({"inputPath": "a", "outputPath": "b", "height": 1})),
            "Width is required"
        );
    }

    #[test]
    fn range_errors_come_from_request_validation() {
        assert_eq!(
            err(json!({"inputPath": "a", "outputPath": "b", "width": 0, "height": 0})),
            "Height must be between 0 and 2147483647"
        );
        assert_eq!(
            err(json!({"inputPath": "a", "outputPath": "b", "width": 3e10, "height": 1})),
            "Width must be between 0 and 2147483647"
        );
        assert_eq!(
            err(json!({"inputPath": "a", "outputPath": "b", "width": 1, "height": 1, "bitrate": -1})),
            "Negative bitrate is illegal!"
        );
    }

    #[test]
    fn whole_floats_count_as_integers() {
        let req = parse_reencode_options(&json!({
            "inputPath": "a", "outputPath": "b", "width": 640.0, "height": 360.0
        }))
        .unwrap();
        assert_eq!((req.target_width(), req.target_height()), (640, 360));
        assert_eq!(err(json!({"inputPath": "a", "outputPath": "b", "width": 1, "height": 1.5})), "Height is required");
    }
}
