//! CLI output: error mapping and result rendering.

use crate::error::FrameError;
use crate::frame::FrameResponse;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &FrameError) -> String {
    e.to_string()
}

/// Render a resolved frame as pretty JSON
pub fn format_frame_response(response: &FrameResponse) -> Result<String, FrameError> {
    serde_json::to_string_pretty(response)
        .map_err(|e| FrameError::Internal(format!("Failed to serialize response: {}", e)))
}
