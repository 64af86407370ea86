//! Parsing of ComfyUI history records and status payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to an image produced by an output node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// Every output image in a history record, in node order.
///
/// Entries without a filename are skipped.
pub fn extract_output_images(record: &Value) -> Vec<OutputImage> {
    let Some(outputs) = record.get("outputs").and_then(Value::as_object) else {
        return Vec::new();
    };
    outputs
        .values()
        .filter_map(|node| node.get("images")?.as_array())
        .flatten()
        .filter_map(|image| serde_json::from_value::<OutputImage>(image.clone()).ok())
        .filter(|image| !image.filename.is_empty())
        .collect()
}

/// ComfyUI version from a `/system_stats` payload.
pub fn comfyui_version(stats: &Value) -> Option<&str> {
    stats.pointer("/system/comfyui_version")?.as_str()
}
