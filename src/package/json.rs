//! JSON rendering of packaged views.

use serde::{Deserialize, Serialize};

use super::Package;
use crate::error::{Error, Result};

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

/// Convert a package to JSON.
pub fn to_json(package: &Package, format: JsonFormat) -> Result<String> {
    let result = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(package),
        JsonFormat::Compact => serde_json::to_string(package),
    };

    result.map_err(|e| Error::Package(format!("JSON serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use crate::package::Packager;

    #[test]
    fn test_to_json_pretty() {
        let mut doc = Document::new("d1");
        doc.metadata.title = Some("Test".to_string());
        let package = Packager::new().package(&doc);

        let json = to_json(&package, JsonFormat::Pretty).unwrap();
        assert!(json.contains("\"search\""));
        assert!(json.contains("Test"));
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_to_json_compact() {
        let package = Packager::new().package(&Document::new("d1"));
        let json = to_json(&package, JsonFormat::Compact).unwrap();
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_format_serde() {
        assert_eq!(serde_json::to_string(&JsonFormat::Compact).unwrap(), "\"compact\"");
    }
}
