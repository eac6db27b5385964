//! Wire types for the `/execute` and `/health` endpoints.

use std::collections::BTreeMap;

use sandbox_core::{ExecutionRequest, SandboxError};
use serde::{Deserialize, Serialize};

/// Entry point forced for the legacy single-`code` form.
pub const LEGACY_ENTRY_POINT: &str = "index.js";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    #[serde(default)]
    pub content: String,
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub files: Option<BTreeMap<String, FileContent>>,
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub test_check: Option<String>,
    /// Legacy single-file submission, staged as `index.js`.
    #[serde(default)]
    pub code: Option<String>,
}

impl ExecuteRequest {
    /// Normalize into an executor request. `files` wins over `code` when both are sent.
    pub fn into_request(self, default_entry_point: &str) -> Result<ExecutionRequest, SandboxError> {
        let (files, entry_point) = match (self.files, self.code) {
            (Some(files), _) => (
                files
                    .into_iter()
                    .map(|(name, file)| (name, file.content))
                    .collect::<BTreeMap<_, _>>(),
                self.entry_point
                    .unwrap_or_else(|| default_entry_point.to_string()),
            ),
            (None, Some(code)) => (
                BTreeMap::from([(LEGACY_ENTRY_POINT.to_string(), code)]),
                LEGACY_ENTRY_POINT.to_string(),
            ),
            (None, None) => {
                return Err(SandboxError::input_validation("No code or files provided."))
            }
        };

        if files.is_empty() {
            return Err(SandboxError::input_validation("No code or files provided."));
        }

        Ok(ExecutionRequest {
            files,
            entry_point,
            test_check: self.test_check,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            service: "sandbox-api".to_string(),
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ExecuteRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_files_form_with_default_entry_point() {
        let request = parse(json!({
            "files": {
                "index.js": { "content": "require('./lib/a')" },
                "lib/a.js": { "content": "module.exports = 1" }
            },
            "testCheck": "return code.includes('lib')"
        }))
        .into_request("index.js")
        .unwrap();

        assert_eq!(request.entry_point, "index.js");
        assert_eq!(request.files.len(), 2);
        assert_eq!(request.files["lib/a.js"], "module.exports = 1");
        assert_eq!(request.test_check.as_deref(), Some("return code.includes('lib')"));
    }

    #[test]
    fn test_explicit_entry_point_is_kept() {
        let request = parse(json!({
            "files": { "main.js": { "content": "1" } },
            "entryPoint": "main.js"
        }))
        .into_request("index.js")
        .unwrap();
        assert_eq!(request.entry_point, "main.js");
    }

    #[test]
    fn test_legacy_code_is_staged_as_index() {
        let request = parse(json!({ "code": "console.log('hi')", "entryPoint": "other.js" }))
            .into_request("main.js")
            .unwrap();

        assert_eq!(request.entry_point, "index.js");
        assert_eq!(request.files["index.js"], "console.log('hi')");
    }

    #[test]
    fn test_missing_content_is_an_empty_file() {
        let request = parse(json!({ "files": { "index.js": {} } }))
            .into_request("index.js")
            .unwrap();
        assert_eq!(request.files["index.js"], "");
    }

    #[test]
    fn test_nothing_submitted_is_rejected() {
        for body in [json!({}), json!({ "files": {} })] {
            let err = parse(body).into_request("index.js").unwrap_err();
            assert!(matches!(err, SandboxError::InputValidation(_)));
        }
    }
}
