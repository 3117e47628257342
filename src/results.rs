//! Results payload model and artifact file extraction.
//!
//! The payload is the JSON document submitted to the results service. Only
//! the parts tesults itself needs are typed (`target`, `results.cases` and
//! each case's `files`); everything else a test-framework integration puts
//! in the document is carried through untouched.
//!
//! ```json
//! {
//!   "target": "<token>",
//!   "results": {
//!     "cases": [
//!       { "name": "login", "result": "pass", "files": ["/tmp/login.png"] },
//!       { "name": "logout", "result": "fail" }
//!     ]
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The full results document submitted to the service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResultsPayload {
    /// Target token identifying where the results are recorded.
    pub target: String,

    /// The test run itself.
    pub results: RunResults,

    /// Any other top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `results` object of a payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RunResults {
    /// Test cases in reporting order.
    #[serde(default)]
    pub cases: Vec<TestCase>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single reported test case.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TestCase {
    /// Local paths of artifacts to upload for this case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,

    /// Name, result, suite, custom fields and so on.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResultsPayload {
    /// Reads a payload from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read results file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse results file: {}", path.display()))
    }
}

/// One artifact file waiting to be uploaded.
///
/// `case_index` is the 0-based position of the owning case in
/// `results.cases` and becomes a segment of the object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UploadTask {
    pub case_index: usize,
    pub local_path: PathBuf,
}

impl UploadTask {
    pub fn new(case_index: usize, local_path: impl Into<PathBuf>) -> Self {
        Self {
            case_index,
            local_path: local_path.into(),
        }
    }

    /// Base name of the local file, as used in the object key and in
    /// warnings. Falls back to the whole path when there is no final
    /// component.
    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.local_path.to_string_lossy().into_owned())
    }

    /// Object key for this file under `key_prefix`.
    pub fn object_key(&self, key_prefix: &str) -> String {
        format!("{}/{}/{}", key_prefix, self.case_index, self.file_name())
    }
}

/// Lists the artifact files referenced by a payload, in upload order.
///
/// Cases are walked in order and files within a case keep their order.
/// Cases without `files` produce nothing but still advance the case index,
/// so every task's index matches its case's position.
///
/// # Example
///
/// ```
/// use tesults::results::{extract_files, ResultsPayload};
///
/// let payload: ResultsPayload = serde_json::from_str(r#"{
///     "target": "token",
///     "results": { "cases": [
///         { "name": "a" },
///         { "name": "b", "files": ["logs/b.log", "shots/b.png"] }
///     ]}
/// }"#).unwrap();
///
/// let tasks = extract_files(&payload);
/// assert_eq!(tasks.len(), 2);
/// assert_eq!(tasks[0].case_index, 1);
/// assert_eq!(tasks[1].object_key("prefix"), "prefix/1/b.png");
/// ```
pub fn extract_files(payload: &ResultsPayload) -> Vec<UploadTask> {
    payload
        .results
        .cases
        .iter()
        .enumerate()
        .flat_map(|(case_index, case)| {
            case.files
                .iter()
                .flatten()
                .map(move |path| UploadTask::new(case_index, path))
        })
        .collect()
}
