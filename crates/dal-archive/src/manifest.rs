//! Archive layout

use chrono::Utc;
use dal_persistence::DocumentRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};

/// Name of the manifest entry
pub const MANIFEST_FILE: &str = "manifest.json";

/// Entry holding the stored document
pub const DATA_FILE: &str = "data.json";

/// Entry holding the document's relations at backup time
pub const RELATION_FILE: &str = "relation.json";

/// Archive table of contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Caller-supplied metadata, `null` when none
    #[serde(default)]
    pub metadata: Value,
    /// Creation time, RFC 3339
    pub date: String,
    /// Archived document paths
    pub manifest: Vec<String>,
}

impl Manifest {
    /// Manifest dated now
    #[must_use]
    pub fn new(metadata: Value, paths: Vec<String>) -> Self {
        Self {
            metadata,
            date: Utc::now().to_rfc3339(),
            manifest: paths,
        }
    }
}

/// Directory of a document inside the archive
#[must_use]
pub fn entry_dir(doc: &DocumentRef) -> String {
    format!("{}/{}/{}/{}", doc.workspace, doc.scope, doc.reference, doc.version)
}

/// `data.json` entry of a document
#[must_use]
pub fn data_entry(doc: &DocumentRef) -> String {
    format!("{}/{DATA_FILE}", entry_dir(doc))
}

/// `relation.json` entry of a document
#[must_use]
pub fn relation_entry(doc: &DocumentRef) -> String {
    format!("{}/{RELATION_FILE}", entry_dir(doc))
}

/// Copy `reader` into `writer` through one buffer of `chunk_size` bytes
pub(crate) fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> std::io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn entry_names() {
        let doc = DocumentRef::new("demo", "Node", "arm/left", "v1");
        assert_eq!(data_entry(&doc), "demo/Node/arm/left/v1/data.json");
        assert_eq!(relation_entry(&doc), "demo/Node/arm/left/v1/relation.json");
    }

    #[test]
    fn manifest_json_shape() {
        let manifest = Manifest::new(json!({"label": "nightly"}), vec!["global/Flow/f1/__UNVERSIONED__".into()]);
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["metadata"], json!({"label": "nightly"}));
        assert_eq!(value["manifest"], json!(["global/Flow/f1/__UNVERSIONED__"]));
        assert!(chrono::DateTime::parse_from_rfc3339(value["date"].as_str().unwrap()).is_ok());

        let parsed: Manifest = serde_json::from_value(json!({"date": "x", "manifest": []})).unwrap();
        assert_eq!(parsed.metadata, Value::Null);
    }

    #[test]
    fn chunked_copy_crosses_buffers() {
        let input: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut output = Vec::new();
        let copied = copy_chunked(&mut input.as_slice(), &mut output, 4096).unwrap();
        assert_eq!(copied, 10_000);
        assert_eq!(output, input);

        let mut output = Vec::new();
        copy_chunked(&mut input.as_slice(), &mut output, 0).unwrap();
        assert_eq!(output.len(), 10_000);
    }
}
