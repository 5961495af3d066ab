use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// Writes analysis artifacts into one output directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    out_dir: PathBuf,
    pretty: bool,
}

impl ReportWriter {
    /// Create the writer, creating `out_dir` if it does not exist yet.
    pub fn new(out_dir: impl Into<PathBuf>, pretty: bool) -> anyhow::Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
        Ok(Self { out_dir, pretty })
    }

    pub fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> anyhow::Result<PathBuf> {
        let body = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .with_context(|| format!("Failed to serialize {}", file_name))?;

        self.write_text(file_name, &body)
    }

    pub fn write_text(&self, file_name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = self.out_dir.join(file_name);
        fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Wrote {} ({} bytes)", path.display(), body.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("runscope-report-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_creates_directory_and_writes_json() {
        let dir = temp_dir("json").join("nested");
        let writer = ReportWriter::new(&dir, false).unwrap();
        assert!(dir.is_dir());

        let mut value = BTreeMap::new();
        value.insert("score", 50);
        let path = writer.write_json("summary.json", &value).unwrap();

        assert_eq!(path, dir.join("summary.json"));
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"score":50}"#);
        let _ = fs::remove_dir_all(temp_dir("json"));
    }

    #[test]
    fn test_pretty_json_and_text() {
        let dir = temp_dir("pretty");
        let writer = ReportWriter::new(&dir, true).unwrap();

        let path = writer.write_json("diff.json", &vec![1, 2]).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "[\n  1,\n  2\n]");

        let path = writer.write_text("llm_prompt.txt", "hello\n").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello\n");
        let _ = fs::remove_dir_all(&dir);
    }
}
