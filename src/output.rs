//! Result sinks: where streamed analysis responses end up.
//!
//! The aggregator hands every streamed message to a [`ResponseSink`].
//! Console output groups notes under the absolute file path they point at;
//! JSON output serializes the raw message to a file instead.

use crate::rpc::{AnalysisResponse, Note};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Consumer of streamed analysis responses.
pub trait ResponseSink: Send {
    fn handle(&mut self, msg: &AnalysisResponse) -> Result<()>;
}

/// Renders responses as grouped plain text.
pub struct ConsoleSink<W: Write + Send> {
    root: PathBuf,
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    /// Console sink printing to stdout, resolving note paths against `root`.
    pub fn stdout(root: &Path) -> Self {
        ConsoleSink {
            root: root.to_path_buf(),
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn with_writer(root: &Path, out: W) -> Self {
        ConsoleSink {
            root: root.to_path_buf(),
            out,
        }
    }

    fn render_note(&mut self, note: &Note) -> Result<()> {
        let mut loc = String::new();
        if let Some(range) = note.location.as_ref().and_then(|l| l.range.as_ref()) {
            match (range.start_line, range.start_column) {
                (Some(line), Some(col)) => loc = format!("Line {line}, Col {col} "),
                (Some(line), None) => loc = format!("Line {line} "),
                _ => {}
            }
        }
        let subcat = note
            .subcategory
            .as_ref()
            .map(|s| format!(":{s}"))
            .unwrap_or_default();
        writeln!(self.out, "{loc}[{}{subcat}]", note.category)?;
        writeln!(self.out, "\t{}", note.description)?;
        Ok(())
    }
}

impl<W: Write + Send> ResponseSink for ConsoleSink<W> {
    fn handle(&mut self, msg: &AnalysisResponse) -> Result<()> {
        for failure in &msg.failures {
            writeln!(
                self.out,
                "WARNING: Analyzer {} failed to run: {}",
                failure.category, failure.message
            )?;
        }

        // Group by resolved absolute path; path-less notes fall under the
        // "Global" heading. BTreeMap keeps the groups in sorted order.
        let mut by_path: BTreeMap<String, Vec<&Note>> = BTreeMap::new();
        for note in &msg.notes {
            let path = note
                .location
                .as_ref()
                .map(|l| self.root.join(&l.path).display().to_string())
                .unwrap_or_default();
            by_path.entry(path).or_default().push(note);
        }

        for (path, notes) in by_path {
            if path.is_empty() {
                writeln!(self.out, "Global")?;
            } else {
                writeln!(self.out, "{path}")?;
            }
            for note in notes {
                self.render_note(note)?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }
}

/// Serializes each response to a file. Every message overwrites the file,
/// so the last streamed message is what remains.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: &Path) -> Self {
        JsonFileSink {
            path: path.to_path_buf(),
        }
    }
}

impl ResponseSink for JsonFileSink {
    fn handle(&mut self, msg: &AnalysisResponse) -> Result<()> {
        let json = serde_json::to_string(msg).context("could not serialize response")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("could not write {}", self.path.display()))?;
        Ok(())
    }
}

/// Picks the sink for a run: JSON when an output file was configured,
/// console otherwise.
pub fn sink_for(root: &Path, json_output: Option<&Path>) -> Box<dyn ResponseSink> {
    match json_output {
        Some(path) => Box::new(JsonFileSink::new(path)),
        None => Box::new(ConsoleSink::stdout(root)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{AnalyzerFailure, Location, SourceRange};

    fn note(category: &str, path: Option<&str>, line: Option<u32>, col: Option<u32>) -> Note {
        Note {
            category: category.to_string(),
            subcategory: None,
            location: path.map(|p| Location {
                path: p.to_string(),
                range: line.map(|l| SourceRange {
                    start_line: Some(l),
                    start_column: col,
                    ..Default::default()
                }),
            }),
            description: "something is off".to_string(),
        }
    }

    fn render(msg: &AnalysisResponse) -> String {
        let mut sink = ConsoleSink::with_writer(Path::new("/repo"), Vec::new());
        sink.handle(msg).unwrap();
        String::from_utf8(sink.out).unwrap()
    }

    #[test]
    fn groups_by_resolved_path_with_global_last_resort() {
        let msg = AnalysisResponse {
            failures: Vec::new(),
            notes: vec![
                note("Lint", Some("src/a.c"), None, None),
                note("Vet", None, None, None),
            ],
        };
        let text = render(&msg);
        assert!(text.contains("/repo/src/a.c\n"));
        assert!(text.contains("Global\n"));
    }

    #[test]
    fn renders_line_and_column() {
        let msg = AnalysisResponse {
            failures: Vec::new(),
            notes: vec![note("Lint", Some("a.c"), Some(4), Some(9))],
        };
        assert!(render(&msg).contains("Line 4, Col 9 [Lint]"));
    }

    #[test]
    fn renders_line_without_column() {
        let msg = AnalysisResponse {
            failures: Vec::new(),
            notes: vec![note("Lint", Some("a.c"), Some(4), None)],
        };
        assert!(render(&msg).contains("Line 4 [Lint]"));
    }

    #[test]
    fn renders_subcategory() {
        let mut n = note("Lint", Some("a.c"), None, None);
        n.subcategory = Some("style".to_string());
        let msg = AnalysisResponse {
            failures: Vec::new(),
            notes: vec![n],
        };
        assert!(render(&msg).contains("[Lint:style]"));
    }

    #[test]
    fn failures_render_as_warnings() {
        let msg = AnalysisResponse {
            failures: vec![AnalyzerFailure {
                category: "PyLint".to_string(),
                message: "no interpreter".to_string(),
            }],
            notes: Vec::new(),
        };
        assert!(render(&msg).contains("WARNING: Analyzer PyLint failed to run: no interpreter"));
    }

    #[test]
    fn json_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut sink = JsonFileSink::new(&path);
        sink.handle(&AnalysisResponse::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: AnalysisResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, AnalysisResponse::default());
    }
}
