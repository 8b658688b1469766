//! Debug information: program-counter to source location mapping

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::vm::program::{LoadError, Program};

/// A single line-table row: code at `address` and above belongs to `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// Code address (bytes)
    pub address: usize,
    /// Index into the file table
    pub file: usize,
    /// 1-based source line
    pub line: u32,
}

/// Resolved source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "File: {}, line: {}", self.file, self.line)
    }
}

/// Debug information section of a program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    files: Vec<String>,
    /// Sorted by address.
    lines: Vec<LineEntry>,
}

impl DebugInfo {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw tables. Line entries are sorted by address.
    pub fn from_parts(
        files: Vec<String>,
        mut lines: Vec<LineEntry>,
    ) -> Self {
        lines.sort_by_key(|l| l.address);
        Self { files, lines }
    }

    /// Intern a file name, returning its index
    pub fn add_file(
        &mut self,
        name: &str,
    ) -> usize {
        if let Some(idx) = self.files.iter().position(|f| f == name) {
            return idx;
        }
        self.files.push(name.to_string());
        self.files.len() - 1
    }

    /// Record that code at `address` belongs to `file:line`.
    pub fn add_line(
        &mut self,
        address: usize,
        file: usize,
        line: u32,
    ) {
        let entry = LineEntry {
            address,
            file,
            line,
        };
        let pos = self.lines.partition_point(|l| l.address <= address);
        self.lines.insert(pos, entry);
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn lines(&self) -> &[LineEntry] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Resolve a program counter to the closest preceding line entry.
    pub fn lookup(
        &self,
        pc: usize,
    ) -> Option<SourceLocation> {
        let idx = self.lines.partition_point(|l| l.address <= pc);
        let entry = self.lines.get(idx.checked_sub(1)?)?;
        let file = self.files.get(entry.file)?;
        Some(SourceLocation {
            file: file.clone(),
            line: entry.line,
        })
    }

    /// Load only the debug section from an image on disk.
    ///
    /// Fails with [`LoadError::NoDebugInfo`] when the image was built without it.
    pub fn load_from_path(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let program = Program::read_from(&mut BufReader::new(file), true)?;
        program.debug.ok_or(LoadError::NoDebugInfo)
    }
}
