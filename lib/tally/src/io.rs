use crate::api::{Batch, FinalAverage, Record};
use crate::error::{PipelineError, Result};
use memchr::memchr;
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Names of the key and value columns expected in every input header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub key_column: String,
    pub value_column: String,
}

impl Schema {
    pub fn new(key_column: impl Into<String>, value_column: impl Into<String>) -> Self {
        Self { key_column: key_column.into(), value_column: value_column.into() }
    }
}

impl Default for Schema {
    fn default() -> Self { Self::new(crate::constants::DEFAULT_KEY_COLUMN, crate::constants::DEFAULT_VALUE_COLUMN) }
}

pub fn ensure_dir(path: impl AsRef<Path>) -> std::io::Result<()> {
    fs::create_dir_all(path.as_ref())
}

/// Regular files and symlinks under `dir` whose file name matches `pattern`,
/// in lexical path order.
pub fn list_input_files(dir: &Path, pattern: &glob::Pattern, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = walkdir::WalkDir::new(dir).min_depth(1);
    if !recursive { walker = walker.max_depth(1); }
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            PipelineError::file_read(path, e.into())
        })?;
        // Symlinks are kept unresolved so a dangling link fails in `load_batch`.
        let ft = entry.file_type();
        if !ft.is_file() && !ft.is_symlink() { continue; }
        if entry.file_name().to_str().is_some_and(|name| pattern.matches(name)) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Loads one file as a batch. Nothing is returned unless the whole file parsed.
pub fn load_batch(path: &Path, schema: &Schema) -> Result<Batch> {
    let file = File::open(path).map_err(|e| PipelineError::file_read(path, e))?;
    let len = file.metadata().map_err(|e| PipelineError::file_read(path, e))?.len();
    if len == 0 {
        return Err(PipelineError::parse(path, 1, "empty file, expected a header line"));
    }
    let map = unsafe { Mmap::map(&file) }.map_err(|e| PipelineError::file_read(path, e))?;
    parse_batch(path, &map[..], schema)
}

/// Parses CSV bytes: one header line naming the schema columns, then one record per line.
pub fn parse_batch(path: &Path, bytes: &[u8], schema: &Schema) -> Result<Batch> {
    let mut lines = LineIter { bytes, offset: 0, line_no: 0 };

    let (_, header) = lines
        .next()
        .ok_or_else(|| PipelineError::parse(path, 1, "missing header line"))?;
    let header = std::str::from_utf8(header).map_err(|_| PipelineError::parse(path, 1, "header is not valid UTF-8"))?;
    let header = header.strip_prefix('\u{feff}').unwrap_or(header);
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let find = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| PipelineError::parse(path, 1, format!("header is missing column '{name}'")))
    };
    let key_idx = find(&schema.key_column)?;
    let value_idx = find(&schema.value_column)?;
    let width = columns.len();

    let mut records = Vec::with_capacity(bytes.len() / 16);
    let mut fields: Vec<&str> = Vec::with_capacity(width);
    for (line_no, raw) in lines {
        if raw.is_empty() { continue; }
        let line = std::str::from_utf8(raw).map_err(|_| PipelineError::parse(path, line_no, "line is not valid UTF-8"))?;
        fields.clear();
        fields.extend(line.split(','));
        if fields.len() != width {
            return Err(PipelineError::parse(path, line_no, format!("expected {} fields, found {}", width, fields.len())));
        }
        let key = fields[key_idx].trim();
        if key.is_empty() {
            return Err(PipelineError::parse(path, line_no, format!("empty '{}'", schema.key_column)));
        }
        let raw_value = fields[value_idx].trim();
        let value: f64 = raw_value
            .parse()
            .map_err(|_| PipelineError::parse(path, line_no, format!("invalid number '{raw_value}' in '{}'", schema.value_column)))?;
        if !value.is_finite() {
            return Err(PipelineError::parse(path, line_no, format!("non-finite value '{raw_value}'")));
        }
        records.push(Record::new(key, value));
    }
    Ok(Batch { source: path.to_path_buf(), records, bytes: bytes.len() as u64 })
}

// Yields (1-based line number, line bytes without the trailing \n or \r\n).
struct LineIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    line_no: usize,
}

impl<'a> Iterator for LineIter<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() { return None; }
        let start = self.offset;
        let nl = memchr(b'\n', &self.bytes[start..]).map(|i| start + i).unwrap_or(self.bytes.len());
        self.offset = nl + 1;
        self.line_no += 1;
        let mut end = nl;
        if end > start && self.bytes[end - 1] == b'\r' { end -= 1; }
        Some((self.line_no, &self.bytes[start..end]))
    }
}

/// Writes `key,average` rows. The file appears at `path` only once fully written.
pub fn write_averages(path: &Path, averages: &FinalAverage) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent).map_err(|e| PipelineError::output_write(path, e))?;
    let tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| PipelineError::output_write(path, e))?;
    let mut w = BufWriter::new(tmp);
    write_rows(&mut w, averages).map_err(|e| PipelineError::output_write(path, e))?;
    let tmp = w.into_inner().map_err(|e| PipelineError::output_write(path, e.into_error()))?;
    tmp.persist(path).map_err(|e| PipelineError::output_write(path, e.error))?;
    Ok(())
}

fn write_rows<W: Write>(w: &mut W, averages: &FinalAverage) -> std::io::Result<()> {
    writeln!(w, "key,average")?;
    for row in averages.rows() {
        writeln!(w, "{},{}", row.key, row.average)?;
    }
    w.flush()
}
