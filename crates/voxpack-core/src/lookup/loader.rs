use super::{LookupError, LookupResult, RuntimeLookupTable};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Upper bound on the entries pre-allocated from a pack-declared size.
const MAX_SIZE_HINT: usize = 1 << 20;

/// Incremental reader of a static lookup-table file.
///
/// Format: one `key<TAB>value` entry per line. Blank lines and lines
/// starting with `#` are skipped. Malformed lines are logged and skipped.
/// When a key repeats, the first occurrence wins.
///
/// Each call to `next` reads at most `batch_lines` lines and yields the
/// number of entries added, so large tables can be loaded across several
/// host-loop slices. Call [`into_table`](Self::into_table) once the
/// iterator is exhausted.
pub struct StaticTableLoader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    batch_lines: usize,
    line_number: usize,
    entries: HashMap<String, String>,
    finished: bool,
}

impl StaticTableLoader {
    pub fn open(path: impl AsRef<Path>, batch_lines: usize) -> LookupResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| LookupError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            batch_lines: batch_lines.max(1),
            line_number: 0,
            entries: HashMap::new(),
            finished: false,
        })
    }

    /// Pre-sizes the table when the pack declares its entry count.
    ///
    /// The hint comes from pack config and is capped; a failed reservation
    /// only means the table grows as it is read.
    pub fn with_size_hint(mut self, entries: usize) -> Self {
        let hint = entries.min(MAX_SIZE_HINT);
        if let Err(err) = self.entries.try_reserve(hint) {
            log::warn!(
                "Ignoring size hint {} for {}: {}",
                entries,
                self.path.display(),
                err
            );
        }
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries read so far.
    pub fn loaded(&self) -> usize {
        self.entries.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads the rest of the file and returns the finished table.
    pub fn into_table(mut self) -> LookupResult<RuntimeLookupTable> {
        for batch in &mut self {
            batch?;
        }
        log::debug!(
            "Loaded {} lookup entries from {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(RuntimeLookupTable::from_static(self.entries))
    }

    /// Reads up to `batch_lines` lines. `None` once the file is exhausted.
    fn read_batch(&mut self) -> LookupResult<Option<usize>> {
        let before = self.entries.len();
        let mut read = 0;
        while read < self.batch_lines {
            let Some(line) = self.lines.next() else {
                self.finished = true;
                break;
            };
            read += 1;
            self.line_number += 1;
            let line = line.map_err(|source| LookupError::Io {
                path: self.path.clone(),
                source,
            })?;
            self.parse_line(&line);
        }
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(self.entries.len() - before))
    }

    fn parse_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            return;
        }
        match line.split_once('\t') {
            Some((key, value)) if !key.is_empty() => {
                self.entries
                    .entry(key.to_string())
                    .or_insert_with(|| value.to_string());
            }
            _ => log::warn!(
                "Skipping malformed lookup entry at {}:{}",
                self.path.display(),
                self.line_number
            ),
        }
    }
}

impl Iterator for StaticTableLoader {
    type Item = LookupResult<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_batch() {
            Ok(Some(entries)) => Some(Ok(entries)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl std::fmt::Debug for StaticTableLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTableLoader")
            .field("path", &self.path)
            .field("batch_lines", &self.batch_lines)
            .field("loaded", &self.entries.len())
            .field("finished", &self.finished)
            .finish()
    }
}
