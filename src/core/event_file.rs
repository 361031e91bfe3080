//! Event files.
//!
//! An event file is a newline-delimited JSON stream of tagged records:
//! - one `file` record with the file metadata
//! - one `event` record per stored event, keyed by branch name
//! - one `schema` record listing the products written
//! - one `run` record per run header
//!
//! Input files are read completely when opened. Output files are written
//! as events are stored and finalized by [`EventFile::close`], which flushes
//! the schema and the run headers. An output file may be chained to a
//! parent input file; it then iterates the parent's entries, filtered by its
//! drop/keep rules.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{EventHeader, ProductTag, RunHeader};

use super::drop_keep::DropKeepRules;
use super::error::FrameworkError;
use super::event::{Event, EventEntry};

/// Metadata stored at the top of every file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Unique file id
    pub id: Uuid,

    /// When the file was created
    pub created: DateTime<Utc>,

    /// Pass that wrote the file
    pub pass: String,

    /// Requested compression setting
    pub compression: i32,
}

/// One line of an event file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum FileRecord {
    File(FileMetadata),
    Event { products: EventEntry },
    Schema { products: Vec<ProductTag> },
    Run(RunHeader),
}

/// Where a run header held by a file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSource {
    /// Read from this file or its parent
    Imported,

    /// Created during this process
    Created,
}

#[derive(Debug, Clone)]
struct RunHeaderEntry {
    header: RunHeader,
    source: HeaderSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Input,
    Output,
}

/// A readable or writable stream of events
#[derive(Debug)]
pub struct EventFile {
    path: PathBuf,
    kind: FileKind,
    metadata: Option<FileMetadata>,

    /// Entries of an input file
    entries: Vec<EventEntry>,

    /// Products declared by an input file
    schema: Vec<ProductTag>,

    /// Wrap around to the first entry at end of file
    loopable: bool,

    writer: Option<BufWriter<File>>,
    parent: Option<Box<EventFile>>,
    single_output: bool,
    rules: DropKeepRules,

    /// Products written to an output file
    written: BTreeMap<String, ProductTag>,

    /// Current entry, `None` before the first one
    entry_index: Option<usize>,

    /// Number of events stored in an output file
    events_written: usize,

    runs: BTreeMap<i32, RunHeaderEntry>,
    closed: bool,
}

impl EventFile {
    /// Open an existing file for reading
    pub fn open_input(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_reader(path.as_ref(), false)
    }

    /// Open an existing file for reading, wrapping around at the end
    pub fn open_loopable(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_reader(path.as_ref(), true)
    }

    fn open_reader(path: &Path, loopable: bool) -> Result<Self> {
        let file = File::open(path).map_err(|_| FrameworkError::FileNotReadable {
            path: path.to_path_buf(),
        })?;

        let mut metadata = None;
        let mut entries = Vec::new();
        let mut schema = Vec::new();
        let mut runs = BTreeMap::new();

        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.with_context(|| format!("Failed to read line {} of {}", number + 1, path.display()))?;
            if line.trim().is_empty() {
                continue;
            }

            let record: FileRecord = serde_json::from_str(&line).with_context(|| {
                format!("Failed to parse record on line {} of {}", number + 1, path.display())
            })?;

            match record {
                FileRecord::File(meta) => metadata = Some(meta),
                FileRecord::Event { products } => entries.push(products),
                FileRecord::Schema { products } => schema.extend(products),
                FileRecord::Run(header) => {
                    runs.insert(
                        header.run_number,
                        RunHeaderEntry {
                            header,
                            source: HeaderSource::Imported,
                        },
                    );
                }
            }
        }

        debug!(
            path = %path.display(),
            entries = entries.len(),
            runs = runs.len(),
            "Opened input file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            kind: FileKind::Input,
            metadata,
            entries,
            schema,
            loopable,
            writer: None,
            parent: None,
            single_output: false,
            rules: DropKeepRules::new(),
            written: BTreeMap::new(),
            entry_index: None,
            events_written: 0,
            runs,
            closed: false,
        })
    }

    /// Create an output file, replacing any existing file at `path`
    ///
    /// With a parent, events are read from the parent and the parent's run
    /// headers are imported. Without one, events come from the producers
    /// in the sequence.
    pub fn create_output(
        path: impl AsRef<Path>,
        parent: Option<EventFile>,
        single_output: bool,
        pass: &str,
        compression: i32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let not_writable = |reason: String| FrameworkError::FileNotWritable {
            path: path.to_path_buf(),
            reason,
        };

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| not_writable(e.to_string()))?;
        file.try_lock_exclusive()
            .map_err(|e| not_writable(format!("failed to acquire file lock: {}", e)))?;
        file.set_len(0).map_err(|e| not_writable(e.to_string()))?;

        let metadata = FileMetadata {
            id: Uuid::new_v4(),
            created: Utc::now(),
            pass: pass.to_string(),
            compression,
        };

        let has_parent = parent.is_some();
        let mut out = Self {
            path: path.to_path_buf(),
            kind: FileKind::Output,
            metadata: Some(metadata.clone()),
            entries: Vec::new(),
            schema: Vec::new(),
            loopable: false,
            writer: Some(BufWriter::new(file)),
            parent: parent.map(Box::new),
            single_output,
            rules: DropKeepRules::new(),
            written: BTreeMap::new(),
            entry_index: if has_parent { None } else { Some(0) },
            events_written: 0,
            runs: BTreeMap::new(),
            closed: false,
        };

        out.write_record(&FileRecord::File(metadata))?;
        out.import_run_headers();

        info!(path = %path.display(), has_parent, single_output, "Created output file");
        Ok(out)
    }

    /// Add a drop/keep/ignore rule
    ///
    /// Rules only affect output files and must be added before the first
    /// event is read.
    pub fn add_drop(&mut self, rule: &str) -> Result<(), FrameworkError> {
        self.rules.add(rule)
    }

    /// Move to the next event
    ///
    /// For an output file the current event is written first if
    /// `store_current` is true, otherwise it is discarded. Returns false
    /// once there are no more events to read. An output file without a
    /// parent never runs out.
    pub fn next_event(&mut self, event: &mut Event, store_current: bool) -> Result<bool> {
        if self.entry_index.is_some() {
            if self.kind == FileKind::Output && store_current {
                self.store(event)?;
            }
            event.clear();
        }

        if let Some(parent) = self.parent.as_mut() {
            if !parent.advance(event, &self.rules)? {
                return Ok(false);
            }
            self.entry_index = parent.entry_index;
            return Ok(true);
        }

        if self.kind == FileKind::Output {
            self.entry_index = Some(self.entry_index.map_or(0, |i| i + 1));
            return Ok(true);
        }

        let rules = DropKeepRules::new();
        self.advance(event, &rules)
    }

    /// Skip forward by `offset` entries (modulo the number of entries)
    ///
    /// Returns the entry now loaded, or `None` if the file ran out.
    pub fn skip_to_event(&mut self, event: &mut Event, offset: usize) -> Result<Option<usize>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let shift = offset % self.entries.len();
        for _ in 0..shift {
            if !self.next_event(event, false)? {
                return Ok(None);
            }
        }
        Ok(self.entry_index)
    }

    /// Read the next entry of an input file into the event
    fn advance(&mut self, event: &mut Event, rules: &DropKeepRules) -> Result<bool> {
        let mut next = self.entry_index.map_or(0, |i| i + 1);
        if self.entry_index.is_none() {
            event.register_products(self.schema.iter().filter(|t| rules.should_read(&t.branch())));
        }

        if next >= self.entries.len() {
            if !self.loopable || self.entries.is_empty() {
                return Ok(false);
            }
            debug!(path = %self.path.display(), "Looping back to the first entry");
            event.on_end_of_file();
            event.register_products(self.schema.iter().filter(|t| rules.should_read(&t.branch())));
            next = 0;
        }

        let entry: EventEntry = self.entries[next]
            .iter()
            .filter(|(branch, _)| rules.should_read(branch))
            .map(|(branch, value)| (branch.clone(), value.clone()))
            .collect();

        event
            .load_entry(entry)
            .with_context(|| format!("Bad entry {} in {}", next, self.path.display()))?;
        self.entry_index = Some(next);
        Ok(true)
    }

    fn store(&mut self, event: &Event) -> Result<()> {
        let products = event.output_entry(&self.rules)?;

        for branch in products.keys() {
            if branch == EventHeader::BRANCH || self.written.contains_key(branch) {
                continue;
            }
            let tag = event
                .tag(branch)
                .cloned()
                .unwrap_or_else(|| ProductTag::from_branch(branch, "unknown"));
            self.written.insert(branch.clone(), tag);
        }

        self.write_record(&FileRecord::Event { products })?;
        self.events_written += 1;
        Ok(())
    }

    /// Rebind the parent of a merged output file
    ///
    /// The output stays open; run headers of the new parent are imported.
    pub fn update_parent(&mut self, parent: EventFile) {
        info!(
            output = %self.path.display(),
            parent = %parent.path.display(),
            "Switching parent file"
        );
        self.parent = Some(Box::new(parent));
        self.entry_index = None;
        self.import_run_headers();
    }

    pub fn parent(&self) -> Option<&EventFile> {
        self.parent.as_deref()
    }

    fn import_run_headers(&mut self) {
        let Some(parent) = self.parent.as_ref() else {
            return;
        };
        for (run, entry) in &parent.runs {
            if self.runs.contains_key(run) {
                debug!(run, "Run header already held, not importing again");
                continue;
            }
            self.runs.insert(
                *run,
                RunHeaderEntry {
                    header: entry.header.clone(),
                    source: HeaderSource::Imported,
                },
            );
        }
    }

    /// Hand a run header created during this process to the file
    pub fn write_run_header(&mut self, header: RunHeader) -> Result<(), FrameworkError> {
        let run = header.run_number;
        if self.runs.contains_key(&run) {
            return Err(FrameworkError::DuplicateRun(run));
        }
        self.runs.insert(
            run,
            RunHeaderEntry {
                header,
                source: HeaderSource::Created,
            },
        );
        Ok(())
    }

    pub fn run_header(&self, run: i32) -> Result<&RunHeader, FrameworkError> {
        self.runs
            .get(&run)
            .map(|e| &e.header)
            .ok_or(FrameworkError::MissingRunHeader(run))
    }

    pub fn run_header_mut(&mut self, run: i32) -> Result<&mut RunHeader, FrameworkError> {
        self.runs
            .get_mut(&run)
            .map(|e| &mut e.header)
            .ok_or(FrameworkError::MissingRunHeader(run))
    }

    pub fn header_source(&self, run: i32) -> Option<HeaderSource> {
        self.runs.get(&run).map(|e| e.source)
    }

    /// All run headers held by this file, ordered by run number
    pub fn run_headers(&self) -> impl Iterator<Item = &RunHeader> {
        self.runs.values().map(|e| &e.header)
    }

    pub fn file_name(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.metadata.as_ref()
    }

    /// Products declared by an input file
    pub fn schema(&self) -> &[ProductTag] {
        &self.schema
    }

    /// Stored entries of an input file
    pub fn entries(&self) -> &[EventEntry] {
        &self.entries
    }

    pub fn is_output(&self) -> bool {
        self.kind == FileKind::Output
    }

    pub fn is_single_output(&self) -> bool {
        self.single_output
    }

    pub fn events_written(&self) -> usize {
        self.events_written
    }

    /// Finalize an output file
    ///
    /// Writes the schema and every run header, then releases the file.
    /// Closing an input file, or closing twice, does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed || self.kind != FileKind::Output {
            return Ok(());
        }

        let schema = FileRecord::Schema {
            products: self.written.values().cloned().collect(),
        };
        self.write_record(&schema)?;

        let runs: Vec<RunHeader> = self.runs.values().map(|e| e.header.clone()).collect();
        for header in runs {
            self.write_record(&FileRecord::Run(header))?;
        }

        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.path.display()))?;
            let file = writer
                .into_inner()
                .map_err(|e| anyhow::anyhow!("Failed to finish {}: {}", self.path.display(), e))?;
            if let Err(e) = file.unlock() {
                warn!(path = %self.path.display(), error = %e, "Failed to release file lock");
            }
        }

        self.closed = true;
        info!(
            path = %self.path.display(),
            events = self.events_written,
            runs = self.runs.len(),
            "Closed output file"
        );
        Ok(())
    }

    fn write_record(&mut self, record: &FileRecord) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .with_context(|| format!("Output file {} is already closed", self.path.display()))?;
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        writeln!(writer, "{}", json)
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        Ok(())
    }
}
