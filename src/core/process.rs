//! The event loop.
//!
//! A [`Process`] owns the module sequence, the conditions providers and the
//! storage control of one processing pass. [`Process::run`] drives the
//! modules over either generated events (production mode) or the events of
//! the input files (file mode), one event at a time and in sequence order.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::config::{ProcessConfig, RunMode};
use crate::domain::RunHeader;

use super::conditions::{Conditions, ConditionsContext};
use super::error::FrameworkError;
use super::event::Event;
use super::event_file::EventFile;
use super::processor::{Module, ProcessorContext, ProcessorError};
use super::registry::PluginRegistry;
use super::storage::StorageControl;

/// A module in the sequence together with its names
struct Scheduled {
    instance_name: String,
    class_name: String,
    module: Module,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Events handed to the module sequence
    pub events_processed: u64,

    /// Events that never completed within the retry budget
    pub events_failed: u64,
}

/// One configured processing pass
pub struct Process {
    config: ProcessConfig,
    sequence: Vec<Scheduled>,
    conditions: Conditions,
    storage: StorageControl,
    summary: ProcessSummary,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pass_name", &self.config.pass_name)
            .field("sequence", &self.module_names())
            .field("conditions", &self.conditions)
            .finish()
    }
}

impl Process {
    /// Build the process: validate the configuration, create and configure
    /// every module and conditions provider
    pub fn new(config: ProcessConfig, registry: &PluginRegistry) -> Result<Self> {
        config.validate()?;

        if config.sequence.is_empty() {
            warn!("No modules in the sequence; events will only be copied");
        }

        let mut sequence = Vec::with_capacity(config.sequence.len());
        for spec in &config.sequence {
            let mut module = registry.create_processor(&spec.class_name, &spec.instance_name)?;
            module.configure(&spec.parameters).with_context(|| {
                format!(
                    "Failed to configure '{}' of class '{}'",
                    spec.instance_name, spec.class_name
                )
            })?;
            debug!(
                instance = %spec.instance_name,
                class = %spec.class_name,
                kind = module.kind(),
                "Configured module"
            );
            sequence.push(Scheduled {
                instance_name: spec.instance_name.clone(),
                class_name: spec.class_name.clone(),
                module,
            });
        }

        let mut conditions = Conditions::new();
        for spec in &config.conditions_providers {
            let provider = registry
                .create_provider(&spec.class_name, &spec.object_name, &spec.tag_name, &spec.parameters)
                .with_context(|| {
                    format!(
                        "Failed to create conditions provider '{}' for '{}'",
                        spec.class_name, spec.object_name
                    )
                })?;
            conditions.add_provider(&spec.object_name, &spec.tag_name, provider)?;
        }

        let mut storage = StorageControl::new(config.skim_default_is_keep);
        for rule in &config.skim_rules {
            storage.add_rule(&rule.processor, &rule.purpose)?;
        }

        Ok(Self {
            config,
            sequence,
            conditions,
            storage,
            summary: ProcessSummary::default(),
        })
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Instance names of the sequence, in order
    pub fn module_names(&self) -> Vec<&str> {
        self.sequence.iter().map(|s| s.instance_name.as_str()).collect()
    }

    /// Run the event loop to completion
    #[instrument(skip(self), fields(pass = %self.config.pass_name))]
    pub fn run(&mut self) -> Result<ProcessSummary> {
        self.summary = ProcessSummary::default();

        let mut event = Event::new(self.config.pass_name.as_str());
        event.header_mut().run = self.config.run;

        self.conditions.on_process_start()?;
        for s in &mut self.sequence {
            s.module
                .on_process_start()
                .with_context(|| format!("'{}' failed at process start", s.instance_name))?;
        }

        match self.config.mode()? {
            RunMode::Production => self.run_production(&mut event)?,
            RunMode::Files => self.run_files(&mut event)?,
        }

        for s in &mut self.sequence {
            s.module
                .on_process_end()
                .with_context(|| format!("'{}' failed at process end", s.instance_name))?;
        }

        info!(
            events = self.summary.events_processed,
            failed = self.summary.events_failed,
            "Processing finished"
        );
        Ok(self.summary)
    }

    /// Generate events with the producers, no input
    fn run_production(&mut self, event: &mut Event) -> Result<()> {
        let outputs = &self.config.output_files;
        let path = outputs
            .first()
            .cloned()
            .ok_or_else(|| FrameworkError::InvalidConfig("No input files or output files were given".to_string()))?;
        if outputs.len() > 1 {
            warn!(
                output = %path.display(),
                "Several output files given with no input files, only the first is used"
            );
        }

        let run = self.config.run;
        let max_events = self.config.max_events.unwrap_or_default();

        let mut out = EventFile::create_output(
            &path,
            None,
            true,
            &self.config.pass_name,
            self.config.compression_setting,
        )?;
        for s in &mut self.sequence {
            s.module
                .on_file_open(&out)
                .with_context(|| format!("'{}' failed at file open", s.instance_name))?;
        }
        for rule in &self.config.keep {
            out.add_drop(rule)?;
        }

        let mut header = RunHeader::new(run);
        header.run_start = Some(Utc::now());
        out.write_run_header(header)?;
        self.new_run(out.run_header_mut(run)?)?;

        let mut processed = 0u64;
        while processed < max_events {
            let header = event.header_mut();
            header.clear();
            header.run = run;
            header.event_number = i32::try_from(processed + 1)
                .context("Event number does not fit in the event header")?;
            header.timestamp = Utc::now();

            let completed = self.process_with_retries(event, processed)?;
            let keep = self.storage.keep_event(completed);
            out.next_event(event, keep)?;
            processed += 1;
        }

        for s in &mut self.sequence {
            s.module
                .on_file_close(&out)
                .with_context(|| format!("'{}' failed at file close", s.instance_name))?;
        }

        let header = out.run_header_mut(run)?;
        header.run_end = Some(Utc::now());
        info!("Finished run\n{}", header);
        out.close()?;
        Ok(())
    }

    /// Process the events of every input file
    fn run_files(&mut self, event: &mut Event) -> Result<()> {
        let inputs = self.config.input_files.clone();
        let outputs = self.config.output_files.clone();
        let single_output = outputs.len() == 1;
        let limit = self.config.max_events;

        let mut merged: Option<EventFile> = None;
        let mut was_run: Option<i32> = None;

        for (ifile, input_path) in inputs.iter().enumerate() {
            let in_file = EventFile::open_input(input_path)
                .with_context(|| format!("Failed to open input file {}", input_path.display()))?;
            info!(file = %input_path.display(), "Opening file");

            for s in &mut self.sequence {
                s.module
                    .on_file_open(&in_file)
                    .with_context(|| format!("'{}' failed at file open", s.instance_name))?;
            }

            let mut master = if outputs.is_empty() {
                in_file
            } else if let Some(mut out) = merged.take() {
                out.update_parent(in_file);
                out
            } else {
                let out_path = &outputs[if single_output { 0 } else { ifile }];
                let mut out = EventFile::create_output(
                    out_path,
                    Some(in_file),
                    single_output,
                    &self.config.pass_name,
                    self.config.compression_setting,
                )?;
                for rule in &self.config.keep {
                    out.add_drop(rule)?;
                }
                out
            };

            let mut completed = true;
            loop {
                let keep = self.storage.keep_event(completed);
                if !master.next_event(event, keep)? {
                    break;
                }
                if limit.is_some_and(|l| self.summary.events_processed >= l) {
                    break;
                }

                let run = event.header().run;
                if was_run != Some(run) {
                    was_run = Some(run);
                    match master.run_header_mut(run) {
                        Ok(header) => {
                            info!(file = %input_path.display(), "Got new run header\n{}", header);
                            self.new_run(header)?;
                        }
                        Err(_) => warn!(run, "Run header was not found"),
                    }
                }

                completed = self.process_with_retries(event, self.summary.events_processed)?;
            }

            let leave_early = limit.is_some_and(|l| self.summary.events_processed >= l);
            if leave_early {
                info!(limit = ?limit, "Reached event limit");
            }

            info!(file = %input_path.display(), "Closing file");
            let input = if master.is_output() {
                master.parent()
            } else {
                Some(&master)
            };
            if let Some(input) = input {
                for s in &mut self.sequence {
                    s.module
                        .on_file_close(input)
                        .with_context(|| format!("'{}' failed at file close", s.instance_name))?;
                }
            }

            event.on_end_of_file();

            if master.is_output() {
                if single_output {
                    merged = Some(master);
                } else {
                    master.close()?;
                }
            }

            if leave_early {
                break;
            }
        }

        if let Some(mut out) = merged {
            out.close()?;
        }
        Ok(())
    }

    /// Notify everyone of a new run
    ///
    /// Producers may fill the header first; only then do the conditions
    /// providers and the modules see it.
    fn new_run(&mut self, header: &mut RunHeader) -> Result<()> {
        for s in self.sequence.iter_mut().filter(|s| s.module.is_producer()) {
            s.module
                .before_new_run(header)
                .with_context(|| format!("'{}' failed before new run {}", s.instance_name, header.run_number))?;
        }

        self.conditions.on_new_run(header)?;

        for s in &mut self.sequence {
            s.module
                .on_new_run(header)
                .with_context(|| format!("'{}' failed at new run {}", s.instance_name, header.run_number))?;
        }
        Ok(())
    }

    /// Give an event up to `max_tries_per_event` attempts
    ///
    /// Products added and header changes made by an aborted attempt are
    /// thrown away. Returns whether the last attempt completed.
    fn process_with_retries(&mut self, event: &mut Event, n: u64) -> Result<bool> {
        let max_tries = self.config.max_tries_per_event;
        self.summary.events_processed += 1;
        let pristine = event.header().clone();

        for attempt in 1..=max_tries {
            let header = event.header_mut();
            header.clone_from(&pristine);
            header.tries = attempt;
            self.storage.reset_event_state();

            if self.process(event, n)? {
                return Ok(true);
            }
            event.discard_added();
        }

        warn!(
            event = event.event_number(),
            tries = max_tries,
            "Event did not complete, moving on"
        );
        self.summary.events_failed += 1;
        Ok(false)
    }

    /// Run every module once on the event
    ///
    /// Returns false if a module aborted the event.
    fn process(&mut self, event: &mut Event, n: u64) -> Result<bool> {
        if let Some(frequency) = self.config.log_frequency.filter(|f| *f > 0) {
            if (n + 1) % frequency == 0 {
                let header = event.header();
                info!(
                    index = n + 1,
                    run = header.run,
                    event = header.event_number,
                    timestamp = %header.timestamp,
                    "Processing"
                );
            }
        }

        self.conditions
            .set_context(ConditionsContext::from(event.header()));

        let histogram_file = self.config.histogram_file.as_deref();
        for s in &mut self.sequence {
            let mut ctx = ProcessorContext::new(
                &s.instance_name,
                &self.config.pass_name,
                &mut self.storage,
                &mut self.conditions,
                histogram_file,
            );

            match s.module.process(event, &mut ctx) {
                Ok(()) => {}
                Err(ProcessorError::AbortEvent { reason }) => {
                    debug!(
                        module = %s.instance_name,
                        event = event.event_number(),
                        attempt = event.header().tries,
                        %reason,
                        "Event aborted"
                    );
                    return Ok(false);
                }
                Err(e) => {
                    return Err(anyhow::Error::from(e).context(format!(
                        "'{}' ({}) failed on event {}",
                        s.instance_name,
                        s.class_name,
                        event.event_number()
                    )));
                }
            }
        }
        Ok(true)
    }
}
