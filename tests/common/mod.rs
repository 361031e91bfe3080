//! Test modules and helpers shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Result;
use fire::config::{ModuleSpec, ProcessConfig};
use fire::{
    Analyzer, Event, EventFile, EventProcessor, Parameters, PluginRegistry, Process,
    ProcessorContext, ProcessorError, Producer, RunHeader,
};

/// Callbacks seen by the test modules, in order
pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn call_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Adds `SimHits`, `Energy` and `Extra` derived from the event number
pub struct SimHits;

impl EventProcessor for SimHits {}

impl Producer for SimHits {
    fn before_new_run(&mut self, header: &mut RunHeader) -> Result<()> {
        header.detector_name = "test-detector".to_string();
        let run = header.run_number;
        header.set_int_parameter("Should Be Run Number", run);
        Ok(())
    }

    fn produce(&mut self, event: &mut Event, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        let n = event.event_number() as f64;
        event.add("SimHits", &vec![n, n * 2.0, n * 3.0])?;
        event.add("Energy", &(n * 10.0))?;
        let number = event.event_number();
        event.add("Extra", &number)?;
        Ok(())
    }
}

/// Sums `SimHits` into `RecHits`
pub struct Reco;

impl EventProcessor for Reco {}

impl Producer for Reco {
    fn produce(&mut self, event: &mut Event, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        if !event.exists("SimHits", "") {
            return Ok(());
        }
        let hits: Vec<f64> = event.get("SimHits", "")?;
        event.add("RecHits", &hits.iter().sum::<f64>())?;
        Ok(())
    }
}

/// Aborts every attempt before `succeed_on`; `succeed_on: 0` never succeeds
///
/// Each attempt marks the event header with `attempt <tries>` first.
pub struct Flaky {
    log: CallLog,
    succeed_on: u32,
}

impl EventProcessor for Flaky {
    fn configure(&mut self, parameters: &Parameters) -> Result<()> {
        self.succeed_on = parameters.get_or("succeed_on", 1)?;
        Ok(())
    }
}

impl Producer for Flaky {
    fn produce(&mut self, event: &mut Event, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        let tries = event.header().tries;
        self.log
            .borrow_mut()
            .push(format!("attempt:{}:{}", event.event_number(), tries));

        event
            .header_mut()
            .set_int_parameter(format!("attempt {}", tries), 1);
        event.add("Attempt", &tries)?;
        if self.succeed_on == 0 || tries < self.succeed_on {
            return Err(ProcessorError::abort(format!("attempt {} rejected", tries)));
        }
        Ok(())
    }
}

/// Records every callback it receives
pub struct Recorder {
    name: String,
    log: CallLog,
}

impl Recorder {
    fn record(&self, what: &str) {
        self.log.borrow_mut().push(format!("{}:{}", what, self.name));
    }
}

impl EventProcessor for Recorder {
    fn on_process_start(&mut self) -> Result<()> {
        self.record("on_process_start");
        Ok(())
    }

    fn on_process_end(&mut self) -> Result<()> {
        self.record("on_process_end");
        Ok(())
    }

    fn on_file_open(&mut self, _file: &EventFile) -> Result<()> {
        self.record("on_file_open");
        Ok(())
    }

    fn on_file_close(&mut self, _file: &EventFile) -> Result<()> {
        self.record("on_file_close");
        Ok(())
    }

    fn on_new_run(&mut self, header: &RunHeader) -> Result<()> {
        self.log.borrow_mut().push(format!(
            "on_new_run:{}:{}:{:?}",
            self.name,
            header.run_number,
            header.string_parameter("Stamped By")
        ));
        Ok(())
    }
}

impl Producer for Recorder {
    fn before_new_run(&mut self, header: &mut RunHeader) -> Result<()> {
        self.record("before_new_run");
        header.set_string_parameter("Stamped By", self.name.as_str());
        Ok(())
    }

    fn produce(&mut self, event: &mut Event, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        self.log
            .borrow_mut()
            .push(format!("produce:{}:{}", self.name, event.event_number()));
        Ok(())
    }
}

impl Analyzer for Recorder {
    fn analyze(&mut self, event: &Event, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        self.log
            .borrow_mut()
            .push(format!("analyze:{}:{}", self.name, event.event_number()));
        Ok(())
    }
}

/// Built-in classes plus the test modules, all logging into `log`
pub fn registry(log: &CallLog) -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins().unwrap();
    registry.register_producer("test::SimHits", |_| SimHits).unwrap();
    registry.register_producer("test::Reco", |_| Reco).unwrap();

    let flaky_log = log.clone();
    registry
        .register_producer("test::Flaky", move |_| Flaky {
            log: flaky_log.clone(),
            succeed_on: 1,
        })
        .unwrap();

    let producer_log = log.clone();
    registry
        .register_producer("test::RecordingProducer", move |name| Recorder {
            name: name.to_string(),
            log: producer_log.clone(),
        })
        .unwrap();

    let analyzer_log = log.clone();
    registry
        .register_analyzer("test::RecordingAnalyzer", move |name| Recorder {
            name: name.to_string(),
            log: analyzer_log.clone(),
        })
        .unwrap();

    registry
}

pub fn module(class_name: &str, instance_name: &str) -> ModuleSpec {
    ModuleSpec {
        class_name: class_name.to_string(),
        instance_name: instance_name.to_string(),
        parameters: Parameters::new(),
    }
}

/// Generate a file of `events` simulated events for `run`
pub fn simulate(dir: &Path, name: &str, run: i32, events: u64) -> PathBuf {
    let path = dir.join(name);
    let mut config = ProcessConfig::new("sim");
    config.run = run;
    config.max_events = Some(events);
    config.output_files = vec![path.clone()];
    config.sequence = vec![module("test::SimHits", "sim")];

    let log = call_log();
    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();
    path
}

/// Event numbers stored in a file, in order
pub fn event_numbers(file: &EventFile) -> Vec<i32> {
    file.entries()
        .iter()
        .map(|entry| entry["EventHeader"]["event_number"].as_i64().unwrap() as i32)
        .collect()
}
