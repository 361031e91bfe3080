//! Production Mode Integration Tests
//!
//! Events generated by producers with no input file: event numbering,
//! run headers, retries, run transitions and skimming.

mod common;

use common::{call_log, event_numbers, module, registry, simulate};
use fire::config::{ProcessConfig, SkimRule};
use fire::{EventFile, FrameworkError, Parameters, Process};
use serde_json::json;
use tempfile::TempDir;

fn production_config(dir: &TempDir, events: u64) -> ProcessConfig {
    let mut config = ProcessConfig::new("sim");
    config.max_events = Some(events);
    config.output_files = vec![dir.path().join("out.jsonl")];
    config
}

#[test]
fn test_generated_events_and_run_header() {
    let dir = TempDir::new().unwrap();
    let path = simulate(dir.path(), "sim.jsonl", 7, 5);

    let file = EventFile::open_input(&path).unwrap();
    assert_eq!(event_numbers(&file), vec![1, 2, 3, 4, 5]);
    assert_eq!(file.entries()[0]["SimHits_sim"], json!([1.0, 2.0, 3.0]));
    assert_eq!(file.entries()[4]["Energy_sim"], json!(50.0));

    let header = file.run_header(7).unwrap();
    assert_eq!(header.detector_name, "test-detector");
    assert_eq!(header.int_parameter("Should Be Run Number"), Some(7));
    assert_eq!(header.software_tag, env!("CARGO_PKG_VERSION"));
    assert!(header.run_start.is_some());
    assert!(header.run_end.is_some());
    assert!(header.run_start <= header.run_end);

    let mut names: Vec<&str> = file.schema().iter().map(|p| p.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["Energy", "Extra", "SimHits"]);
    assert!(file.schema().iter().all(|p| p.pass == "sim"));
}

#[test]
fn test_retry_never_exceeds_budget() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 4);
    config.max_tries_per_event = 3;
    let mut flaky = module("test::Flaky", "flaky");
    flaky.parameters = Parameters::new().with("succeed_on", 0);
    config.sequence = vec![flaky];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    let summary = process.run().unwrap();
    assert_eq!(summary.events_processed, 4);
    assert_eq!(summary.events_failed, 4);

    let attempts = log.borrow();
    assert_eq!(attempts.len(), 12);
    for event in 1..=4 {
        let tries: Vec<&String> = attempts
            .iter()
            .filter(|a| a.starts_with(&format!("attempt:{}:", event)))
            .collect();
        assert_eq!(tries.len(), 3);
    }

    // incomplete events are never stored
    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert!(file.entries().is_empty());
}

#[test]
fn test_retry_discards_aborted_attempts() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 3);
    config.max_tries_per_event = 3;
    let mut flaky = module("test::Flaky", "flaky");
    flaky.parameters = Parameters::new().with("succeed_on", 2);
    config.sequence = vec![module("test::SimHits", "sim"), flaky];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    let summary = process.run().unwrap();
    assert_eq!(summary.events_failed, 0);
    assert_eq!(log.borrow().len(), 6);

    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert_eq!(event_numbers(&file), vec![1, 2, 3]);
    for entry in file.entries() {
        assert_eq!(entry["Attempt_sim"], json!(2));
        assert_eq!(entry["EventHeader"]["tries"], json!(2));
        assert!(entry.contains_key("SimHits_sim"));
    }
}

#[test]
fn test_retry_restores_the_event_header() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 2);
    config.max_tries_per_event = 3;
    let mut flaky = module("test::Flaky", "flaky");
    flaky.parameters = Parameters::new().with("succeed_on", 3);
    config.sequence = vec![flaky];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();

    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert_eq!(event_numbers(&file), vec![1, 2]);
    for entry in file.entries() {
        let header = &entry["EventHeader"];
        assert_eq!(header["int_parameters"], json!({ "attempt 3": 1 }));
        assert_eq!(header["tries"], json!(3));
    }
}

#[test]
fn test_single_try_moves_on() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 2);
    let mut flaky = module("test::Flaky", "flaky");
    flaky.parameters = Parameters::new().with("succeed_on", 2);
    config.sequence = vec![flaky];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    let summary = process.run().unwrap();
    assert_eq!(summary.events_processed, 2);
    assert_eq!(summary.events_failed, 2);
    assert_eq!(*log.borrow(), vec!["attempt:1:1", "attempt:2:1"]);
}

#[test]
fn test_run_transition_ordering() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 2);
    config.run = 12;
    config.sequence = vec![
        module("test::RecordingAnalyzer", "first"),
        module("test::RecordingProducer", "p1"),
        module("test::RecordingProducer", "p2"),
    ];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();

    let calls = log.borrow().clone();
    let position = |prefix: &str| calls.iter().position(|c| c.starts_with(prefix)).unwrap();

    let last_before = calls
        .iter()
        .rposition(|c| c.starts_with("before_new_run"))
        .unwrap();
    let first_on_new_run = position("on_new_run");
    assert!(last_before < first_on_new_run);

    // analyzers never take part in the first phase
    assert!(!calls.contains(&"before_new_run:first".to_string()));

    // every module sees the header after all producers wrote to it
    assert!(calls.contains(&"on_new_run:first:12:Some(\"p2\")".to_string()));
    assert!(calls.contains(&"on_new_run:p1:12:Some(\"p2\")".to_string()));

    assert!(position("on_process_start") < position("on_file_open"));
    assert!(position("on_file_open") < position("before_new_run"));
    assert!(position("on_new_run") < position("analyze:first:1"));
    assert!(position("analyze:first:1") < position("produce:p1:1"));
    assert!(position("produce:p2:2") < position("on_file_close"));
    assert!(position("on_file_close") < position("on_process_end"));
    assert_eq!(calls.last().map(String::as_str), Some("on_process_end:p2"));

    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert_eq!(
        file.run_header(12).unwrap().string_parameter("Stamped By"),
        Some("p2")
    );
}

#[test]
fn test_prescale_skim() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 6);
    let mut prescale = module("framework::Prescale", "prescale");
    prescale.parameters = Parameters::new().with("factor", 2);
    config.sequence = vec![module("test::SimHits", "sim"), prescale];
    config.skim_rules = vec![SkimRule {
        processor: "prescale".to_string(),
        purpose: String::new(),
    }];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();

    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert_eq!(event_numbers(&file), vec![2, 4, 6]);
}

#[test]
fn test_unlistened_votes_fall_back_to_default() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 4);
    let mut prescale = module("framework::Prescale", "prescale");
    prescale.parameters = Parameters::new().with("factor", 2);
    config.sequence = vec![prescale];

    let mut process = Process::new(config.clone(), &registry(&log)).unwrap();
    process.run().unwrap();
    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert_eq!(event_numbers(&file), vec![1, 2, 3, 4]);

    config.skim_default_is_keep = false;
    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();
    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert!(file.entries().is_empty());
}

#[test]
fn test_drop_rule_on_new_products() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 2);
    config.keep = vec!["drop Extra".to_string()];
    config.sequence = vec![module("test::SimHits", "sim")];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();

    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    for entry in file.entries() {
        assert!(entry.contains_key("EventHeader"));
        assert!(entry.contains_key("SimHits_sim"));
        assert!(!entry.contains_key("Extra_sim"));
    }
    assert!(file.schema().iter().all(|p| p.name != "Extra"));
}

#[test]
fn test_only_first_output_is_used() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 1);
    config.output_files.push(dir.path().join("unused.jsonl"));

    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();

    assert!(dir.path().join("out.jsonl").exists());
    assert!(!dir.path().join("unused.jsonl").exists());
}

#[test]
fn test_no_inputs_and_no_event_count() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 1);
    config.max_events = None;

    let err = Process::new(config, &registry(&log)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FrameworkError>(),
        Some(FrameworkError::InvalidConfig(_))
    ));
}

#[test]
fn test_unregistered_class_is_fatal() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 1);
    config.sequence = vec![module("ecal::Digitizer", "digis")];

    let err = Process::new(config, &registry(&log)).unwrap_err();
    match err.downcast_ref::<FrameworkError>() {
        Some(FrameworkError::UnregisteredClass {
            class_name,
            instance_name,
        }) => {
            assert_eq!(class_name, "ecal::Digitizer");
            assert_eq!(instance_name, "digis");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_seed_service_records_master_seed() {
    let dir = TempDir::new().unwrap();
    let log = call_log();

    let mut config = production_config(&dir, 1);
    config.run = 33;
    config.conditions_providers = vec![fire::config::ProviderSpec {
        class_name: "framework::RandomNumberSeedService".to_string(),
        object_name: "RandomNumberSeedService".to_string(),
        tag_name: String::new(),
        parameters: Parameters::new(),
    }];

    let mut process = Process::new(config, &registry(&log)).unwrap();
    process.run().unwrap();

    let file = EventFile::open_input(dir.path().join("out.jsonl")).unwrap();
    assert_eq!(
        file.run_header(33)
            .unwrap()
            .int_parameter("RandomNumberMasterSeed[RandomNumberSeedService]"),
        Some(33)
    );
}
