//! Fill run headers from configuration.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use crate::config::Parameters;
use crate::core::{Event, EventProcessor, ProcessorContext, ProcessorError, Producer};
use crate::domain::RunHeader;

/// Writes the detector name, description and extra parameters into every
/// new run header
///
/// Parameters:
/// - `detector_name`, `description`: strings, left alone when absent
/// - `int_parameters`, `float_parameters`, `string_parameters`: maps
#[derive(Debug, Default)]
pub struct RunHeaderStamp {
    name: String,
    detector_name: Option<String>,
    description: Option<String>,
    int_parameters: BTreeMap<String, i32>,
    float_parameters: BTreeMap<String, f32>,
    string_parameters: BTreeMap<String, String>,
}

impl RunHeaderStamp {
    pub const CLASS_NAME: &'static str = "framework::RunHeaderStamp";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl EventProcessor for RunHeaderStamp {
    fn configure(&mut self, parameters: &Parameters) -> Result<()> {
        self.detector_name = parameters.get_or("detector_name", None)?;
        self.description = parameters.get_or("description", None)?;
        self.int_parameters = parameters.get_or("int_parameters", BTreeMap::new())?;
        self.float_parameters = parameters.get_or("float_parameters", BTreeMap::new())?;
        self.string_parameters = parameters.get_or("string_parameters", BTreeMap::new())?;
        Ok(())
    }
}

impl Producer for RunHeaderStamp {
    fn before_new_run(&mut self, header: &mut RunHeader) -> Result<()> {
        debug!(module = %self.name, run = header.run_number, "Stamping run header");

        if let Some(detector) = &self.detector_name {
            header.detector_name = detector.clone();
        }
        if let Some(description) = &self.description {
            header.description = description.clone();
        }
        for (name, value) in &self.int_parameters {
            header.set_int_parameter(name.as_str(), *value);
        }
        for (name, value) in &self.float_parameters {
            header.set_float_parameter(name.as_str(), *value);
        }
        for (name, value) in &self.string_parameters {
            header.set_string_parameter(name.as_str(), value.as_str());
        }
        Ok(())
    }

    /// Nothing to do per event; all the work happens at the run boundary
    fn produce(&mut self, _event: &mut Event, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamps_header() {
        let params: Parameters = serde_json::from_value(json!({
            "detector_name": "ldmx-det-v14",
            "int_parameters": { "Beam Energy [MeV]": 4000 },
            "string_parameters": { "Generator": "single-electron" }
        }))
        .unwrap();

        let mut stamp = RunHeaderStamp::new("stamp");
        stamp.configure(&params).unwrap();

        let mut header = RunHeader::new(9);
        header.description = "kept".to_string();
        stamp.before_new_run(&mut header).unwrap();

        assert_eq!(header.detector_name, "ldmx-det-v14");
        assert_eq!(header.description, "kept");
        assert_eq!(header.int_parameter("Beam Energy [MeV]"), Some(4000));
        assert_eq!(header.string_parameter("Generator"), Some("single-electron"));
    }

    #[test]
    fn test_leaves_events_alone() {
        use crate::core::{Conditions, StorageControl};

        let mut stamp = RunHeaderStamp::new("stamp");
        stamp
            .configure(&Parameters::new().with("detector_name", "ldmx-det-v14"))
            .unwrap();

        let mut storage = StorageControl::new(true);
        let mut conditions = Conditions::new();
        let mut event = Event::new("test");
        let before = event.header().clone();

        let mut ctx = ProcessorContext::new("stamp", "test", &mut storage, &mut conditions, None);
        stamp.produce(&mut event, &mut ctx).unwrap();

        assert!(event.products().is_empty());
        assert_eq!(event.header(), &before);
    }
}
