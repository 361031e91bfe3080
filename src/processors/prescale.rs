//! Keep one event in N.

use anyhow::Result;

use crate::config::Parameters;
use crate::core::{
    Event, EventProcessor, FrameworkError, ProcessorContext, ProcessorError, Producer, StorageHint,
};

/// Votes `ShouldKeep` on every N-th event and `ShouldDrop` on the others
///
/// The vote only counts if a skim rule listens to this instance. The
/// decision is also recorded in the event header as `prescale[<name>]`.
#[derive(Debug)]
pub struct Prescale {
    name: String,
    factor: u64,
    purpose: String,
    seen: u64,
}

impl Prescale {
    pub const CLASS_NAME: &'static str = "framework::Prescale";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            factor: 1,
            purpose: String::new(),
            seen: 0,
        }
    }
}

impl EventProcessor for Prescale {
    fn configure(&mut self, parameters: &Parameters) -> Result<()> {
        self.factor = parameters.get("factor")?;
        if self.factor == 0 {
            return Err(FrameworkError::InvalidConfig(format!(
                "'{}': prescale factor must be at least 1",
                self.name
            ))
            .into());
        }
        self.purpose = parameters.get_or("purpose", String::new())?;
        Ok(())
    }
}

impl Producer for Prescale {
    fn produce(&mut self, event: &mut Event, ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        self.seen += 1;
        let keep = self.seen % self.factor == 0;

        let hint = if keep {
            StorageHint::ShouldKeep
        } else {
            StorageHint::ShouldDrop
        };
        ctx.set_storage_hint(hint, &self.purpose);

        event
            .header_mut()
            .set_int_parameter(format!("prescale[{}]", self.name), i32::from(keep));
        Ok(())
    }
}
