//! Log what goes through the event loop.

use anyhow::Result;
use tracing::info;

use crate::config::Parameters;
use crate::core::{Analyzer, Event, EventFile, EventProcessor, ProcessorContext, ProcessorError};
use crate::domain::RunHeader;

/// Prints event headers, and optionally the product list, every N events
#[derive(Debug)]
pub struct EventPrint {
    name: String,
    frequency: u64,
    print_products: bool,
    seen: u64,
}

impl EventPrint {
    pub const CLASS_NAME: &'static str = "framework::EventPrint";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            frequency: 1,
            print_products: false,
            seen: 0,
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl EventProcessor for EventPrint {
    fn configure(&mut self, parameters: &Parameters) -> Result<()> {
        self.frequency = parameters.get_or("frequency", 1u64)?.max(1);
        self.print_products = parameters.get_or("print_products", false)?;
        Ok(())
    }

    fn on_file_open(&mut self, file: &EventFile) -> Result<()> {
        info!(module = %self.name, file = %file.file_name().display(), "File opened");
        Ok(())
    }

    fn on_file_close(&mut self, file: &EventFile) -> Result<()> {
        info!(module = %self.name, file = %file.file_name().display(), "File closed");
        Ok(())
    }

    fn on_new_run(&mut self, header: &RunHeader) -> Result<()> {
        info!(module = %self.name, "New run\n{}", header);
        Ok(())
    }

    fn on_process_end(&mut self) -> Result<()> {
        info!(module = %self.name, events = self.seen, "Events seen");
        Ok(())
    }
}

impl Analyzer for EventPrint {
    fn analyze(&mut self, event: &Event, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        self.seen += 1;
        if self.seen % self.frequency != 0 {
            return Ok(());
        }

        let header = event.header();
        info!(
            module = %self.name,
            run = header.run,
            event = header.event_number,
            weight = header.weight,
            tries = header.tries,
            "Event"
        );

        if self.print_products {
            for product in event.products() {
                info!(module = %self.name, %product, "Product");
            }
        }
        Ok(())
    }
}
