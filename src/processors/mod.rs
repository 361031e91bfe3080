//! Modules shipped with the framework.
//!
//! - `framework::EventPrint`: log headers and products as events go by
//! - `framework::RunHeaderStamp`: fill run headers from configuration
//! - `framework::Prescale`: vote to keep one event in N

pub mod event_print;
pub mod prescale;
pub mod run_header_stamp;

pub use event_print::EventPrint;
pub use prescale::Prescale;
pub use run_header_stamp::RunHeaderStamp;

use crate::core::{FrameworkError, PluginRegistry};

/// Add the built-in modules to a registry
pub fn register(registry: &mut PluginRegistry) -> Result<(), FrameworkError> {
    registry.register_analyzer(EventPrint::CLASS_NAME, EventPrint::new)?;
    registry.register_producer(RunHeaderStamp::CLASS_NAME, RunHeaderStamp::new)?;
    registry.register_producer(Prescale::CLASS_NAME, Prescale::new)?;
    Ok(())
}
