//! Output recorders
//!
//! Turn the event stream into console lines, JUnit XML and run summaries.

mod console;
mod formatter;
mod junit;
mod summary;

pub use console::ConsoleRecorder;
pub use formatter::{write_junit_to_file, OutputFormat, ResultFormatter};
pub use junit::{render_junit, JUnitRecorder};
pub use summary::SummaryRecorder;
