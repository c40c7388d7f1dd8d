use anyhow::Result;
use tracing::debug;

use crate::{Captured, ScriptEngine, capture_output};

/// First line of every diagnostic written for a failed payload.
pub const ERROR_MARKER: &str = "sockr-error";

/// Name under which request payloads are evaluated.
pub const REQUEST_SOURCE_NAME: &str = "<request>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Completed,
    /// The payload failed and a diagnostic was written to the sink.
    Failed,
}

/// Runs `payload` on `engine`, turning script failures into sink text.
///
/// Only a broken sink surfaces as `Err`; compile and runtime failures of the
/// payload itself never do.
pub fn execute<E: ScriptEngine + ?Sized>(engine: &mut E, payload: &str) -> Result<Execution> {
    match engine.run(&request_block(payload), REQUEST_SOURCE_NAME) {
        Ok(()) => Ok(Execution::Completed),
        Err(failure) => {
            debug!(error = %failure, "payload failed");
            engine.write_output(&format!("{ERROR_MARKER}\n{failure}\n"))?;
            Ok(Execution::Failed)
        }
    }
}

/// Wraps `payload` in a block so top-level `let`, `const` and `class`
/// bindings belong to one request, while `var` and assignments to globals
/// still outlive it.
fn request_block(payload: &str) -> String {
    format!("{{\n{payload}\n}}")
}

pub fn run_captured<E: ScriptEngine + ?Sized>(
    engine: &mut E,
    payload: &str,
) -> Result<Captured<Execution>> {
    capture_output(engine, |engine| execute(engine, payload))
}
