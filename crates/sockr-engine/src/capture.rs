use anyhow::Result;
use tracing::warn;

use crate::ScriptEngine;

/// Text written to the engine's sink during one capture, plus the action's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured<T> {
    pub value: T,
    pub output: String,
}

/// Runs `action` with a fresh, empty sink installed on `engine`.
///
/// The previous sink is put back before this returns, whether `action`
/// succeeds, fails, or unwinds.
pub fn capture_output<E, T, F>(engine: &mut E, action: F) -> Result<Captured<T>>
where
    E: ScriptEngine + ?Sized,
    F: FnOnce(&mut E) -> Result<T>,
{
    let previous = engine.replace_sink(String::new())?;
    let mut scope = CaptureScope {
        engine,
        previous: Some(previous),
    };

    let value = action(&mut *scope.engine);
    let output = scope.restore()?;

    Ok(Captured {
        value: value?,
        output,
    })
}

struct CaptureScope<'a, E: ScriptEngine + ?Sized> {
    engine: &'a mut E,
    previous: Option<String>,
}

impl<E: ScriptEngine + ?Sized> CaptureScope<'_, E> {
    fn restore(&mut self) -> Result<String> {
        let previous = self.previous.take().unwrap_or_default();
        self.engine.replace_sink(previous)
    }
}

impl<E: ScriptEngine + ?Sized> Drop for CaptureScope<'_, E> {
    fn drop(&mut self) {
        if self.previous.is_none() {
            return;
        }
        if let Err(err) = self.restore() {
            warn!(error = %err, "failed restoring output sink");
        }
    }
}
