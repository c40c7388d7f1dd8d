mod capture;
mod executor;

pub use capture::{Captured, capture_output};
pub use executor::{ERROR_MARKER, Execution, REQUEST_SOURCE_NAME, execute, run_captured};

use anyhow::{Result, anyhow};
use boa_engine::{Context, JsString, JsValue, Source};
use thiserror::Error;
use tracing::warn;

/// A script that failed to compile or threw while running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error evaluating {source_name}: {message}")]
pub struct ScriptFailure {
    pub source_name: String,
    pub message: String,
}

/// Interpreter capability the server executes payloads with.
///
/// Print-style output produced by a script lands in the engine's active sink
/// rather than in process stdout, so every engine instance owns its own
/// output destination.
pub trait ScriptEngine {
    /// Runs `source` for its side effects. The completion value is discarded.
    fn run(&mut self, source: &str, source_name: &str) -> Result<(), ScriptFailure>;

    /// Appends `text` to the active sink.
    fn write_output(&mut self, text: &str) -> Result<()>;

    /// Installs `next` as the active sink and returns the previous contents.
    fn replace_sink(&mut self, next: String) -> Result<String>;
}

const WRITE_HOOK: &str = "__sockr_write";
const SWAP_HOOK: &str = "__sockr_swap_sink";

pub struct BoaEngine {
    ctx: Context,
}

impl BoaEngine {
    pub fn new() -> Self {
        let mut engine = Self {
            ctx: Context::default(),
        };
        engine.install_output_shim();
        engine
    }

    fn install_output_shim(&mut self) {
        // The sink lives in a closure so scripts can only reach it through
        // print/console or the two frozen hooks.
        let installed = self.ctx.eval(Source::from_bytes(
            r#"
(() => {
  let sink = "";
  const line = (...args) => {
    sink += args.map((v) => String(v)).join(" ") + "\n";
  };
  const hook = (name, value) =>
    Object.defineProperty(globalThis, name, {
      value,
      writable: false,
      enumerable: false,
      configurable: false,
    });
  hook("__sockr_write", (text) => {
    sink += String(text);
  });
  hook("__sockr_swap_sink", (next) => {
    const previous = sink;
    sink = String(next);
    return previous;
  });
  globalThis.print = line;
  globalThis.console = {
    log: line,
    info: line,
    warn: line,
    error: line,
    debug: line,
  };
})();
"#,
        ));
        if let Err(err) = installed {
            warn!(error = %err, "failed installing output shim");
        }
    }

    fn call_hook(&mut self, hook: &str, argument: &str) -> Result<JsValue> {
        let function = self
            .ctx
            .global_object()
            .get(JsString::from(hook), &mut self.ctx)
            .map_err(|err| anyhow!("failed looking up output hook {hook}: {err}"))?;
        let Some(callable) = function.as_callable() else {
            return Err(anyhow!("output hook {hook} is not installed"));
        };
        callable
            .call(
                &JsValue::undefined(),
                &[JsValue::from(JsString::from(argument))],
                &mut self.ctx,
            )
            .map_err(|err| anyhow!("output hook {hook} failed: {err}"))
    }
}

impl Default for BoaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for BoaEngine {
    fn run(&mut self, source: &str, source_name: &str) -> Result<(), ScriptFailure> {
        self.ctx
            .eval(Source::from_bytes(source))
            .map(|_| ())
            .map_err(|err| ScriptFailure {
                source_name: source_name.to_string(),
                message: err.to_string(),
            })
    }

    fn write_output(&mut self, text: &str) -> Result<()> {
        self.call_hook(WRITE_HOOK, text)?;
        Ok(())
    }

    fn replace_sink(&mut self, next: String) -> Result<String> {
        let previous = self.call_hook(SWAP_HOOK, &next)?;
        let rendered = previous
            .to_string(&mut self.ctx)
            .map_err(|err| anyhow!("failed converting sink contents to string: {err}"))?;
        Ok(rendered.to_std_string_escaped())
    }
}
