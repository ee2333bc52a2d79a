//! Isolated side of the sandbox
//!
//! Each `run` envelope gets a fresh `boa_engine` context, so nothing leaks
//! between runs. The submitted code is compiled as a function body with a
//! capturing `console` passed in as its only parameter; whatever it returns
//! (or throws) is folded into an [`ExecutionOutcome`].
//!
//! The same [`handle_line`] drives both transports: the in-process thread
//! ([`serve_channel`]) and the `sandbox_guest` binary ([`serve_stdio`]).

use std::io::{BufRead, Write};

use boa_engine::{Context, Source};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use super::protocol::{Envelope, ExecutionOutcome};

/// Interpreter limits applied to every script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestLimits {
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

impl Default for GuestLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
        }
    }
}

/// Values nested deeper than this are cut off before they leave the guest
pub const MAX_VALUE_DEPTH: usize = 32;

/// Stack reserved for a thread that hosts the interpreter. Some builtins
/// (`JSON.stringify`, `Array.prototype.join`) recurse natively on nested values.
pub const GUEST_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Wraps the user's code. `__code` and `__maxDepth` are defined just before
/// this harness, `__code` as a JSON string literal, so the code itself is
/// never spliced into the source.
///
/// `safe` copies a value into plain JSON data in script, without handing
/// nested values to native builtins: depth is capped, cycles are cut and
/// functions, symbols and bigints become strings.
const HARNESS: &str = r#"
(function () {
  var logs = [];
  var seen = [];
  function safe(value, depth) {
    if (value === undefined || value === null) { return null; }
    var kind = typeof value;
    if (kind === "number") { return isFinite(value) ? value : null; }
    if (kind === "string" || kind === "boolean") { return value; }
    if (kind !== "object") { return String(value); }
    if (depth >= __maxDepth) { return "[nested too deeply]"; }
    if (seen.indexOf(value) !== -1) { return "[circular]"; }
    seen.push(value);
    var out;
    try {
      if (typeof value.toJSON === "function") {
        out = safe(value.toJSON(), depth + 1);
      } else if (Array.isArray(value)) {
        out = [];
        for (var i = 0; i < value.length; i++) { out.push(safe(value[i], depth + 1)); }
      } else {
        out = {};
        var keys = Object.keys(value);
        for (var k = 0; k < keys.length; k++) {
          var item = value[keys[k]];
          if (item !== undefined) {
            Object.defineProperty(out, keys[k], {
              value: safe(item, depth + 1), enumerable: true, writable: true, configurable: true
            });
          }
        }
      }
    } catch (e) {
      out = "[unserializable]";
    }
    seen.pop();
    return out;
  }
  function describe(e) {
    if (e instanceof Error || e === null || typeof e !== "object") {
      try { return String(e); } catch (inner) { return "Error"; }
    }
    return JSON.stringify(safe(e, 0));
  }
  function capture(level) {
    return function () {
      var args = [];
      for (var i = 0; i < arguments.length; i++) { args.push(safe(arguments[i], 0)); }
      logs.push({ level: level, args: args });
    };
  }
  var sandboxConsole = {
    log: capture("log"),
    info: capture("info"),
    warn: capture("warn"),
    error: capture("error"),
    debug: capture("debug")
  };
  var result = null;
  var error = null;
  try {
    result = safe(new Function("console", __code)(sandboxConsole), 0);
  } catch (e) {
    error = describe(e);
  }
  return JSON.stringify({ logs: logs, result: result, error: error });
})()
"#;

/// Run one function body and capture its console output, value and error
pub fn run_script(code: &str, limits: &GuestLimits) -> ExecutionOutcome {
    let code_literal = match serde_json::to_string(code) {
        Ok(literal) => literal,
        Err(e) => return ExecutionOutcome::failed(format!("could not encode code: {}", e)),
    };
    let script = format!(
        "var __code = {};\nvar __maxDepth = {};\n{}",
        code_literal, MAX_VALUE_DEPTH, HARNESS
    );

    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(limits.loop_iteration_limit);
    context
        .runtime_limits_mut()
        .set_recursion_limit(limits.recursion_limit);

    match context.eval(Source::from_bytes(&script)) {
        Ok(value) => match value.as_string().map(|s| s.to_std_string_escaped()) {
            Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                ExecutionOutcome::failed(format!("malformed sandbox output: {}", e))
            }),
            None => ExecutionOutcome::failed("sandbox harness returned a non-string value"),
        },
        // Runtime limit violations are not catchable from script code
        Err(e) => ExecutionOutcome::failed(e.to_string()),
    }
}

/// Handle one inbound line, returning the encoded reply
///
/// Lines that are not `run` envelopes have no id to answer to and are dropped.
pub fn handle_line(line: &str, limits: &GuestLimits) -> Option<String> {
    let (id, code) = match Envelope::decode(line) {
        Ok(Envelope::Run { id, code }) => (id, code),
        Ok(other) => {
            warn!(id = other.id(), "Guest ignoring non-run envelope");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Guest received malformed envelope");
            return None;
        }
    };

    debug!(id = %id, code_len = code.len(), "Running sandboxed code");
    let outcome = run_script(&code, limits);

    match Envelope::reply(id, outcome).encode() {
        Ok(reply) => Some(reply),
        Err(e) => {
            warn!(error = %e, "Guest could not encode reply");
            None
        }
    }
}

/// Serve envelopes from a channel until the host side hangs up
///
/// Blocks the calling thread; run it on a dedicated OS thread.
pub fn serve_channel(
    mut inbound: UnboundedReceiver<String>,
    outbound: UnboundedSender<String>,
    limits: GuestLimits,
) {
    while let Some(line) = inbound.blocking_recv() {
        if let Some(reply) = handle_line(&line, &limits) {
            if outbound.send(reply).is_err() {
                break;
            }
        }
    }
    debug!("Sandbox guest channel closed");
}

/// Serve envelopes over stdin/stdout until stdin closes
pub fn serve_stdio(limits: GuestLimits) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(reply) = handle_line(&line, &limits) {
            writeln!(stdout, "{}", reply)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(code: &str) -> ExecutionOutcome {
        run_script(code, &GuestLimits::default())
    }

    #[test]
    fn test_console_and_return_value() {
        let outcome = run("console.log('x'); return 2+2;");
        assert_eq!(outcome.result, json!(4));
        assert!(outcome.error.is_none());
        assert_eq!(outcome.logs.len(), 1);
        assert_eq!(outcome.logs[0].level, "log");
        assert_eq!(outcome.logs[0].args, vec![json!("x")]);
    }

    #[test]
    fn test_levels_are_kept_in_order() {
        let outcome = run("console.warn('a'); console.error('b', 2); console.debug({k: 1});");
        let levels: Vec<&str> = outcome.logs.iter().map(|l| l.level.as_str()).collect();
        assert_eq!(levels, vec!["warn", "error", "debug"]);
        assert_eq!(outcome.logs[1].args, vec![json!("b"), json!(2)]);
        assert_eq!(outcome.logs[2].args, vec![json!({"k": 1})]);
    }

    #[test]
    fn test_undefined_result_is_null() {
        let outcome = run("let a = 1;");
        assert_eq!(outcome.result, serde_json::Value::Null);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_thrown_error_is_captured() {
        let outcome = run("console.log('before'); throw new Error('nope');");
        assert_eq!(outcome.result, serde_json::Value::Null);
        assert!(outcome.error.as_deref().unwrap_or_default().contains("nope"));
        assert_eq!(outcome.logs.len(), 1);
    }

    #[test]
    fn test_syntax_error_is_captured() {
        let outcome = run("return (;");
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_functions_become_strings() {
        let outcome = run("return function named() {};");
        assert!(outcome.result.is_string());
    }

    #[test]
    fn test_runaway_loop_is_stopped() {
        let limits = GuestLimits {
            loop_iteration_limit: 10_000,
            recursion_limit: 64,
        };
        let outcome = run_script("while (true) {}", &limits);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_handle_line_replies_with_same_id() {
        let line = r#"{"type":"run","id":"abc","code":"return 'hi';"}"#;
        let reply = handle_line(line, &GuestLimits::default()).unwrap();
        match Envelope::decode(&reply).unwrap() {
            Envelope::Reply { id, result, .. } => {
                assert_eq!(id, "abc");
                assert_eq!(result, json!("hi"));
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_handle_line_drops_garbage() {
        assert!(handle_line("not json", &GuestLimits::default()).is_none());
    }

    #[test]
    fn test_deeply_nested_result_is_cut_off() {
        let outcome = run("var a = []; for (var i = 0; i < 200000; i++) { a = [a]; } return a;");
        assert!(outcome.error.is_none(), "error: {:?}", outcome.error);

        let mut depth = 0;
        let mut value = &outcome.result;
        while let Some(inner) = value.as_array().and_then(|items| items.first()) {
            depth += 1;
            value = inner;
        }
        assert_eq!(depth, MAX_VALUE_DEPTH);
        assert_eq!(value, &json!("[nested too deeply]"));
    }

    #[test]
    fn test_cycles_and_odd_values_are_flattened() {
        let outcome = run(
            "var o = {name: 'o', gone: undefined, big: 10n, f: function () {}}; o.self = o; console.log(o, NaN); return o;",
        );
        assert!(outcome.error.is_none(), "error: {:?}", outcome.error);
        assert_eq!(outcome.result["self"], json!("[circular]"));
        assert_eq!(outcome.result["big"], json!("10"));
        assert!(outcome.result["f"].is_string());
        assert!(outcome.result.get("gone").is_none());
        assert_eq!(outcome.logs[0].args[1], serde_json::Value::Null);
    }

    #[test]
    fn test_thrown_objects_are_described() {
        let outcome = run("throw {code: 7};");
        assert_eq!(outcome.error.as_deref(), Some(r#"{"code":7}"#));
    }

    #[test]
    fn test_floats_leave_the_guest_exactly() {
        let outcome = run("return 1.0715660391465826e-75;");
        assert_eq!(outcome.result, json!(1.0715660391465826e-75_f64));
    }
}
