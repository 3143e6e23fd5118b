use libkdb::{Debugger, DebuggerConfig, Registry, ScriptedConsole, sim::SimTarget};

use super::register_builtin_modules;
use crate::script::parse_script;

pub struct Outcome {
    pub output: String,
    pub target: SimTarget,
    pub debugger: Debugger,
}

/// Runs one session over the demo system, typing `script` (key script
/// syntax), on a screen of `height` rows.
pub fn run_script_with_height(script: &str, height: usize) -> Outcome {
    let mut registry = Registry::new();
    register_builtin_modules(&mut registry).expect("Unable to register modules");
    let config = DebuggerConfig {
        screen_height: height,
        ..DebuggerConfig::default()
    };
    let mut debugger = Debugger::new(registry, config);
    let mut target = SimTarget::demo();
    let keys = parse_script(script).expect("Invalid test script");
    let mut console = ScriptedConsole::new(keys).with_height(height);
    debugger.enter_debugger(&mut console, &mut target, "test");
    Outcome {
        output: console.output().to_string(),
        target,
        debugger,
    }
}

pub fn run_script(script: &str) -> Outcome {
    run_script_with_height(script, 25)
}
