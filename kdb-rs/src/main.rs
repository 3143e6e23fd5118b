///////////////////////////
mod command;
mod options;
mod script;
mod tui;
///////////////////////////
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
///////////////////////////
use clap::Parser;
use log::info;
///////////////////////////
use libkdb::process::{Pid, ProcessTarget};
use libkdb::sim::SimTarget;
use libkdb::{Console, Debugger, Registry, Target};
use options::Options;
///////////////////////////

fn main() {
    env_logger::init();
    let options = Options::parse();
    if options.no_color {
        colored::control::set_override(false);
    }

    // Ctrl-C closes the input source, which ends the session.
    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupted.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)).unwrap_or_else(|e| {
        eprintln!("Failed to install the interrupt handler: {}", e);
        std::process::exit(1);
    });

    let mut target: Box<dyn Target> = if let Some(pid) = options.pid {
        match ProcessTarget::attach(Pid::from_raw(pid)) {
            Ok(process) => Box::new(process),
            Err(e) => {
                eprintln!("Failed to attach to process: {:#}", e);
                std::process::exit(1);
            }
        }
    } else if let Some(program) = &options.exec {
        match ProcessTarget::launch(program, &options.program_args) {
            Ok(process) => Box::new(process),
            Err(e) => {
                eprintln!("Failed to launch inferior process: {:#}", e);
                std::process::exit(1);
            }
        }
    } else {
        Box::new(SimTarget::demo())
    };

    let height = options.height as usize;
    let mut console: Box<dyn Console> = if let Some(path) = &options.script {
        match script::load_script(path) {
            Ok(keys) => Box::new(tui::ScriptConsole::new(keys, height, interrupted.clone())),
            Err(e) => {
                eprintln!("Failed to load key script: {:#}", e);
                std::process::exit(1);
            }
        }
    } else {
        match tui::TerminalConsole::new(height, interrupted.clone()) {
            Ok(terminal) => Box::new(terminal),
            Err(e) => {
                eprintln!("Failed to set up the terminal: {:#}", e);
                std::process::exit(1);
            }
        }
    };

    let mut registry = Registry::new();
    command::register_builtin_modules(&mut registry).unwrap_or_else(|e| {
        eprintln!("Failed to register debugger commands: {:#}", e);
        std::process::exit(1);
    });
    info!("{} commands registered", registry.index().iter().count());

    let mut debugger = Debugger::new(registry, options.debugger_config());
    debugger.enter_debugger(console.as_mut(), target.as_mut(), "startup");
    if interrupted.load(Ordering::SeqCst) {
        info!("session ended by interrupt");
    }
}
