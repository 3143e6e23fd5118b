/////////////////////////////////////////
use anyhow::{Context, Result};
/////////////////////////////////////////
use libkdb::Registry;
/////////////////////////////////////////

/// `cmd!(id, short, long, format, description)` builds a command table entry.
macro_rules! cmd {
    ($id:expr, $short:expr, $long:expr, $format:expr, $desc:expr) => {
        libkdb::CommandDescriptor {
            id: $id,
            short_name: $short,
            long_name: $long,
            format: $format,
            description: $desc,
        }
    };
}

pub mod breakpoint_command;
pub mod general_command;
pub mod memory_command;
pub mod tcb_command;
pub mod thread_command;
pub mod trace_command;
pub mod trace_set_command;

#[cfg(test)]
pub mod test_support;
/////////////////////////////////////////
use breakpoint_command::BreakpointModule;
use general_command::{GoModule, HelpModule, LongCommandModule};
use memory_command::DumpModule;
use tcb_command::TcbModule;
use thread_command::ThreadListModule;
use trace_command::TraceBufferModule;
use trace_set_command::TraceSetModule;
/////////////////////////////////////////

/// Registers the built-in modules. The order here is the order of the help
/// screen.
pub fn register_builtin_modules(registry: &mut Registry) -> Result<()> {
    registry.register(Box::new(GoModule)).context("Failed to register go")?;
    registry.register(Box::new(HelpModule)).context("Failed to register help")?;
    registry
        .register(Box::new(LongCommandModule))
        .context("Failed to register long command mode")?;
    registry.register(Box::new(TcbModule)).context("Failed to register tcb")?;
    registry
        .register(Box::new(DumpModule::default()))
        .context("Failed to register dump")?;
    registry
        .register(Box::new(ThreadListModule))
        .context("Failed to register thread list")?;
    registry
        .register(Box::new(BreakpointModule::default()))
        .context("Failed to register breakpoints")?;
    registry
        .register(Box::new(TraceBufferModule::default()))
        .context("Failed to register trace buffer")?;
    registry
        .register(Box::new(TraceSetModule::default()))
        .context("Failed to register trace switches")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libkdb::registry::KeyKind;

    #[test]
    fn test_builtin_modules_register() {
        let mut registry = Registry::new();
        register_builtin_modules(&mut registry).expect("Unable to register modules");
        assert_eq!(registry.len(), 9);
        // a second round collides on every name
        assert!(register_builtin_modules(&mut registry).is_err());
    }

    #[test]
    fn test_unique_names() {
        let mut registry = Registry::new();
        register_builtin_modules(&mut registry).expect("Unable to register modules");
        let index = registry.index();
        let mut short = std::collections::HashSet::new();
        let mut long = std::collections::HashSet::new();
        for (_, command) in index.iter() {
            if !command.short_name.is_empty() {
                assert!(short.insert(command.short_name), "Duplicate short name: {}", command.short_name);
            }
            if !command.long_name.is_empty() {
                assert!(long.insert(command.long_name), "Duplicate long name: {}", command.long_name);
            }
        }
        for name in ["g", "h", ":", "t", "d", "l", "b", "T", "I", "P", "U", "N"] {
            assert!(index.lookup(name, KeyKind::Short).is_some(), "{} not bound", name);
        }
    }

    #[test]
    fn test_help_order() {
        let mut registry = Registry::new();
        register_builtin_modules(&mut registry).expect("Unable to register modules");
        let index = registry.index();
        let general: Vec<&str> = index.modules_in("GENERAL").map(|m| m.name).collect();
        assert_eq!(general, vec!["go", "help", "long"]);
        let info: Vec<&str> = index.modules_in("INFO").map(|m| m.name).collect();
        assert_eq!(info, vec!["tcb", "dump", "threads"]);
        let monitoring: Vec<&str> = index.modules_in("MONITORING").map(|m| m.name).collect();
        assert_eq!(monitoring, vec!["tbuf", "trace"]);
    }
}
