//! Core of the kdb interactive debugger: command registry, input format
//! parser, dispatch loop and memory viewer, independent of the system being
//! debugged (see [`target::Target`]) and of the terminal (see
//! [`console::Console`]).

pub mod address;
pub mod breakpoint;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod key;
pub mod parser;
pub mod process;
pub mod registry;
pub mod session;
pub mod sim;
pub mod target;
pub mod thread_id;
pub mod trace;
pub mod viewer;

// Export the necessary modules and types as is
pub use address::{CursorAddress, PAGE_SIZE, VirtAddress};
pub use config::{DebuggerConfig, FrameLayout};
pub use console::{Console, ScriptedConsole, Style};
pub use dispatch::{Action, Debugger, Env, Input, NextStep};
pub use key::Key;
pub use parser::ArgValue;
pub use registry::{CommandDescriptor, CommandIndex, Module, Registry};
pub use session::Session;
pub use target::{Target, ThreadInfo, ThreadState};
pub use thread_id::{TaskId, ThreadId};
pub use trace::{TraceEntry, TraceKind, TraceSetting};
