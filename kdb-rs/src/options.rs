/////////////////////////////////
use clap::Parser;
use std::path::PathBuf;
/////////////////////////////////
use libkdb::{DebuggerConfig, FrameLayout};
/////////////////////////////////

#[derive(Parser, Debug)]
#[command(name = "kdb", about = "Keystroke-driven kernel debugger")]
pub struct Options {
    /// The PID of a process to attach to instead of the simulated kernel.
    #[arg(short = 'p', long = "pid", conflicts_with = "exec")]
    pub pid: Option<i32>,

    /// A program to launch under ptrace and debug.
    #[arg(short = 'e', long = "exec")]
    pub exec: Option<PathBuf>,

    /// The arguments to pass to the program being launched.
    #[arg(last = true, requires = "exec")]
    pub program_args: Vec<String>,

    /// Read keystrokes from this file instead of the terminal.
    #[arg(short = 's', long = "script")]
    pub script: Option<PathBuf>,

    /// Screen height in rows.
    #[arg(long = "height", default_value_t = 25, value_parser = clap::value_parser!(u16).range(8..))]
    pub height: u16,

    /// Make Space return to the prompt instead of looking it up as a command.
    #[arg(long = "space-idle")]
    pub space_idle: bool,

    /// Number of user entry frame words highlighted in the TCB view.
    #[arg(long = "frame-words", default_value_t = 5)]
    pub frame_words: usize,

    /// Disable colors and text attributes.
    #[arg(long = "no-color")]
    pub no_color: bool,
}

impl Options {
    pub fn debugger_config(&self) -> DebuggerConfig {
        DebuggerConfig {
            screen_height: self.height as usize,
            space_is_idle: self.space_idle,
            frame_layout: FrameLayout {
                user_frame_words: self.frame_words,
            },
            ..DebuggerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::try_parse_from(["kdb"]).expect("Unable to parse options");
        assert!(options.pid.is_none() && options.exec.is_none());
        assert_eq!(options.debugger_config(), DebuggerConfig::default());
    }

    #[test]
    fn test_exec_with_arguments() {
        let options = Options::try_parse_from(["kdb", "-e", "ls", "--height", "40", "--", "-l", "/"])
            .expect("Unable to parse options");
        assert_eq!(options.exec, Some(PathBuf::from("ls")));
        assert_eq!(options.program_args, vec!["-l", "/"]);
        assert_eq!(options.debugger_config().screen_height, 40);
    }

    #[test]
    fn test_pid_conflicts_with_exec() {
        assert!(Options::try_parse_from(["kdb", "-p", "1", "-e", "ls"]).is_err());
        assert!(Options::try_parse_from(["kdb", "--height", "3"]).is_err());
    }
}
