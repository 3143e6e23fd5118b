use thiserror::Error;

/// A format string that cannot be interpreted. These are wiring errors in a
/// command table, found when the table is registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unknown format directive '%{directive}' at offset {position}")]
    UnknownDirective { directive: char, position: usize },
    #[error("string directive at offset {position} needs a width")]
    MissingWidth { position: usize },
    #[error("field width at offset {position} is too large")]
    WidthOverflow { position: usize },
    #[error("format ends inside the directive at offset {position}")]
    Truncated { position: usize },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("short command '{name}' of module {module} is already provided by {existing}")]
    DuplicateShortName {
        name: &'static str,
        module: &'static str,
        existing: &'static str,
    },
    #[error("long command '{name}' of module {module} is already provided by {existing}")]
    DuplicateLongName {
        name: &'static str,
        module: &'static str,
        existing: &'static str,
    },
    #[error("module {module} declares command id {id} twice")]
    DuplicateId { module: &'static str, id: u32 },
    #[error("command '{command}' of module {module} has a bad format string: {source}")]
    BadFormat {
        module: &'static str,
        command: &'static str,
        #[source]
        source: FormatError,
    },
    #[error("a module named {0} is already registered")]
    DuplicateModule(&'static str),
}
