use log::debug;
use ptrie::Trie;

use crate::dispatch::{Action, Env, Input};
use crate::error::RegistryError;
use crate::format::validate;
use crate::key::Key;

/// One command of a module's static command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Unique within the owning module, handed back to its handler.
    pub id: u32,
    /// Key typed at the top-level prompt. Empty when the command has none.
    pub short_name: &'static str,
    /// Name used in long command mode. Empty when the command has none.
    pub long_name: &'static str,
    pub format: &'static str,
    /// Help text: `\t` aligns to the description column, `\n` starts a
    /// continuation line.
    pub description: &'static str,
}

/// A pluggable provider of debugger commands.
pub trait Module {
    fn name(&self) -> &'static str;

    /// Help category. Names no registered category fall back to `MISC`.
    fn category(&self) -> &'static str {
        MISC
    }

    fn commands(&self) -> &'static [CommandDescriptor];

    fn num_commands(&self) -> usize {
        self.commands().len()
    }

    /// Runs a command once all fields of the current step have been read.
    fn action(&mut self, env: &mut Env<'_>, command: &CommandDescriptor, input: &Input) -> Action;

    /// Called after every keystroke of a `%S` field of one of this module's
    /// commands.
    #[allow(unused_variables)]
    fn edit_field(
        &mut self,
        index: &CommandIndex,
        command_id: u32,
        stage: u32,
        field: &mut String,
        max_len: usize,
        key: Key,
    ) {
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    pub description: &'static str,
    pub order: u32,
}

pub const GENERAL: &str = "GENERAL";
pub const INFO: &str = "INFO";
pub const MONITORING: &str = "MONITORING";
pub const DEBUGGING: &str = "DEBUGGING";
pub const MISC: &str = "MISC";

const DEFAULT_CATEGORIES: &[Category] = &[
    Category {
        name: GENERAL,
        description: "general debugger commands",
        order: 0,
    },
    Category {
        name: INFO,
        description: "information about kernel state",
        order: 1,
    },
    Category {
        name: MONITORING,
        description: "monitoring kernel events",
        order: 2,
    },
    Category {
        name: DEBUGGING,
        description: "real debugging stuff",
        order: 3,
    },
    Category {
        name: MISC,
        description: "misc debugger commands",
        order: 2000,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Short,
    Long,
}

/// Position of a command: module in registration order, command in the
/// module's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub module: usize,
    pub command: usize,
}

#[derive(Debug, Clone)]
pub struct IndexedModule {
    pub name: &'static str,
    pub category: &'static str,
    pub commands: &'static [CommandDescriptor],
}

/// Read-only view of everything registered, handed to command handlers.
pub struct CommandIndex {
    modules: Vec<IndexedModule>,
    categories: Vec<Category>,
    long_names: Trie<char, CommandKey>,
}

impl CommandIndex {
    fn new() -> Self {
        CommandIndex {
            modules: Vec::new(),
            categories: DEFAULT_CATEGORIES.to_vec(),
            long_names: Trie::new(),
        }
    }

    fn rebuild_long_names(&mut self) {
        self.long_names = Trie::new();
        for (module_index, module) in self.modules.iter().enumerate() {
            for (command_index, command) in module.commands.iter().enumerate() {
                if !command.long_name.is_empty() {
                    self.long_names.insert(
                        command.long_name.chars(),
                        CommandKey {
                            module: module_index,
                            command: command_index,
                        },
                    );
                }
            }
        }
    }

    /// Finds the command registered under `name`.
    pub fn lookup(&self, name: &str, kind: KeyKind) -> Option<CommandKey> {
        if name.is_empty() {
            return None;
        }
        match kind {
            KeyKind::Short => self.iter().find_map(|(key, command)| {
                (command.short_name == name).then_some(key)
            }),
            KeyKind::Long => self.long_names.get(name.chars()).copied(),
        }
    }

    /// Looks up the short command bound to a single top-level key.
    pub fn lookup_key(&self, key: Key) -> Option<CommandKey> {
        let c = key.as_char()?;
        let mut buffer = [0u8; 4];
        self.lookup(c.encode_utf8(&mut buffer), KeyKind::Short)
    }

    pub fn descriptor(&self, key: CommandKey) -> Option<&'static CommandDescriptor> {
        self.modules.get(key.module)?.commands.get(key.command)
    }

    pub fn module_name(&self, key: CommandKey) -> Option<&'static str> {
        self.modules.get(key.module).map(|m| m.name)
    }

    /// All long names starting with `prefix`, in registration order.
    pub fn complete_long(&self, prefix: &str) -> Vec<&'static str> {
        let mut keys: Vec<CommandKey> = if prefix.is_empty() {
            self.iter()
                .filter(|(_, command)| !command.long_name.is_empty())
                .map(|(key, _)| key)
                .collect()
        } else {
            let mut keys: Vec<CommandKey> = self
                .long_names
                .find_postfixes(prefix.chars())
                .into_iter()
                .copied()
                .collect();
            keys.extend(self.long_names.get(prefix.chars()).copied());
            keys
        };
        keys.sort_by_key(|key| (key.module, key.command));
        keys.dedup();
        keys.into_iter()
            .filter_map(|key| self.descriptor(key))
            .map(|command| command.long_name)
            .collect()
    }

    /// Every command with its key, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (CommandKey, &'static CommandDescriptor)> + '_ {
        self.modules
            .iter()
            .enumerate()
            .flat_map(|(module_index, module)| {
                module
                    .commands
                    .iter()
                    .enumerate()
                    .map(move |(command_index, command)| {
                        (
                            CommandKey {
                                module: module_index,
                                command: command_index,
                            },
                            command,
                        )
                    })
            })
    }

    /// Categories in display order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// The category a module is listed under.
    pub fn resolve_category(&self, name: &str) -> &'static str {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .map_or(MISC, |c| c.name)
    }

    pub fn modules_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a IndexedModule> + 'a {
        self.modules
            .iter()
            .filter(move |m| self.resolve_category(m.category) == category)
    }

    pub fn modules(&self) -> &[IndexedModule] {
        &self.modules
    }
}

/// The set of registered modules. Registration order is the order of the
/// `register` calls and decides the order of help output and scans.
pub struct Registry {
    index: CommandIndex,
    modules: Vec<Box<dyn Module>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            index: CommandIndex::new(),
            modules: Vec::new(),
        }
    }

    /// Adds (or replaces) a help category.
    pub fn add_category(&mut self, category: Category) {
        self.index.categories.retain(|c| c.name != category.name);
        self.index.categories.push(category);
        self.index.categories.sort_by_key(|c| c.order);
    }

    pub fn register(&mut self, module: Box<dyn Module>) -> Result<(), RegistryError> {
        let name = module.name();
        if self.index.modules.iter().any(|m| m.name == name) {
            return Err(RegistryError::DuplicateModule(name));
        }
        let commands = module.commands();
        for (i, command) in commands.iter().enumerate() {
            validate(command.format).map_err(|source| RegistryError::BadFormat {
                module: name,
                command: display_name(command),
                source,
            })?;
            let earlier = &commands[..i];
            if earlier.iter().any(|c| c.id == command.id) {
                return Err(RegistryError::DuplicateId {
                    module: name,
                    id: command.id,
                });
            }
            if !command.short_name.is_empty() {
                if let Some(existing) = self.owner_of(command.short_name, KeyKind::Short, earlier, name) {
                    return Err(RegistryError::DuplicateShortName {
                        name: command.short_name,
                        module: name,
                        existing,
                    });
                }
            }
            if !command.long_name.is_empty() {
                if let Some(existing) = self.owner_of(command.long_name, KeyKind::Long, earlier, name) {
                    return Err(RegistryError::DuplicateLongName {
                        name: command.long_name,
                        module: name,
                        existing,
                    });
                }
            }
        }

        debug!(
            "registered module {} ({} commands, category {})",
            name,
            module.num_commands(),
            module.category()
        );
        self.index.modules.push(IndexedModule {
            name,
            category: module.category(),
            commands,
        });
        self.modules.push(module);
        self.index.rebuild_long_names();
        Ok(())
    }

    /// Name of the module that already owns `name`, looking at registered
    /// modules and the part of the new module's table checked so far.
    fn owner_of(
        &self,
        name: &str,
        kind: KeyKind,
        earlier: &[CommandDescriptor],
        module: &'static str,
    ) -> Option<&'static str> {
        let clashes = |c: &CommandDescriptor| match kind {
            KeyKind::Short => c.short_name == name,
            KeyKind::Long => c.long_name == name,
        };
        if earlier.iter().any(clashes) {
            return Some(module);
        }
        self.index
            .lookup(name, kind)
            .and_then(|key| self.index.module_name(key))
    }

    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Module>> {
        let position = self.index.modules.iter().position(|m| m.name == name)?;
        self.index.modules.remove(position);
        self.index.rebuild_long_names();
        debug!("unregistered module {}", name);
        Some(self.modules.remove(position))
    }

    pub fn index(&self) -> &CommandIndex {
        &self.index
    }

    pub fn lookup(&self, name: &str, kind: KeyKind) -> Option<(&dyn Module, &'static CommandDescriptor)> {
        let key = self.index.lookup(name, kind)?;
        let command = self.index.descriptor(key)?;
        Some((self.modules[key.module].as_ref(), command))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Shared index and mutable modules at the same time, for dispatch.
    pub(crate) fn split_mut(&mut self) -> (&CommandIndex, &mut [Box<dyn Module>]) {
        (&self.index, &mut self.modules)
    }
}

fn display_name(command: &CommandDescriptor) -> &'static str {
    if command.long_name.is_empty() {
        command.short_name
    } else {
        command.long_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        category: &'static str,
        commands: &'static [CommandDescriptor],
    }

    impl Module for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn category(&self) -> &'static str {
            self.category
        }

        fn commands(&self) -> &'static [CommandDescriptor] {
            self.commands
        }

        fn action(&mut self, _env: &mut Env<'_>, _command: &CommandDescriptor, _input: &Input) -> Action {
            Action::Nothing
        }
    }

    const fn cmd(id: u32, short_name: &'static str, long_name: &'static str, format: &'static str) -> CommandDescriptor {
        CommandDescriptor {
            id,
            short_name,
            long_name,
            format,
            description: "",
        }
    }

    const DUMP: &[CommandDescriptor] = &[cmd(0, "d", "dump", "%C"), cmd(1, "", "dumpall", "\n")];
    const TCB: &[CommandDescriptor] = &[cmd(0, "t", "tcb", "%C")];
    const CLASH: &[CommandDescriptor] = &[cmd(0, "t", "thread", "%C")];
    const BROKEN: &[CommandDescriptor] = &[cmd(0, "x", "broken", "%q")];
    const TWICE: &[CommandDescriptor] = &[cmd(3, "y", "", "\n"), cmd(3, "z", "", "\n")];

    fn module(name: &'static str, category: &'static str, commands: &'static [CommandDescriptor]) -> Box<dyn Module> {
        Box::new(Fixed {
            name,
            category,
            commands,
        })
    }

    #[test]
    fn test_lookup_is_stable() {
        let mut registry = Registry::new();
        registry.register(module("dump", INFO, DUMP)).expect("register dump");
        registry.register(module("tcb", INFO, TCB)).expect("register tcb");
        let index = registry.index();
        for _ in 0..3 {
            assert_eq!(
                index.lookup("t", KeyKind::Short),
                Some(CommandKey { module: 1, command: 0 })
            );
            assert_eq!(
                index.lookup("dumpall", KeyKind::Long),
                Some(CommandKey { module: 0, command: 1 })
            );
        }
        assert_eq!(index.lookup("dump", KeyKind::Short), None);
        assert_eq!(index.lookup("", KeyKind::Short), None);
        assert_eq!(index.lookup_key(Key::Char('d')), Some(CommandKey { module: 0, command: 0 }));
        assert_eq!(index.lookup_key(Key::Return), None);
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut registry = Registry::new();
        registry.register(module("tcb", INFO, TCB)).expect("register tcb");
        assert!(matches!(
            registry.register(module("threads", INFO, CLASH)),
            Err(RegistryError::DuplicateShortName { existing: "tcb", .. })
        ));
        assert!(matches!(
            registry.register(module("tcb", INFO, DUMP)),
            Err(RegistryError::DuplicateModule("tcb"))
        ));
        assert!(matches!(
            registry.register(module("broken", MISC, BROKEN)),
            Err(RegistryError::BadFormat { command: "broken", .. })
        ));
        assert!(matches!(
            registry.register(module("twice", MISC, TWICE)),
            Err(RegistryError::DuplicateId { id: 3, .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_rebuilds_index() {
        let mut registry = Registry::new();
        registry.register(module("dump", INFO, DUMP)).expect("register dump");
        registry.register(module("tcb", INFO, TCB)).expect("register tcb");
        assert!(registry.unregister("dump").is_some());
        assert!(registry.unregister("dump").is_none());
        assert_eq!(
            registry.index().lookup("tcb", KeyKind::Long),
            Some(CommandKey { module: 0, command: 0 })
        );
        assert_eq!(registry.index().lookup("dump", KeyKind::Long), None);
        // 't' stays with tcb, the dump names are free again
        registry.register(module("threads", INFO, CLASH)).expect_err("t still taken");
        registry.register(module("dump", INFO, DUMP)).expect("register dump again");
    }

    #[test]
    fn test_complete_long() {
        let mut registry = Registry::new();
        registry.register(module("dump", INFO, DUMP)).expect("register dump");
        registry.register(module("tcb", INFO, TCB)).expect("register tcb");
        assert_eq!(registry.index().complete_long("du"), vec!["dump", "dumpall"]);
        assert_eq!(registry.index().complete_long("dump"), vec!["dump", "dumpall"]);
        assert_eq!(registry.index().complete_long(""), vec!["dump", "dumpall", "tcb"]);
        assert!(registry.index().complete_long("x").is_empty());
    }

    #[test]
    fn test_categories() {
        let mut registry = Registry::new();
        registry.register(module("dump", INFO, DUMP)).expect("register dump");
        registry.register(module("tcb", "NO_SUCH", TCB)).expect("register tcb");
        let index = registry.index();
        let order: Vec<_> = index.categories().iter().map(|c| c.name).collect();
        assert_eq!(order, vec![GENERAL, INFO, MONITORING, DEBUGGING, MISC]);
        assert_eq!(index.modules_in(INFO).map(|m| m.name).collect::<Vec<_>>(), vec!["dump"]);
        assert_eq!(index.modules_in(MISC).map(|m| m.name).collect::<Vec<_>>(), vec!["tcb"]);
    }

    #[test]
    fn test_added_category() {
        let mut registry = Registry::new();
        registry.add_category(Category {
            name: "PROFILING",
            description: "performance counters",
            order: 10,
        });
        registry.register(module("tcb", "PROFILING", TCB)).expect("register tcb");
        let index = registry.index();
        let order: Vec<_> = index.categories().iter().map(|c| c.name).collect();
        assert_eq!(order, vec![GENERAL, INFO, MONITORING, DEBUGGING, "PROFILING", MISC]);
        assert_eq!(index.modules_in("PROFILING").count(), 1);
    }
}
