//! Command table: descriptors, lookup by name or alias.

use crate::auth::Access;
use crate::commands;
use crate::router::Session;

/// `args[0]` is the command (or subcommand) token itself.
pub type Handler = fn(&mut Session<'_>, &[&str]) -> anyhow::Result<()>;

#[derive(Debug)]
pub struct Subcommand {
    pub name: &'static str,
    pub desc: Option<&'static str>,
    /// Usage without the prefix, e.g. `crown give [@_id]`.
    pub syntax: &'static str,
    pub access: Access,
    pub handler: Handler,
}

#[derive(Debug)]
pub enum Body {
    Run(Handler),
    Sub(&'static [Subcommand]),
}

#[derive(Debug)]
pub struct Command {
    /// Canonical, lowercase.
    pub name: &'static str,
    pub desc: Option<&'static str>,
    pub syntax: &'static str,
    pub aliases: &'static [&'static str],
    pub access: Access,
    pub body: Body,
}

impl Command {
    pub fn subcommands(&self) -> &'static [Subcommand] {
        match self.body {
            Body::Sub(subs) => subs,
            Body::Run(_) => &[],
        }
    }

    pub fn find_sub(&self, name: &str) -> Option<&'static Subcommand> {
        self.subcommands()
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug)]
pub struct Registry {
    prefix: String,
    commands: &'static [Command],
}

impl Registry {
    pub fn new(prefix: impl Into<String>, commands: &'static [Command]) -> Self {
        Self {
            prefix: prefix.into(),
            commands,
        }
    }

    pub fn builtin(prefix: impl Into<String>) -> Self {
        Self::new(prefix, commands::BUILTIN)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn commands(&self) -> &'static [Command] {
        self.commands
    }

    /// Case-insensitive lookup by canonical name or alias, without the prefix.
    pub fn find(&self, name: &str) -> Option<&'static Command> {
        self.commands.iter().find(|c| c.answers_to(name))
    }

    /// `syntax` with the prefix in front.
    pub fn usage(&self, syntax: &str) -> String {
        format!("{}{}", self.prefix, syntax)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn aliases_resolve_to_the_canonical_descriptor() {
        let reg = Registry::builtin("=");
        for cmd in reg.commands() {
            let by_name = reg.find(cmd.name).map(|c| c as *const Command);
            assert_eq!(by_name, Some(cmd as *const Command));
            for alias in cmd.aliases {
                let by_alias = reg.find(alias).map(|c| c as *const Command);
                assert_eq!(by_alias, by_name, "alias {alias} of {}", cmd.name);
            }
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let reg = Registry::builtin("=");
        assert_eq!(reg.find("HELP").map(|c| c.name), Some("help"));
        assert_eq!(reg.find("Chown").map(|c| c.name), Some("crown"));
        assert!(reg.find("nope").is_none());

        let crown = reg.find("crown").map(|c| c.find_sub("GIVE").map(|s| s.name));
        assert_eq!(crown, Some(Some("give")));
    }

    #[test]
    fn names_and_aliases_are_unique() {
        let reg = Registry::builtin("=");
        let mut seen = HashSet::new();
        for cmd in reg.commands() {
            assert_eq!(cmd.name, cmd.name.to_ascii_lowercase());
            assert!(seen.insert(cmd.name), "duplicate {}", cmd.name);
            for alias in cmd.aliases {
                assert!(seen.insert(*alias), "duplicate alias {alias}");
            }
        }
    }

    #[test]
    fn usage_is_prefixed() {
        let reg = Registry::builtin("!");
        assert_eq!(reg.usage("help [command]"), "!help [command]");
    }
}
