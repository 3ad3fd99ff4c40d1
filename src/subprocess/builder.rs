use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::ProcessCommand;

/// Fluent construction of a [`ProcessCommand`].
pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            command: ProcessCommand {
                program: program.into(),
                args: Vec::new(),
                env: HashMap::new(),
                working_dir: None,
                timeout: None,
                stdin: None,
            },
        }
    }

    /// Split a detected command line such as `["npm", "run", "build"]`.
    /// Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.as_str()).args(args))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_owned()));
        self
    }

    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.command
            .env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.command.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.command.stdin = Some(input.into());
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_argv() {
        let argv = vec!["npm".to_string(), "run".to_string(), "build".to_string()];
        let command = ProcessCommandBuilder::from_argv(&argv).unwrap().build();
        assert_eq!(command.program, "npm");
        assert_eq!(command.args, ["run", "build"]);
        assert!(ProcessCommandBuilder::from_argv(&[]).is_none());
    }

    #[test]
    fn test_envs_are_copied() {
        let mut vars = std::collections::BTreeMap::new();
        vars.insert("NODE_ENV".to_string(), "test".to_string());
        let command = ProcessCommandBuilder::new("node").envs(&vars).build();
        assert_eq!(command.env["NODE_ENV"], "test");
    }
}
