pub mod claude;
pub mod command;
pub mod prompt;

/// A fully built invocation: argv split into program and arguments, plus the
/// payload streamed to the child's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl ValidatedCommand {
    pub fn from_argv(mut argv: Vec<String>, stdin: Option<String>) -> Self {
        let program = if argv.is_empty() {
            String::new()
        } else {
            argv.remove(0)
        };
        Self {
            program,
            args: argv,
            stdin,
        }
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Value following the first occurrence of `flag`, if any.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }
}
