use std::fmt;
use std::path::PathBuf;

/// One invocation of an external program.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    /// Bytes piped to stdin; redacted from `Debug` since it carries passwords
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Run `script` through `/bin/sh -c`.
    pub fn shell(script: &str) -> Self {
        Self::new("/bin/sh", ["-c", script])
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn extend_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// The argument following `flag`, e.g. `value_of("--namespace")`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("envs", &self.envs.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("current_dir", &self.current_dir)
            .field("stdin", &self.stdin.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{program} not found on PATH")]
    NotFound {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} command failed: {args:?}\n{stderr}")]
    CommandFailed {
        program: String,
        args: Vec<String>,
        stderr: String,
    },

    #[error("{program} output was not valid UTF-8")]
    InvalidUtf8 {
        program: String,
        source: std::string::FromUtf8Error,
    },

    #[error("failed to write to {program} stdin")]
    StdinWrite {
        program: String,
        source: std::io::Error,
    },
}

impl CommandError {
    /// Whether the command ran and its stderr mentions `needle`.
    pub fn stderr_contains(&self, needle: &str) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => stderr.contains(needle),
            _ => false,
        }
    }
}
