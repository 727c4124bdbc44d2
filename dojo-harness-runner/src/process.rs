// Per-invocation launch settings and command construction

use dojo_harness_core::LaunchMode;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Default)]
pub struct ProcessConfig {
    /// `None` inherits the parent environment; `Some` replaces it entirely
    pub env: Option<HashMap<String, String>>,
    pub working_directory: Option<PathBuf>,
    pub mode: LaunchMode,
}

impl ProcessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, env: Option<HashMap<String, String>>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_directory<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build the `Command` for `program` and `args` according to `mode`,
    /// with working directory and environment applied.
    pub fn build_command<S: AsRef<OsStr>>(&self, program: &OsStr, args: &[S]) -> Command {
        let mut command = match self.mode {
            LaunchMode::Direct => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            LaunchMode::Shell => {
                let (shell, flag) = system_shell();
                let mut command = Command::new(shell);
                command.arg(flag).arg(join_command_line(program, args));
                command
            }
        };
        self.apply(&mut command);
        command
    }

    pub(crate) fn apply(&self, command: &mut Command) {
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }
        if let Some(env) = &self.env {
            command.env_clear();
            command.envs(env);
        }
    }
}

/// Program and arguments joined by single spaces, no quoting.
pub fn join_command_line<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> OsString {
    let mut line = OsString::from(program);
    for arg in args {
        line.push(" ");
        line.push(arg.as_ref());
    }
    line
}

fn system_shell() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("/bin/sh", "-c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_config_default() {
        let config = ProcessConfig::default();
        assert!(config.env.is_none());
        assert!(config.working_directory.is_none());
        assert_eq!(config.mode, LaunchMode::Direct);
    }

    #[test]
    fn test_join_command_line() {
        let line = join_command_line(OsStr::new("/p/bin/dojo"), &["a", "b c"]);
        assert_eq!(line, OsString::from("/p/bin/dojo a b c"));

        let empty: [&str; 0] = [];
        assert_eq!(join_command_line(OsStr::new("ls"), &empty), OsString::from("ls"));
    }

    #[test]
    fn test_build_command_direct_keeps_argument_vector() {
        let config = ProcessConfig::new().with_working_directory("/srv/project");
        let command = config.build_command(OsStr::new("/srv/project/bin/dojo"), &["a", "b c"]);

        assert_eq!(command.get_program(), OsStr::new("/srv/project/bin/dojo"));
        let args: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(args, vec![OsStr::new("a"), OsStr::new("b c")]);
        assert_eq!(command.get_current_dir(), Some(Path::new("/srv/project")));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_command_shell_joins_arguments() {
        let config = ProcessConfig::new().with_mode(LaunchMode::Shell);
        let command = config.build_command(OsStr::new("/srv/project/bin/dojo"), &["a", "b c"]);

        assert_eq!(command.get_program(), OsStr::new("/bin/sh"));
        let args: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(
            args,
            vec![OsStr::new("-c"), OsStr::new("/srv/project/bin/dojo a b c")]
        );
    }

    #[test]
    fn test_build_command_sets_env_override() {
        let mut env = HashMap::new();
        env.insert("DOJO_LOG_LEVEL".to_string(), "debug".to_string());
        let config = ProcessConfig::new().with_env(Some(env));
        let command = config.build_command(OsStr::new("dojo"), &["--help"]);

        let envs: Vec<(&OsStr, Option<&OsStr>)> = command.get_envs().collect();
        assert_eq!(
            envs,
            vec![(OsStr::new("DOJO_LOG_LEVEL"), Some(OsStr::new("debug")))]
        );
    }
}
