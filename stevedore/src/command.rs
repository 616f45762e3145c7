use std::path::Path;

use crate::config::LaunchConfig;

/// Flag introducing the config directory argument.
pub const ARG_CONFIG: &str = "--config";
/// Action token that starts a server sub-command.
pub const ACTION_START: &str = "start";

/// A role's start command, kept as its ordered arguments.
///
/// Argument order is relied upon by process restart and log collection:
/// executable, config flag, config dir, server sub-command, action, stdout
/// redirect, stderr redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartCommand {
    args: Vec<String>,
}

impl StartCommand {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn executable(&self) -> &str {
        &self.args[0]
    }

    /// The command line, arguments joined with single spaces.
    pub fn to_command_line(&self) -> String {
        self.args.join(" ")
    }
}

impl std::fmt::Display for StartCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_command_line())
    }
}

/// Builds start commands for roles.
#[derive(Clone, Debug)]
pub struct CommandAssembler {
    conf_dir_name: String,
    log_dir_placeholder: String,
    stdout_file: String,
    stderr_file: String,
}

impl CommandAssembler {
    pub fn new(config: &LaunchConfig) -> Self {
        Self {
            conf_dir_name: config.conf_dir_name.clone(),
            log_dir_placeholder: config.log_dir_placeholder.clone(),
            stdout_file: config.stdout_file.clone(),
            stderr_file: config.stderr_file.clone(),
        }
    }

    pub fn assemble(&self, executable: &Path, server_command: &str) -> StartCommand {
        // relative executables stay relative: they point into the staged image
        let args = vec![
            executable.to_string_lossy().into_owned(),
            ARG_CONFIG.to_string(),
            self.conf_dir_name.clone(),
            server_command.to_string(),
            ACTION_START.to_string(),
            format!("1>{}/{}", self.log_dir_placeholder, self.stdout_file),
            format!("2>{}/{}", self.log_dir_placeholder, self.stderr_file),
        ];
        StartCommand { args }
    }
}
