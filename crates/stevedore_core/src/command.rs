//! Typed remote commands.
//!
//! A [`Command`] keeps the program, arguments and environment as separate
//! values. Quoting happens once, in [`Command`]'s `Display` impl, which is the
//! only place a shell string is produced.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A structured command line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    privileged: bool,
    stdout_to: Option<String>,
}

impl Command {
    /// Create a command running `program`
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            privileged: false,
            stdout_to: None,
        }
    }

    /// Append an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    #[must_use]
    pub fn arg_path(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.arg(path)
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the command
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run with elevated privileges (`sudo -n`)
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Redirect standard output into `path`, truncating it
    #[must_use]
    pub fn stdout_to(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout_to = Some(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, excluding the program
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Environment assignments
    #[must_use]
    pub fn get_envs(&self) -> &[(String, String)] {
        &self.env
    }

    /// Whether the command runs privileged
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Output redirection target, if any
    #[must_use]
    pub fn stdout_target(&self) -> Option<&str> {
        self.stdout_to.as_deref()
    }

    /// Program followed by arguments, with privilege escalation applied
    ///
    /// Environment assignments and redirection are not included; callers
    /// spawning a process directly apply them through the process API.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 4);
        if self.privileged {
            argv.extend(["sudo".to_string(), "-n".to_string()]);
            if !self.env.is_empty() {
                argv.push("env".to_string());
                argv.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
            }
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.privileged {
            for (key, value) in &self.env {
                write!(f, "{}={} ", key, shell_words::quote(value))?;
            }
        }
        let argv = self.argv();
        write!(f, "{}", shell_words::join(&argv))?;
        if let Some(path) = &self.stdout_to {
            write!(f, " > {}", shell_words::quote(path))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_render() {
        let cmd = Command::new("mkdir").arg("-p").arg_path("/tmp/ofs data");
        assert_eq!(cmd.to_string(), "mkdir -p '/tmp/ofs data'");
    }

    #[test]
    fn test_env_render() {
        let cmd = Command::new("pvfs2-ping")
            .env("PVFS2TAB_FILE", "/tmp/ofs/pvfs2tab")
            .arg("-m")
            .arg("/mnt/ofs");
        assert_eq!(
            cmd.to_string(),
            "PVFS2TAB_FILE=/tmp/ofs/pvfs2tab pvfs2-ping -m /mnt/ofs"
        );
    }

    #[test]
    fn test_privileged_render_moves_env_after_sudo() {
        let cmd = Command::new("mount")
            .env("LANG", "C")
            .args(["-t", "pvfs2"])
            .privileged();
        assert_eq!(cmd.to_string(), "sudo -n env LANG=C mount -t pvfs2");
    }

    #[test]
    fn test_redirect_render_quotes_payload() {
        let cmd = Command::new("printf")
            .arg("%s\\n")
            .arg("tcp://10.0.0.1:3334/orangefs /mnt pvfs2 defaults,auto 0 0")
            .stdout_to("/tmp/ofs/pvfs2tab");
        assert_eq!(
            cmd.to_string(),
            "printf '%s\\n' 'tcp://10.0.0.1:3334/orangefs /mnt pvfs2 defaults,auto 0 0' > /tmp/ofs/pvfs2tab"
        );
    }

    #[test]
    fn test_hostile_argument_is_quoted() {
        let cmd = Command::new("rm").arg("-rf").arg("/data; reboot");
        assert_eq!(cmd.to_string(), "rm -rf '/data; reboot'");
    }

    #[test]
    fn test_argv() {
        let cmd = Command::new("modprobe").arg("orangefs").privileged();
        assert_eq!(cmd.argv(), vec!["sudo", "-n", "modprobe", "orangefs"]);
    }
}
