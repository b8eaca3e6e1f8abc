use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use thiserror::Error;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

pub trait HideWindow {
    fn hide_window(&mut self) -> &mut Self;
}

impl HideWindow for Command {
    #[cfg(windows)]
    fn hide_window(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(not(windows))]
    fn hide_window(&mut self) -> &mut Self {
        self
    }
}

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("argument cannot be passed to the elevation prompt: {argument}")]
    UnquotableArgument { argument: String },
}

/// Build a command that runs `program` with `args` under elevated rights.
///
/// The returned command only exits once the elevated program has exited, so a
/// caller can wait on it like on the program itself.
///
/// # Errors
/// Returns an error when an argument cannot be quoted for the platform's
/// elevation mechanism.
#[cfg(all(unix, not(target_os = "macos")))]
pub fn elevated_command(program: &Path, args: &[OsString]) -> Result<Command, ElevationError> {
    let mut cmd = Command::new("pkexec");
    cmd.arg(program);
    cmd.args(args);
    Ok(cmd)
}

/// Build a command that runs `program` with `args` under elevated rights.
///
/// # Errors
/// Returns an error when an argument cannot be quoted for `osascript`.
#[cfg(target_os = "macos")]
pub fn elevated_command(program: &Path, args: &[OsString]) -> Result<Command, ElevationError> {
    let words = std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|word| word.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    let shell_line = shlex::try_join(words.iter().map(String::as_str)).map_err(|_| {
        ElevationError::UnquotableArgument {
            argument: words.join(" "),
        }
    })?;
    let script = format!(
        "do shell script \"{}\" with administrator privileges",
        shell_line.replace('\\', "\\\\").replace('"', "\\\"")
    );

    let mut cmd = Command::new("osascript");
    cmd.args(["-e", &script]);
    Ok(cmd)
}

/// Build a command that runs `program` with `args` under elevated rights.
///
/// # Errors
/// Returns an error when an argument contains a double quote, which
/// `Start-Process` cannot forward.
#[cfg(windows)]
pub fn elevated_command(program: &Path, args: &[OsString]) -> Result<Command, ElevationError> {
    let mut argument_list = Vec::with_capacity(args.len());
    for arg in args {
        let arg = arg.to_string_lossy();
        if arg.contains('"') {
            return Err(ElevationError::UnquotableArgument {
                argument: arg.into_owned(),
            });
        }
        argument_list.push(format!("'\"{}\"'", arg.replace('\'', "''")));
    }
    let script = format!(
        "Start-Process -FilePath '{}' -ArgumentList @({}) -Verb RunAs -WindowStyle Hidden -Wait",
        program.display().to_string().replace('\'', "''"),
        argument_list.join(",")
    );

    let mut cmd = Command::new("powershell");
    cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    cmd.hide_window();
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::Path;

    use super::{HideWindow, elevated_command};

    #[test]
    fn std_command_hide_window_is_chainable() {
        let mut cmd = std::process::Command::new("echo");
        let before = &mut cmd as *mut std::process::Command;
        let after = cmd.hide_window() as *mut std::process::Command;
        assert_eq!(before, after);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn elevated_command_wraps_program_with_pkexec() {
        let args = vec![OsString::from("--pid"), OsString::from("42")];
        let cmd = elevated_command(Path::new("/tmp/helper"), &args)
            .expect("linux elevation should accept plain arguments");

        assert_eq!(cmd.get_program(), "pkexec");
        let forwarded: Vec<_> = cmd.get_args().collect();
        assert_eq!(forwarded, ["/tmp/helper", "--pid", "42"]);
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn elevated_command_quotes_paths_for_osascript() {
        let args = vec![OsString::from("--action-file"), OsString::from("/tmp/a b")];
        let cmd = elevated_command(Path::new("/tmp/helper"), &args)
            .expect("macOS elevation should quote arguments");

        assert_eq!(cmd.get_program(), "osascript");
        let script = cmd
            .get_args()
            .nth(1)
            .expect("script argument should be present")
            .to_string_lossy()
            .into_owned();
        assert!(script.contains("with administrator privileges"));
        assert!(script.contains("'/tmp/a b'"));
    }
}
