use async_trait::async_trait;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::DeviceAccess;
use crate::config::{Credentials, DeviceProfile};
use crate::error::{Error, Result};
use crate::models::{CommandSet, ConfigText, ConnectionParams};
use crate::utils::{is_cli_error_line, truncate_lines};

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// DeviceAccess over SSH (libssh2). Every call opens its own session and
/// closes it before returning.
#[derive(Debug, Clone)]
pub struct SshDeviceAccess {
    credentials: Credentials,
    profile: DeviceProfile,
    timeout: Option<Duration>,
}

impl SshDeviceAccess {
    pub fn new(credentials: Credentials, profile: DeviceProfile, timeout_secs: Option<u64>) -> Self {
        Self {
            credentials,
            profile,
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    /// Run `f` against a fresh session on a blocking thread
    async fn with_session<T, F>(&self, params: &ConnectionParams, f: F) -> std::result::Result<T, SshError>
    where
        T: Send + 'static,
        F: FnOnce(&ssh2::Session, &DeviceProfile) -> std::result::Result<T, SshError> + Send + 'static,
    {
        let params = params.clone();
        let credentials = self.credentials.clone();
        let profile = self.profile.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let session = ssh_connect(&params.host, params.port, &credentials, timeout)
                .map_err(SshError::Connect)?;
            let result = f(&session, &profile);
            let _ = session.disconnect(None, "done", None);
            result
        })
        .await
        .map_err(|e| SshError::Connect(format!("Task join error: {}", e)))?
    }
}

/// Where an SSH exchange broke: before a usable session existed, or after
enum SshError {
    Connect(String),
    Command(String),
}

impl SshError {
    fn into_fetch_error(self, device: &str) -> Error {
        let message = match self {
            SshError::Connect(m) | SshError::Command(m) => m,
        };
        Error::Connectivity {
            device: device.to_string(),
            message,
        }
    }

    fn into_push_error(self, device: &str) -> Error {
        match self {
            SshError::Connect(message) => Error::Connectivity {
                device: device.to_string(),
                message,
            },
            SshError::Command(message) => Error::PushFailure {
                device: device.to_string(),
                message,
            },
        }
    }
}

#[async_trait]
impl DeviceAccess for SshDeviceAccess {
    async fn fetch_running_config(&self, params: &ConnectionParams) -> Result<ConfigText> {
        tracing::info!("Fetching running config from {} ({})", params.hostname, params.host);
        let output = self
            .with_session(params, |session, profile| {
                exec(session, &profile.fetch_command).map_err(SshError::Command)
            })
            .await
            .map_err(|e| e.into_fetch_error(&params.hostname))?;
        Ok(ConfigText::from_text(&output))
    }

    async fn push_commands(&self, params: &ConnectionParams, commands: &CommandSet) -> Result<String> {
        tracing::info!("Pushing {} commands to {}", commands.len(), params.hostname);
        let commands = commands.commands().to_vec();
        let output = self
            .with_session(params, move |session, profile| {
                let script = config_script(profile, &commands);
                let output = run_interactive(session, &script).map_err(SshError::Command)?;
                reject_cli_errors(&output).map_err(SshError::Command)?;
                Ok(output)
            })
            .await
            .map_err(|e| e.into_push_error(&params.hostname))?;
        tracing::debug!("{} push output:\n{}", params.hostname, truncate_lines(&output, 40));
        Ok(output)
    }

    async fn save_config(&self, params: &ConnectionParams) -> Result<String> {
        tracing::info!("Saving configuration on {}", params.hostname);
        self.with_session(params, |session, profile| {
            let output = exec(session, &profile.save_command).map_err(SshError::Command)?;
            reject_cli_errors(&output).map_err(SshError::Command)?;
            Ok(output)
        })
        .await
        .map_err(|e| e.into_push_error(&params.hostname))
    }
}

/// Create an SSH session and authenticate with password + keyboard-interactive.
/// Returns the authenticated Session. Blocking; `timeout` of `None` waits indefinitely.
fn ssh_connect(
    host: &str,
    port: u16,
    credentials: &Credentials,
    timeout: Option<Duration>,
) -> std::result::Result<ssh2::Session, String> {
    let tcp = match timeout {
        Some(t) => {
            let addr = (host, port)
                .to_socket_addrs()
                .map_err(|e| format!("Invalid address {}:{}: {}", host, port, e))?
                .next()
                .ok_or_else(|| format!("No address for {}:{}", host, port))?;
            let tcp = TcpStream::connect_timeout(&addr, t)
                .map_err(|e| format!("TCP connection failed: {}", e))?;
            tcp.set_read_timeout(Some(t)).ok();
            tcp.set_write_timeout(Some(t)).ok();
            tcp
        }
        None => TcpStream::connect((host, port)).map_err(|e| format!("TCP connection failed: {}", e))?,
    };

    let mut session = ssh2::Session::new()
        .map_err(|e| format!("Failed to create SSH session: {}", e))?;
    session.set_tcp_stream(tcp);
    if let Some(t) = timeout {
        session.set_timeout(t.as_millis().min(u32::MAX as u128) as u32);
    }
    session.handshake()
        .map_err(|e| format!("SSH handshake failed: {}", e))?;

    let user = credentials.username.as_str();
    let pass = credentials.password.expose();

    // Try password auth first
    match session.userauth_password(user, pass) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // Keyboard-interactive is the only method some NOS images offer
    let mut prompter = PasswordPrompt { password: pass.to_string() };
    let _ = session.userauth_keyboard_interactive(user, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        Err("SSH authentication failed: all methods exhausted".to_string())
    }
}

/// Run a single command on an exec channel and return its output
fn exec(session: &ssh2::Session, command: &str) -> std::result::Result<String, String> {
    let mut channel = session.channel_session()
        .map_err(|e| format!("Failed to open channel: {}", e))?;

    channel.exec(command)
        .map_err(|e| format!("Failed to execute command: {}", e))?;

    let mut output = String::new();
    channel.read_to_string(&mut output)
        .map_err(|e| format!("Failed to read output: {}", e))?;

    channel.wait_close()
        .map_err(|e| format!("Failed to close channel: {}", e))?;

    Ok(output)
}

/// Feed a script to an interactive shell (network CLIs need a PTY for
/// configuration mode) and collect everything the device prints
fn run_interactive(session: &ssh2::Session, script: &str) -> std::result::Result<String, String> {
    let mut channel = session.channel_session()
        .map_err(|e| format!("Failed to open channel: {}", e))?;
    channel.request_pty("vt100", None, None)
        .map_err(|e| format!("Failed to request PTY: {}", e))?;
    channel.shell()
        .map_err(|e| format!("Failed to start shell: {}", e))?;

    channel.write_all(script.as_bytes())
        .map_err(|e| format!("Failed to send commands: {}", e))?;
    channel.flush()
        .map_err(|e| format!("Failed to send commands: {}", e))?;
    channel.send_eof()
        .map_err(|e| format!("Failed to send EOF: {}", e))?;

    let mut output = String::new();
    channel.read_to_string(&mut output)
        .map_err(|e| format!("Failed to read output: {}", e))?;
    channel.wait_close()
        .map_err(|e| format!("Failed to close channel: {}", e))?;

    Ok(output)
}

/// Commands wrapped in the profile's configuration-mode enter/exit lines,
/// followed by `exit` to end the shell
fn config_script(profile: &DeviceProfile, commands: &[String]) -> String {
    let mut script = String::new();
    script.push_str(&profile.config_enter);
    script.push('\n');
    for cmd in commands {
        script.push_str(cmd);
        script.push('\n');
    }
    script.push_str(&profile.config_exit);
    script.push('\n');
    script.push_str("exit\n");
    script
}

fn reject_cli_errors(output: &str) -> std::result::Result<(), String> {
    let errors: Vec<&str> = output.lines().filter(|l| is_cli_error_line(l)).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("device rejected commands: {}", errors.join(" | ")))
    }
}
