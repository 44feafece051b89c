use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use netops_core::config::DevicesConfig;
use netops_core::{Credentials, DeviceError, DeviceTarget, SessionFailureKind};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use ssh2::{Channel, ErrorCode, Session};
use tracing::debug;

const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const READ_CHUNK: usize = 8 * 1024;

/// Opens authenticated management sessions. Blocking; call from a worker thread.
pub trait SessionConnector: Send + Sync {
    fn open(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn DeviceSession>, DeviceError>;
}

/// An interactive CLI session on one device.
pub trait DeviceSession: Send {
    /// Elevates to privileged mode.
    fn enable(&mut self) -> Result<(), DeviceError>;

    /// Runs one exec-mode command and returns its output without echo or prompt.
    fn send_command(&mut self, command: &str) -> Result<String, DeviceError>;

    /// Enters configuration mode, applies `commands` in order and leaves it again.
    fn send_config_set(&mut self, commands: &[String]) -> Result<String, DeviceError>;

    /// Saves the running configuration, answering the destination prompt.
    fn save_config(&mut self) -> Result<String, DeviceError>;
}

#[derive(Clone, Debug)]
pub struct SshConnector {
    connect_timeout: Duration,
    session_timeout: Duration,
}

impl SshConnector {
    pub fn new(config: &DevicesConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            session_timeout: Duration::from_secs(config.session_timeout_secs),
        }
    }
}

impl SessionConnector for SshConnector {
    fn open(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn DeviceSession>, DeviceError> {
        let device = target.address.as_str();
        let stream = TcpStream::connect_timeout(&target.socket, self.connect_timeout)
            .map_err(|error| io_failure(device, SessionFailureKind::Connect, &error))?;

        let mut session = Session::new()
            .map_err(|error| ssh_failure(device, SessionFailureKind::Protocol, &error))?;
        session.set_tcp_stream(stream);
        session.set_timeout(millis(self.session_timeout));
        session
            .handshake()
            .map_err(|error| ssh_failure(device, SessionFailureKind::Protocol, &error))?;
        session
            .userauth_password(&credentials.username, credentials.password.expose_secret())
            .map_err(|error| ssh_failure(device, SessionFailureKind::Authentication, &error))?;
        if !session.authenticated() {
            return Err(DeviceError::session(
                device,
                SessionFailureKind::Authentication,
                "server did not accept the credentials",
            ));
        }

        let mut channel = session
            .channel_session()
            .map_err(|error| ssh_failure(device, SessionFailureKind::Protocol, &error))?;
        channel
            .request_pty("vt100", None, Some((511, 24, 0, 0)))
            .map_err(|error| ssh_failure(device, SessionFailureKind::Protocol, &error))?;
        channel.shell().map_err(|error| ssh_failure(device, SessionFailureKind::Protocol, &error))?;

        let mut shell = SshDeviceSession {
            _session: session,
            channel,
            device: device.to_owned(),
            secret: credentials.password.clone(),
            read_timeout: self.session_timeout,
            prompt: prompt_pattern()?,
        };
        shell.read_until_prompt()?;
        shell.send_command("terminal length 0")?;
        debug!(event_name = "devices.session.opened", device);
        Ok(Box::new(shell))
    }
}

struct SshDeviceSession {
    // Keeps the transport alive for as long as the channel is in use.
    _session: Session,
    channel: Channel,
    device: String,
    secret: SecretString,
    read_timeout: Duration,
    prompt: Regex,
}

impl SshDeviceSession {
    fn write_line(&mut self, line: &str) -> Result<(), DeviceError> {
        let mut payload = line.as_bytes().to_vec();
        payload.push(b'\n');
        self.channel
            .write_all(&payload)
            .and_then(|_| self.channel.flush())
            .map_err(|error| io_failure(&self.device, SessionFailureKind::Protocol, &error))
    }

    fn read_until_prompt(&mut self) -> Result<String, DeviceError> {
        self.read_until(|session, buffer| session.prompt.is_match(last_line(buffer)))
    }

    fn read_until<F>(&mut self, mut done: F) -> Result<String, DeviceError>
    where
        F: FnMut(&Self, &str) -> bool,
    {
        let deadline = Instant::now() + self.read_timeout;
        let mut buffer = String::new();
        let mut chunk = [0_u8; READ_CHUNK];

        loop {
            if Instant::now() >= deadline {
                return Err(DeviceError::session(
                    &self.device,
                    SessionFailureKind::Timeout,
                    format!("no prompt within {}s", self.read_timeout.as_secs()),
                ));
            }
            match self.channel.read(&mut chunk) {
                Ok(0) => {
                    return Err(DeviceError::session(
                        &self.device,
                        SessionFailureKind::Protocol,
                        "channel closed by device",
                    ));
                }
                Ok(read) => {
                    buffer.push_str(&String::from_utf8_lossy(&chunk[..read]).replace('\r', ""));
                    if done(self, &buffer) {
                        return Ok(buffer);
                    }
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) if matches!(error.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Err(io_failure(&self.device, SessionFailureKind::Timeout, &error));
                }
                Err(error) => {
                    return Err(io_failure(&self.device, SessionFailureKind::Protocol, &error));
                }
            }
        }
    }
}

impl DeviceSession for SshDeviceSession {
    fn enable(&mut self) -> Result<(), DeviceError> {
        self.write_line("")?;
        let current = self.read_until_prompt()?;
        if last_line(&current).trim_end().ends_with('#') {
            return Ok(());
        }

        self.write_line("enable")?;
        let reply = self.read_until(|session, buffer| {
            let line = last_line(buffer);
            line.trim_end().ends_with("assword:") || session.prompt.is_match(line)
        })?;
        let reply = if last_line(&reply).trim_end().ends_with("assword:") {
            let secret = self.secret.expose_secret().to_owned();
            self.write_line(&secret)?;
            self.read_until_prompt()?
        } else {
            reply
        };

        if last_line(&reply).trim_end().ends_with('#') {
            Ok(())
        } else {
            Err(DeviceError::session(
                &self.device,
                SessionFailureKind::Authentication,
                "could not enter privileged mode",
            ))
        }
    }

    fn send_command(&mut self, command: &str) -> Result<String, DeviceError> {
        self.write_line(command)?;
        let raw = self.read_until_prompt()?;
        Ok(strip_echo_and_prompt(&raw, command))
    }

    fn send_config_set(&mut self, commands: &[String]) -> Result<String, DeviceError> {
        let mut transcript = String::new();
        self.write_line("configure terminal")?;
        transcript.push_str(&self.read_until_prompt()?);
        for command in commands {
            self.write_line(command)?;
            transcript.push_str(&self.read_until_prompt()?);
        }
        self.write_line("end")?;
        transcript.push_str(&self.read_until_prompt()?);
        Ok(transcript)
    }

    fn save_config(&mut self) -> Result<String, DeviceError> {
        self.write_line("copy run start")?;
        let mut transcript = self.read_until(|session, buffer| {
            let line = last_line(buffer).trim_end();
            line.ends_with("]?") || session.prompt.is_match(line)
        })?;
        if last_line(&transcript).trim_end().ends_with("]?") {
            self.write_line("")?;
            transcript.push_str(&self.read_until_prompt()?);
        }
        Ok(transcript)
    }
}

fn prompt_pattern() -> Result<Regex, DeviceError> {
    Regex::new(r"^[\w.\-:/@()]+[>#]\s*$").map_err(|error| {
        DeviceError::session("-", SessionFailureKind::Protocol, format!("prompt pattern: {error}"))
    })
}

fn last_line(buffer: &str) -> &str {
    buffer.rsplit('\n').next().unwrap_or_default()
}

/// Drops the echoed command line and the trailing prompt line.
pub fn strip_echo_and_prompt(raw: &str, command: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.first().map(|line| line.trim_end().ends_with(command.trim())).unwrap_or(false) {
        lines.remove(0);
    }
    if lines.last().map(|line| line.trim_end().ends_with(['#', '>'])).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

fn ssh_failure(device: &str, kind: SessionFailureKind, error: &ssh2::Error) -> DeviceError {
    let kind = match error.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => SessionFailureKind::Timeout,
        _ => kind,
    };
    DeviceError::session(device, kind, error.message())
}

fn io_failure(device: &str, kind: SessionFailureKind, error: &std::io::Error) -> DeviceError {
    let kind = match error.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => SessionFailureKind::Timeout,
        _ => kind,
    };
    DeviceError::session(device, kind, error.to_string())
}
