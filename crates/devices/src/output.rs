use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};

pub const GENERAL_OUTPUTS_FILE: &str = "General Outputs.txt";
pub const INVALID_DESTINATIONS_FILE: &str = "invalidDestinations.csv";
pub const FAILED_DEVICES_FILE: &str = "Failed Devices.csv";
pub const CONFIGURED_DEVICES_FILE: &str = "Configured Devices.csv";
pub const HALF_DUPLEX_FILE: &str = "Devices Half Duplex.csv";
pub const FULL_DUPLEX_FILE: &str = "Devices Full Duplex.csv";
pub const ERR_DISABLED_FILE: &str = "Err-Disabled Interfaces.csv";

/// Append-only artifact directory shared by every worker of a batch.
///
/// All writes go through one lock so concurrent workers never interleave
/// lines inside the same file.
#[derive(Debug)]
pub struct OutputStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn append_text(&self, file_name: &str, text: &str) -> io::Result<()> {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(self.path(file_name))?;
        file.write_all(text.as_bytes())?;
        debug!(event_name = "devices.output.appended", file = file_name, bytes = text.len());
        Ok(())
    }

    pub fn append_csv(&self, file_name: &str, fields: &[&str]) -> io::Result<()> {
        let mut row = fields.iter().map(|field| csv_field(field)).collect::<Vec<_>>().join(",");
        row.push('\n');
        self.append_text(file_name, &row)
    }

    /// Records a token that no candidate address answered for.
    pub fn record_invalid(&self, candidates: &[String]) {
        if let Err(error) = self.append_csv(INVALID_DESTINATIONS_FILE, &[&candidates.join(", ")]) {
            warn!(
                event_name = "devices.output.write_failed",
                file = INVALID_DESTINATIONS_FILE,
                error = %error,
                "could not record invalid destination"
            );
        }
    }

    pub fn record_failed(&self, device: &str, username: &str, error: &str) {
        let timestamp = Utc::now().to_rfc3339();
        if let Err(write_error) =
            self.append_csv(FAILED_DEVICES_FILE, &[device, username, error, &timestamp])
        {
            warn!(
                event_name = "devices.output.write_failed",
                file = FAILED_DEVICES_FILE,
                error = %write_error,
                "could not record failed device"
            );
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

/// File-name-safe form of a command, e.g. `show run | inc snmp` -> `show run _ inc snmp`.
pub fn command_slug(command: &str) -> String {
    let slug: String = command
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other if other.is_control() => '_',
            other => other,
        })
        .collect();
    if slug.is_empty() {
        "command".to_owned()
    } else {
        slug
    }
}
