use std::{io, path::Path, process::Command};

use tracing::info;

/// Host power operations.
pub trait PowerControl: Send + Sync {
    fn reboot(&self) -> io::Result<()>;
}

pub struct SystemPower;

impl PowerControl for SystemPower {
    fn reboot(&self) -> io::Result<()> {
        info!("Running sudo reboot");
        let status = Command::new("sudo").arg("reboot").status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("reboot exited with {}", status),
            ))
        }
    }
}

/// CPU temperature in degrees Celsius, rounded to one decimal place. The
/// file holds millidegrees.
pub async fn read_cpu_temperature(path: &Path) -> io::Result<f64> {
    let content = tokio::fs::read_to_string(path).await?;
    let millidegrees: f64 = content
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok((millidegrees / 100.0).round() / 10.0)
}
