//! Host-OS service control dispatch.
//!
//! FastBrew does not orchestrate daemons itself; it presents a uniform
//! capability set over the platform's service manager (launchd on
//! macOS, systemd user units on Linux) and shells out for the actual
//! work. Selection happens at compile time.

use crate::error::Result;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    Started,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceStatus,
}

pub trait ServiceManager {
    fn list(&self) -> Result<Vec<ServiceInfo>>;
    fn status(&self, name: &str) -> Result<ServiceStatus>;
    fn start(&self, name: &str) -> Result<()>;
    fn stop(&self, name: &str) -> Result<()>;
    fn restart(&self, name: &str) -> Result<()> {
        self.stop(name)?;
        self.start(name)
    }
}

/// The platform's service manager.
pub fn manager() -> Box<dyn ServiceManager> {
    #[cfg(target_os = "macos")]
    {
        Box::new(LaunchdManager)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(SystemdManager)
    }
}

fn run(program: &str, args: &[&str]) -> Result<std::process::Output> {
    Ok(Command::new(program).args(args).output()?)
}

#[cfg(target_os = "macos")]
pub struct LaunchdManager;

#[cfg(target_os = "macos")]
impl LaunchdManager {
    fn label(name: &str) -> String {
        format!("homebrew.mxcl.{name}")
    }
}

#[cfg(target_os = "macos")]
impl ServiceManager for LaunchdManager {
    fn list(&self) -> Result<Vec<ServiceInfo>> {
        let output = run("launchctl", &["list"])?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        Ok(stdout
            .lines()
            .filter_map(|line| {
                let label = line.split_whitespace().nth(2)?;
                let name = label.strip_prefix("homebrew.mxcl.")?;
                Some(ServiceInfo {
                    name: name.to_string(),
                    status: ServiceStatus::Started,
                })
            })
            .collect())
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        let output = run("launchctl", &["list", &Self::label(name)])?;
        if output.status.success() {
            Ok(ServiceStatus::Started)
        } else {
            Ok(ServiceStatus::Stopped)
        }
    }

    fn start(&self, name: &str) -> Result<()> {
        run("brew", &["services", "start", name])?;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        run("brew", &["services", "stop", name])?;
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
pub struct SystemdManager;

#[cfg(not(target_os = "macos"))]
impl SystemdManager {
    fn unit(name: &str) -> String {
        format!("homebrew.{name}.service")
    }
}

#[cfg(not(target_os = "macos"))]
impl ServiceManager for SystemdManager {
    fn list(&self) -> Result<Vec<ServiceInfo>> {
        let output = run(
            "systemctl",
            &["--user", "list-units", "--type=service", "--no-legend", "homebrew.*"],
        )?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        Ok(stdout
            .lines()
            .filter_map(|line| {
                let unit = line.split_whitespace().next()?;
                let name = unit
                    .strip_prefix("homebrew.")?
                    .strip_suffix(".service")?;
                let status = if line.contains(" running ") {
                    ServiceStatus::Started
                } else {
                    ServiceStatus::Stopped
                };
                Some(ServiceInfo {
                    name: name.to_string(),
                    status,
                })
            })
            .collect())
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        let output = run("systemctl", &["--user", "is-active", &Self::unit(name)])?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(match state.as_str() {
            "active" => ServiceStatus::Started,
            "inactive" => ServiceStatus::Stopped,
            other => ServiceStatus::Error(other.to_string()),
        })
    }

    fn start(&self, name: &str) -> Result<()> {
        run("systemctl", &["--user", "start", &Self::unit(name)])?;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        run("systemctl", &["--user", "stop", &Self::unit(name)])?;
        Ok(())
    }
}
