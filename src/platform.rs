//! Platform detection for selecting the correct bottle

use crate::error::{FastBrewError, Result};
use std::path::PathBuf;
use std::process::Command;

/// macOS codenames newest to oldest, used for bottle fallback when the
/// catalog has no entry for the exact running release.
pub const MACOS_FALLBACK_ORDER: &[&str] = &[
    "tahoe",
    "sequoia",
    "sonoma",
    "ventura",
    "monterey",
    "big_sur",
];

/// Detect the current platform tag for bottle selection
/// (e.g. "arm64_sonoma", "x86_64_linux").
pub fn bottle_tag() -> Result<String> {
    #[cfg(target_os = "linux")]
    {
        let arch = match std::env::consts::ARCH {
            "aarch64" => "arm64",
            "x86_64" => "x86_64",
            other => {
                return Err(FastBrewError::UnsupportedPlatform(format!(
                    "linux architecture {other}"
                )));
            }
        };
        Ok(format!("{arch}_linux"))
    }

    #[cfg(target_os = "macos")]
    {
        let arch = match std::env::consts::ARCH {
            "aarch64" => "arm64",
            "x86_64" => "x86_64",
            other => {
                return Err(FastBrewError::UnsupportedPlatform(format!(
                    "darwin architecture {other}"
                )));
            }
        };
        let name = macos_name(&macos_version()?)?;
        if arch == "arm64" {
            Ok(format!("arm64_{name}"))
        } else {
            Ok(name.to_string())
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(FastBrewError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ))
    }
}

/// Fallback candidates for a platform tag, ordered newest first.
/// `arm64_*` tags fall back only within the `arm64_*` family and bare
/// tags within the bare family; the universal "all" tag is handled by
/// the caller.
pub fn fallback_tags(platform: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    if let Some(version) = platform.strip_prefix("arm64_") {
        if let Some(pos) = MACOS_FALLBACK_ORDER.iter().position(|v| *v == version) {
            for older in &MACOS_FALLBACK_ORDER[pos + 1..] {
                candidates.push(format!("arm64_{older}"));
            }
        }
    } else if let Some(pos) = MACOS_FALLBACK_ORDER.iter().position(|v| *v == platform) {
        for older in &MACOS_FALLBACK_ORDER[pos + 1..] {
            candidates.push((*older).to_string());
        }
    }

    candidates
}

/// Detect the Homebrew prefix on this system.
///
/// Discovery order:
/// 1. `HOMEBREW_PREFIX` environment variable
/// 2. `/home/linuxbrew/.linuxbrew`
/// 3. `/opt/homebrew`
/// 4. `/usr/local` (only when it already contains a Cellar)
/// 5. `brew --prefix` shell-out as a last resort
pub fn detect_prefix() -> PathBuf {
    if let Ok(prefix) = std::env::var("HOMEBREW_PREFIX") {
        if !prefix.is_empty() {
            return PathBuf::from(prefix);
        }
    }

    for candidate in ["/home/linuxbrew/.linuxbrew", "/opt/homebrew"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return path;
        }
    }

    if PathBuf::from("/usr/local/Cellar").exists() {
        return PathBuf::from("/usr/local");
    }

    if let Ok(output) = Command::new("brew").arg("--prefix").output() {
        if output.status.success() {
            if let Ok(prefix) = String::from_utf8(output.stdout) {
                let prefix = prefix.trim();
                if !prefix.is_empty() {
                    return PathBuf::from(prefix);
                }
            }
        }
    }

    PathBuf::from("/usr/local")
}

#[cfg(target_os = "macos")]
fn macos_version() -> Result<String> {
    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .map_err(|e| FastBrewError::UnsupportedPlatform(format!("sw_vers failed: {e}")))?;

    String::from_utf8(output.stdout)
        .map(|v| v.trim().to_string())
        .map_err(|_| FastBrewError::UnsupportedPlatform("invalid sw_vers output".into()))
}

#[cfg(target_os = "macos")]
fn macos_name(version: &str) -> Result<&'static str> {
    let major = version.split('.').next().unwrap_or_default();

    match major {
        "16" | "15" => Ok("sequoia"),
        "14" => Ok("sonoma"),
        "13" => Ok("ventura"),
        "12" => Ok("monterey"),
        "11" => Ok("big_sur"),
        other => Err(FastBrewError::UnsupportedPlatform(format!(
            "macOS major version {other}"
        ))),
    }
}
