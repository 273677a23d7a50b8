//! Host facts injected into the prompt (OS, architecture, platform version).
//!
//! Read-only and best-effort: a sub-probe that fails is left out. Facts come from
//! compile-time constants and well-known files; no process is spawned here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

const MACOS_VERSION_PLIST: &str = "/System/Library/CoreServices/SystemVersion.plist";
const OS_RELEASE: &str = "/etc/os-release";
const KERNEL_OSRELEASE: &str = "/proc/sys/kernel/osrelease";

/// Fact name -> value, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SystemInfo(BTreeMap<String, String>);

impl SystemInfo {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.0.insert(key.to_string(), value.trim().to_string());
        }
    }

    /// One-line summary for the prompt, e.g. `Current system: linux x86_64, Ubuntu 22.04.4 LTS 22.04`.
    pub fn context_line(&self) -> String {
        let mut line = format!(
            "Current system: {} {}",
            self.get("os").unwrap_or("unknown"),
            self.get("arch").unwrap_or("unknown")
        );
        let platform = self.get("platform_name").or_else(|| match self.get("os") {
            Some("macos") => Some("macOS"),
            _ => None,
        });
        match (platform, self.get("platform_version")) {
            (Some(p), Some(v)) => line.push_str(&format!(", {} {}", p, v)),
            (Some(p), None) => line.push_str(&format!(", {}", p)),
            (None, Some(v)) => line.push_str(&format!(", version {}", v)),
            (None, None) => {}
        }
        line
    }
}

/// Collects [`SystemInfo`]. File locations are fields so tests can point at fixtures.
#[derive(Debug, Clone)]
pub struct SystemInfoProbe {
    macos_plist: PathBuf,
    os_release: PathBuf,
    kernel_osrelease: PathBuf,
}

impl Default for SystemInfoProbe {
    fn default() -> Self {
        Self {
            macos_plist: PathBuf::from(MACOS_VERSION_PLIST),
            os_release: PathBuf::from(OS_RELEASE),
            kernel_osrelease: PathBuf::from(KERNEL_OSRELEASE),
        }
    }
}

impl SystemInfoProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> SystemInfo {
        let mut info = SystemInfo::default();
        info.insert("os", std::env::consts::OS);
        info.insert("arch", std::env::consts::ARCH);
        info.insert("family", std::env::consts::FAMILY);
        info.insert("version", env!("CARGO_PKG_VERSION"));

        match std::env::consts::OS {
            "macos" => {
                if let Some(v) = read_to_string(&self.macos_plist)
                    .and_then(|s| plist_string_value(&s, "ProductVersion"))
                {
                    info.insert("platform_version", v);
                }
            }
            "linux" => {
                if let Some(s) = read_to_string(&self.os_release) {
                    let fields = parse_os_release(&s);
                    if let Some(v) = fields.get("VERSION_ID") {
                        info.insert("platform_version", v.as_str());
                    }
                    if let Some(n) = fields.get("PRETTY_NAME").or_else(|| fields.get("NAME")) {
                        info.insert("platform_name", n.as_str());
                    }
                }
                if let Some(k) = read_to_string(&self.kernel_osrelease) {
                    info.insert("kernel_version", k);
                }
            }
            _ => {}
        }
        log::debug!("sysinfo: {:?}", info);
        info
    }
}

fn read_to_string(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Some(s),
        Err(e) => {
            log::debug!("sysinfo: skipping {}: {}", path.display(), e);
            None
        }
    }
}

/// Value of `<key>KEY</key><string>VALUE</string>` in an XML property list.
fn plist_string_value(xml: &str, key: &str) -> Option<String> {
    let marker = format!("<key>{}</key>", key);
    let rest = &xml[xml.find(&marker)? + marker.len()..];
    let start = rest.find("<string>")? + "<string>".len();
    let end = rest[start..].find("</string>")? + start;
    let value = rest[start..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// `KEY=value` / `KEY="value"` lines of os-release(5).
fn parse_os_release(s: &str) -> BTreeMap<String, String> {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_string(),
                v.trim().trim_matches('"').trim_matches('\'').to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_files_probe() -> SystemInfoProbe {
        let nowhere = std::env::temp_dir().join("sysagent-sysinfo-missing");
        SystemInfoProbe {
            macos_plist: nowhere.join("SystemVersion.plist"),
            os_release: nowhere.join("os-release"),
            kernel_osrelease: nowhere.join("osrelease"),
        }
    }

    #[test]
    fn required_facts_always_present() {
        let info = SystemInfoProbe::new().probe();
        for key in ["os", "arch", "version"] {
            assert!(info.contains(key), "missing {}", key);
        }
        assert_eq!(info.get("os"), Some(std::env::consts::OS));
    }

    #[test]
    fn failed_sub_probes_are_omitted() {
        let info = missing_files_probe().probe();
        assert!(info.contains("os"));
        assert!(!info.contains("platform_version"));
        assert!(!info.contains("kernel_version"));
    }

    #[test]
    fn plist_value_extraction() {
        let xml = r#"<dict>
	<key>ProductName</key>
	<string>macOS</string>
	<key>ProductVersion</key>
	<string>14.4.1</string>
</dict>"#;
        assert_eq!(plist_string_value(xml, "ProductVersion").as_deref(), Some("14.4.1"));
        assert_eq!(plist_string_value(xml, "BuildVersion"), None);
    }

    #[test]
    fn os_release_parsing() {
        let s = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\n# comment\nPRETTY_NAME=\"Ubuntu 22.04.4 LTS\"\n";
        let f = parse_os_release(s);
        assert_eq!(f.get("VERSION_ID").map(String::as_str), Some("22.04"));
        assert_eq!(f.get("PRETTY_NAME").map(String::as_str), Some("Ubuntu 22.04.4 LTS"));
    }

    #[test]
    fn context_line_includes_platform_when_known() {
        let mut info = SystemInfo::default();
        info.insert("os", "linux");
        info.insert("arch", "x86_64");
        assert_eq!(info.context_line(), "Current system: linux x86_64");
        info.insert("platform_name", "Ubuntu 22.04.4 LTS");
        info.insert("platform_version", "22.04");
        assert_eq!(
            info.context_line(),
            "Current system: linux x86_64, Ubuntu 22.04.4 LTS 22.04"
        );
    }
}
