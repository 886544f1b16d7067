//! Launch-command allow-list and environment filtering for stdio servers.
//!
//! Commands are never run through a shell. A command is accepted only when
//! its base name, minus one allowed extension, is a known interpreter,
//! package-manager launcher or container runtime. Spawned servers see only
//! allow-listed host variables plus the variables the server entry declares.

use mcpscout_util::path::home_join;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::debug;

/// Executable names a stdio server may be launched with.
pub const ALLOWED_COMMANDS: &[&str] = &[
    // Script runners and language toolchains
    "node", "python", "python3", "deno", "bun", "ruby", "java", "dotnet", "go", "cargo", "php",
    // Package-manager launchers
    "npx", "npm", "pnpm", "pnpx", "yarn", "bunx", "uv", "uvx", "pipx",
    // Container runtimes
    "docker", "podman",
];

/// Host variables forwarded to spawned servers.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "TERM",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TZ",
    "TMPDIR",
    "TEMP",
    "TMP",
    "XDG_CONFIG_HOME",
    "XDG_DATA_HOME",
    "XDG_CACHE_HOME",
    "XDG_RUNTIME_DIR",
    "NODE_PATH",
    "NVM_DIR",
    "NPM_CONFIG_PREFIX",
    "PYTHONPATH",
    "VIRTUAL_ENV",
    "CONDA_PREFIX",
    "UV_CACHE_DIR",
    "CARGO_HOME",
    "RUSTUP_HOME",
    "GOPATH",
    "GOROOT",
    "JAVA_HOME",
    "DOCKER_HOST",
    "DOCKER_CONFIG",
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    // Windows
    "SYSTEMROOT",
    "SYSTEMDRIVE",
    "WINDIR",
    "COMSPEC",
    "PATHEXT",
    "APPDATA",
    "LOCALAPPDATA",
    "PROGRAMDATA",
    "PROGRAMFILES",
    "USERPROFILE",
    "USERNAME",
];

/// Platform conventions that affect command and variable matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    /// Executable suffixes stripped before the allow-list lookup.
    pub fn extensions(&self) -> ExtensionSet {
        match self {
            Platform::Unix => ExtensionSet::UNIX,
            Platform::Windows => ExtensionSet::WINDOWS,
        }
    }

    fn path_separator(&self) -> char {
        match self {
            Platform::Unix => ':',
            Platform::Windows => ';',
        }
    }

    fn case_insensitive_env(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}

/// A set of allowed executable extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionSet {
    pub extensions: &'static [&'static str],
    pub case_insensitive: bool,
}

impl ExtensionSet {
    pub const UNIX: ExtensionSet = ExtensionSet {
        extensions: &[""],
        case_insensitive: false,
    };

    pub const WINDOWS: ExtensionSet = ExtensionSet {
        extensions: &["", ".exe", ".cmd", ".bat"],
        case_insensitive: true,
    };
}

/// Check a launch command against the allow-list.
pub fn validate_command(command: &str, extensions: ExtensionSet) -> bool {
    let command = command.trim();
    if command.is_empty() {
        return false;
    }

    let base = command
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(command);
    if base.is_empty() {
        return false;
    }
    let base = if extensions.case_insensitive {
        base.to_ascii_lowercase()
    } else {
        base.to_string()
    };

    extensions.extensions.iter().any(|ext| {
        let stem = if ext.is_empty() {
            Some(base.as_str())
        } else {
            base.strip_suffix(ext)
        };
        stem.is_some_and(|stem| ALLOWED_COMMANDS.contains(&stem))
    })
}

/// The environment handed to a spawned stdio server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeEnvironment {
    vars: BTreeMap<String, String>,
}

impl SafeEnvironment {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.vars.keys()
    }
}

/// Build the environment for a server from the current process environment.
pub fn build_safe_environment(overrides: &HashMap<String, String>) -> SafeEnvironment {
    let host = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    build_safe_environment_from(host, overrides, Platform::host())
}

/// Build the environment from an explicit host environment.
///
/// Host variables outside [`ALLOWED_ENV_VARS`] are dropped, `PATH` gains the
/// usual user tool directories, and `overrides` are applied last.
pub fn build_safe_environment_from<I>(
    host: I,
    overrides: &HashMap<String, String>,
    platform: Platform,
) -> SafeEnvironment
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut vars = BTreeMap::new();
    let mut path_key: Option<String> = None;

    for (key, value) in host {
        let allowed = if platform.case_insensitive_env() {
            ALLOWED_ENV_VARS
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&key))
        } else {
            ALLOWED_ENV_VARS.contains(&key.as_str())
        };
        if !allowed {
            continue;
        }
        if key.eq_ignore_ascii_case("PATH") && (platform.case_insensitive_env() || key == "PATH") {
            path_key = Some(key.clone());
        }
        vars.insert(key, value);
    }

    let path_key = path_key.unwrap_or_else(|| "PATH".to_string());
    let current = vars.get(&path_key).cloned().unwrap_or_default();
    let augmented = augment_path(&current, &user_tool_dirs(platform), platform);
    if !augmented.is_empty() {
        vars.insert(path_key, augmented);
    }

    for (key, value) in overrides {
        vars.insert(key.clone(), value.clone());
    }

    debug!(
        forwarded = vars.len(),
        overrides = overrides.len(),
        "Built server environment"
    );
    SafeEnvironment { vars }
}

/// Directories where user-installed launchers usually live.
fn user_tool_dirs(platform: Platform) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    match platform {
        Platform::Unix => {
            dirs.push(PathBuf::from("/usr/local/bin"));
            dirs.push(PathBuf::from("/opt/homebrew/bin"));
            for segments in [
                &[".local", "bin"][..],
                &[".cargo", "bin"][..],
                &[".bun", "bin"][..],
                &[".deno", "bin"][..],
                &[".volta", "bin"][..],
            ] {
                dirs.extend(home_join(segments));
            }
        }
        Platform::Windows => {
            for segments in [
                &["AppData", "Roaming", "npm"][..],
                &[".cargo", "bin"][..],
                &[".bun", "bin"][..],
                &[".local", "bin"][..],
            ] {
                dirs.extend(home_join(segments));
            }
        }
    }
    dirs
}

/// Append `extra` directories that are not already on `current`.
fn augment_path(current: &str, extra: &[PathBuf], platform: Platform) -> String {
    let sep = platform.path_separator();
    let mut entries: Vec<String> = current
        .split(sep)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    for dir in extra {
        let dir = dir.to_string_lossy().into_owned();
        let present = entries.iter().any(|e| match platform {
            Platform::Windows => e.eq_ignore_ascii_case(&dir),
            Platform::Unix => *e == dir,
        });
        if !present {
            entries.push(dir);
        }
    }

    entries.join(&sep.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_allowed_commands_validate() {
        for cmd in ["node", "npx", "uvx", "python3", "docker", "/usr/local/bin/node"] {
            assert!(validate_command(cmd, ExtensionSet::UNIX), "{cmd} should pass");
        }
    }

    #[test]
    fn test_disallowed_commands_rejected() {
        for cmd in [
            "",
            "   ",
            "bash",
            "sh",
            "/bin/sh",
            "/usr/local/bin/evil-binary",
            "node.exe",
            "npx; rm -rf /",
            "/usr/bin/",
        ] {
            assert!(!validate_command(cmd, ExtensionSet::UNIX), "{cmd:?} should fail");
        }
    }

    #[test]
    fn test_windows_extensions_case_insensitive() {
        assert!(validate_command("NPX.CMD", ExtensionSet::WINDOWS));
        assert!(validate_command(r"C:\Program Files\nodejs\node.exe", ExtensionSet::WINDOWS));
        assert!(validate_command("uvx.bat", ExtensionSet::WINDOWS));
        assert!(!validate_command("node.ps1", ExtensionSet::WINDOWS));
        assert!(!validate_command("cmd.exe", ExtensionSet::WINDOWS));
    }

    #[test]
    fn test_unix_is_case_sensitive() {
        assert!(!validate_command("NODE", ExtensionSet::UNIX));
    }

    #[test]
    fn test_environment_only_contains_allowed_or_overrides() {
        let overrides = HashMap::from([("API_TOKEN".to_string(), "t".to_string())]);
        let env = build_safe_environment_from(
            host(&[
                ("HOME", "/home/u"),
                ("AWS_SECRET_ACCESS_KEY", "secret"),
                ("GITHUB_TOKEN", "ghp"),
                ("LANG", "C.UTF-8"),
            ]),
            &overrides,
            Platform::Unix,
        );

        for key in env.keys() {
            assert!(
                ALLOWED_ENV_VARS.contains(&key.as_str()) || overrides.contains_key(key),
                "unexpected key {key}"
            );
        }
        assert_eq!(env.get("HOME"), Some("/home/u"));
        assert_eq!(env.get("LANG"), Some("C.UTF-8"));
        assert_eq!(env.get("API_TOKEN"), Some("t"));
        assert!(!env.contains_key("AWS_SECRET_ACCESS_KEY"));
        assert!(!env.contains_key("GITHUB_TOKEN"));
    }

    #[test]
    fn test_overrides_win() {
        let overrides = HashMap::from([("HOME".to_string(), "/srv".to_string())]);
        let env =
            build_safe_environment_from(host(&[("HOME", "/home/u")]), &overrides, Platform::Unix);
        assert_eq!(env.get("HOME"), Some("/srv"));
    }

    #[test]
    fn test_path_is_augmented_once() {
        let env = build_safe_environment_from(
            host(&[("PATH", "/usr/bin:/usr/local/bin")]),
            &HashMap::new(),
            Platform::Unix,
        );
        let path = env.get("PATH").unwrap();
        assert!(path.starts_with("/usr/bin:/usr/local/bin"));
        assert_eq!(path.matches("/usr/local/bin").count(), 1);
        assert!(path.contains("/opt/homebrew/bin"));
    }

    #[test]
    fn test_path_created_when_missing() {
        let env = build_safe_environment_from(Vec::new(), &HashMap::new(), Platform::Unix);
        assert!(env.get("PATH").unwrap().contains("/usr/local/bin"));
    }

    #[test]
    fn test_windows_env_names_case_insensitive() {
        let env = build_safe_environment_from(
            host(&[("Path", r"C:\Windows"), ("SystemRoot", r"C:\Windows"), ("Secret", "x")]),
            &HashMap::new(),
            Platform::Windows,
        );
        assert!(env.get("Path").unwrap().starts_with(r"C:\Windows"));
        assert!(!env.contains_key("PATH"));
        assert!(env.contains_key("SystemRoot"));
        assert!(!env.contains_key("Secret"));
    }

    #[test]
    fn test_host_platform_extensions() {
        let ext = Platform::host().extensions();
        assert!(ext.extensions.contains(&""));
    }
}
