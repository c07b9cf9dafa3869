#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "esverify.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(esverify::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub solver: SolverSection,
    #[serde(default)]
    pub verify: VerifySection,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverSection {
    pub path: Option<String>,
    pub url: Option<String>,
    pub remote: Option<bool>,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifySection {
    pub replay_fuel: Option<u64>,
    pub parallel: Option<bool>,
}

/// Values the command line can set; `None` leaves the file (or default) value.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub z3path: Option<String>,
    pub z3url: Option<String>,
    pub remote: bool,
}

/// Effective settings after merging defaults, `esverify.toml` and flags.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub z3path: String,
    pub z3url: Option<String>,
    pub remote: bool,
    pub timeout: Duration,
    pub replay_fuel: u64,
    pub parallel: bool,
    pub config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let opts = esverify_verify::VerifyOptions::default();
        Self {
            z3path: "z3".to_string(),
            z3url: None,
            remote: false,
            timeout: opts.timeout,
            replay_fuel: opts.replay_fuel,
            parallel: opts.parallel,
            config_path: None,
        }
    }
}

impl Settings {
    pub fn resolve(
        file: Option<(PathBuf, ConfigFile)>,
        cli: &Overrides,
    ) -> Result<Self, ConfigError> {
        let mut out = Settings::default();
        if let Some((path, file)) = file {
            if let Some(p) = file.solver.path {
                out.z3path = p;
            }
            out.z3url = file.solver.url;
            out.remote = file.solver.remote.unwrap_or(false);
            if let Some(secs) = file.solver.timeout_secs {
                if secs == 0 {
                    return Err(ConfigError {
                        message: format!("{}: timeout_secs must be positive", path.display()),
                    });
                }
                out.timeout = Duration::from_secs(secs);
            }
            if let Some(fuel) = file.verify.replay_fuel {
                out.replay_fuel = fuel;
            }
            if let Some(parallel) = file.verify.parallel {
                out.parallel = parallel;
            }
            out.config_path = Some(path);
        }

        if let Some(p) = &cli.z3path {
            out.z3path = p.clone();
        }
        if let Some(u) = &cli.z3url {
            out.z3url = Some(u.clone());
        }
        out.remote |= cli.remote;

        if out.remote && out.z3url.is_none() {
            return Err(ConfigError {
                message: "remote solving needs a URL (--z3url or [solver] url)".to_string(),
            });
        }
        Ok(out)
    }

    pub fn verify_options(&self) -> esverify_verify::VerifyOptions {
        esverify_verify::VerifyOptions {
            timeout: self.timeout,
            replay_fuel: self.replay_fuel,
            parallel: self.parallel,
        }
    }
}

/// `esverify.toml` next to the input file, else in `cwd`.
pub fn find_config(input: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    let beside = input
        .and_then(Path::parent)
        .map(|dir| dir.join(CONFIG_FILE))
        .filter(|p| p.is_file());
    beside.or_else(|| Some(cwd.join(CONFIG_FILE)).filter(|p| p.is_file()))
}

pub fn parse_config(raw: &str, path: &Path) -> Result<ConfigFile, ConfigError> {
    toml::from_str(raw).map_err(|e| ConfigError {
        message: format!("failed to parse {}: {e}", path.display()),
    })
}

pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_config(&raw, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(raw: &str) -> ConfigFile {
        parse_config(raw, Path::new("esverify.toml")).unwrap()
    }

    #[test]
    fn empty_file_keeps_defaults() {
        let s = Settings::resolve(Some((PathBuf::from("esverify.toml"), file(""))), &Overrides::default()).unwrap();
        assert_eq!(s.z3path, "z3");
        assert!(!s.remote);
        assert_eq!(s.timeout, Duration::from_secs(10));
        assert!(s.parallel);
    }

    #[test]
    fn file_values_apply_and_flags_win() {
        let cfg = file(
            "[solver]\npath = \"/opt/z3/bin/z3\"\ntimeout_secs = 3\n\n[verify]\nreplay_fuel = 500\nparallel = false\n",
        );
        let s = Settings::resolve(Some((PathBuf::from("esverify.toml"), cfg.clone())), &Overrides::default()).unwrap();
        assert_eq!(s.z3path, "/opt/z3/bin/z3");
        assert_eq!(s.timeout, Duration::from_secs(3));
        assert_eq!(s.replay_fuel, 500);
        assert!(!s.parallel);

        let cli = Overrides {
            z3path: Some("./z3".to_string()),
            ..Overrides::default()
        };
        let s = Settings::resolve(Some((PathBuf::from("esverify.toml"), cfg)), &cli).unwrap();
        assert_eq!(s.z3path, "./z3");
    }

    #[test]
    fn remote_needs_a_url() {
        let cli = Overrides {
            remote: true,
            ..Overrides::default()
        };
        assert!(Settings::resolve(None, &cli).is_err());
        let cli = Overrides {
            remote: true,
            z3url: Some("http://localhost:8000/z3".to_string()),
            ..Overrides::default()
        };
        let s = Settings::resolve(None, &cli).unwrap();
        assert!(s.remote);
    }

    #[test]
    fn unknown_keys_and_zero_timeouts_are_rejected() {
        assert!(parse_config("[solver]\nz3 = 1\n", Path::new("esverify.toml")).is_err());
        let cfg = file("[solver]\ntimeout_secs = 0\n");
        assert!(Settings::resolve(Some((PathBuf::from("esverify.toml"), cfg)), &Overrides::default()).is_err());
    }

    #[test]
    fn config_beside_the_input_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let input = dir.path().join("max.js");
        fs::write(&input, "").unwrap();
        assert_eq!(find_config(Some(&input), cwd.path()), None);

        fs::write(cwd.path().join(CONFIG_FILE), "").unwrap();
        assert_eq!(find_config(Some(&input), cwd.path()), Some(cwd.path().join(CONFIG_FILE)));
        assert_eq!(find_config(None, cwd.path()), Some(cwd.path().join(CONFIG_FILE)));

        fs::write(dir.path().join(CONFIG_FILE), "[verify]\nreplay_fuel = 7\n").unwrap();
        let found = find_config(Some(&input), cwd.path()).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE));
        assert_eq!(load_config(&found).unwrap().verify.replay_fuel, Some(7));
    }
}
