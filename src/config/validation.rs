use super::defaults::{
    default_project_root, MAX_EXEC_ARGS, MAX_EXEC_TIMEOUT_MS, MAX_TICK_MS, MIN_TICK_MS,
};
use super::HostConfig;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path};

impl HostConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if self.command_port == 0 {
            bail!("--command-port must be between 1 and 65535");
        }
        if !(MIN_TICK_MS..=MAX_TICK_MS).contains(&self.tick_ms) {
            bail!(
                "--tick-ms must be between {MIN_TICK_MS} and {MAX_TICK_MS}, got {}",
                self.tick_ms
            );
        }
        if self.exec_timeout_ms == 0 || self.exec_timeout_ms > MAX_EXEC_TIMEOUT_MS {
            bail!(
                "--exec-timeout-ms must be between 1 and {MAX_EXEC_TIMEOUT_MS}, got {}",
                self.exec_timeout_ms
            );
        }
        if self.exec_args.len() > MAX_EXEC_ARGS {
            bail!(
                "--exec-arg repeated too many times (max {MAX_EXEC_ARGS}, got {})",
                self.exec_args.len()
            );
        }
        if !is_valid_package_name(&self.package_name) {
            bail!(
                "--package-name must be a plain directory name, got '{}'",
                self.package_name
            );
        }

        self.exec_cmd = sanitize_binary(&self.exec_cmd, "--exec-cmd")?;
        if let Some(fallback) = &self.fallback_interpreter {
            self.fallback_interpreter = Some(sanitize_binary(fallback, "--fallback-interpreter")?);
        }

        let root = self
            .project_root
            .clone()
            .unwrap_or_else(default_project_root);
        let canonical = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize project root '{}'", root.display()))?;
        if !canonical.is_dir() {
            bail!("project root '{}' is not a directory", canonical.display());
        }
        self.project_root = Some(canonical);
        Ok(())
    }
}

pub(super) fn is_valid_package_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && trimmed == name
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

/// Allow a bare program name (resolved on `PATH` at spawn time) or an existing executable path.
pub(super) fn sanitize_binary(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if trimmed.chars().any(|ch| ch.is_control()) {
        bail!("{flag} must not contain control characters");
    }

    let path = Path::new(trimmed);
    if !(path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR)) {
        return Ok(trimmed.to_string());
    }

    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
    let metadata = fs::metadata(&canonical)
        .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
    if !metadata.is_file() {
        bail!("{flag} '{}' is not a file", canonical.display());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            bail!(
                "{flag} '{}' exists but is not executable (mode {:o})",
                canonical.display(),
                mode
            );
        }
    }
    canonical
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"))
}
