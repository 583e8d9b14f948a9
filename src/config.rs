use anyhow::{Context, Result, bail};
use provider::State;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the default manifest
pub const MANIFEST_ENV: &str = "SWITCHYARD_MANIFEST";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("switchyard"))
}

/// Pick the manifest to load: the explicit path, then `$SWITCHYARD_MANIFEST`,
/// then `~/.config/switchyard/manifest.toml`.
pub fn manifest_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }
    if let Ok(path) = std::env::var(MANIFEST_ENV)
        && !path.trim().is_empty()
    {
        return Ok(expand(&path));
    }
    Ok(config_dir()?.join("manifest.toml"))
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default, rename = "instance")]
    pub instances: Vec<InstanceSpec>,
}

/// Identity reported by `resources`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            description: String::new(),
            version: default_version(),
        }
    }
}

fn default_provider_name() -> String {
    "switchyard".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// `<resource>.<label>`
    pub name: String,
    /// Register frozen: no later update or destroy except at teardown
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub attributes: State,
}

impl InstanceSpec {
    /// Resource type part of the name
    pub fn resource(&self) -> &str {
        self.name.split_once('.').map_or("", |(resource, _)| resource)
    }
}

impl Manifest {
    /// Load a manifest, as JSON for `.json` files and TOML otherwise
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let manifest: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid manifest {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid manifest {}", path.display()))?
        };
        manifest.check()?;
        Ok(manifest)
    }

    /// Names are unique and of the form `<resource>.<label>`
    fn check(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for spec in &self.instances {
            match spec.name.split_once('.') {
                Some((resource, label)) if !resource.is_empty() && !label.is_empty() => {}
                _ => bail!(
                    "Instance name '{}' must have the form <resource>.<label>",
                    spec.name
                ),
            }
            if !seen.insert(spec.name.as_str()) {
                bail!("Instance '{}' is declared more than once", spec.name);
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&InstanceSpec> {
        self.instances.iter().find(|i| i.name == name)
    }
}
