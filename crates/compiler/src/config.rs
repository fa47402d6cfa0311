//! Compiler configuration
//!
//! Settings for the link step: where the runtime library lives and which C
//! compiler drives assembling and linking. Loadable from a `lama.toml`
//! file; anything not set falls back to a default, with the `LAMA_RUNTIME`
//! environment variable consulted for the runtime directory.
//!
//! ```toml
//! runtime-dir = "/opt/lama/runtime"
//! cc = "gcc"
//! cc-args = ["-no-pie"]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompilerConfig {
    /// Directory containing `runtime.o`.
    pub runtime_dir: Option<PathBuf>,

    /// C compiler used to assemble and link.
    pub cc: Option<String>,

    /// Extra arguments appended to the link command line.
    pub cc_args: Vec<String>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("invalid configuration: {}", e))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    /// Override the runtime directory (builder pattern).
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = Some(dir.into());
        self
    }

    /// Override the C compiler.
    pub fn with_cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = Some(cc.into());
        self
    }

    /// The directory holding `runtime.o`: explicit setting, then the
    /// `LAMA_RUNTIME` environment variable, then `../runtime/`.
    pub fn runtime_dir(&self) -> PathBuf {
        if let Some(dir) = &self.runtime_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("LAMA_RUNTIME") {
            return PathBuf::from(dir);
        }
        PathBuf::from("../runtime/")
    }

    /// The C compiler command.
    pub fn cc(&self) -> &str {
        self.cc.as_deref().unwrap_or("gcc")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::new();
        assert_eq!(config.cc(), "gcc");
        assert!(config.cc_args.is_empty());
    }

    #[test]
    fn test_from_toml() {
        let config = CompilerConfig::from_toml(
            "runtime-dir = \"/opt/lama\"\ncc = \"clang\"\ncc-args = [\"-no-pie\"]\n",
        )
        .unwrap();
        assert_eq!(config.runtime_dir(), PathBuf::from("/opt/lama"));
        assert_eq!(config.cc(), "clang");
        assert_eq!(config.cc_args, vec!["-no-pie"]);
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config = CompilerConfig::from_toml("").unwrap();
        assert_eq!(config.cc(), "gcc");
        assert!(config.cc_args.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(CompilerConfig::from_toml("optimize = true").is_err());
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_runtime_dir("/rt")
            .with_cc("cc");
        assert_eq!(config.runtime_dir(), PathBuf::from("/rt"));
        assert_eq!(config.cc(), "cc");
    }
}
