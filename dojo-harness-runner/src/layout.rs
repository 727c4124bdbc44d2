//! Project layout: where the root, the binary under test and the
//! bash-function helper script live.

use dojo_harness_core::{HarnessError, Result};
use std::env;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const DEFAULT_BINARY_NAME: &str = "dojo";
pub const DEFAULT_BASH_FUNCTION_SCRIPT: &str = "test/test-files/test-bash-function.sh";

/// Overrides the discovered project root
pub const ROOT_ENV_VAR: &str = "DOJO_HARNESS_ROOT";
/// Overrides the binary name looked up under `bin/`
pub const BIN_ENV_VAR: &str = "DOJO_HARNESS_BIN";

// Fixed at compile time, so discovery never depends on the current directory.
const SOURCE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
    binary_name: String,
    bash_function_script: PathBuf,
}

impl ProjectLayout {
    /// Project root two directory levels above this crate's source directory.
    pub fn discover() -> Self {
        let root = normalize(&Path::new(SOURCE_DIR).join("..").join(".."));
        debug!(root = %root.display(), "Discovered project root");
        Self::with_root(root)
    }

    /// Layout rooted at `root`. A relative root is resolved against the
    /// current directory once, here.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Ok(Self::with_root(absolutize(root.as_ref())?))
    }

    /// `discover()` unless `DOJO_HARNESS_ROOT` / `DOJO_HARNESS_BIN` say otherwise.
    pub fn from_env() -> Result<Self> {
        let mut layout = match env::var_os(ROOT_ENV_VAR) {
            Some(root) if !root.is_empty() => Self::new(PathBuf::from(root))?,
            _ => Self::discover(),
        };

        if let Ok(name) = env::var(BIN_ENV_VAR) {
            if !name.is_empty() {
                layout = layout.try_with_binary_name(name)?;
            }
        }

        Ok(layout)
    }

    fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            bash_function_script: PathBuf::from(DEFAULT_BASH_FUNCTION_SCRIPT),
        }
    }

    pub fn with_binary_name<S: Into<String>>(mut self, name: S) -> Self {
        self.binary_name = name.into();
        self
    }

    /// Like `with_binary_name`, but rejects names that would leave `bin/`.
    pub fn try_with_binary_name<S: Into<String>>(self, name: S) -> Result<Self> {
        let name = name.into();
        validate_binary_name(&name)?;
        Ok(self.with_binary_name(name))
    }

    /// Script path relative to the project root
    pub fn with_bash_function_script<P: AsRef<Path>>(mut self, script: P) -> Self {
        self.bash_function_script = script.as_ref().to_path_buf();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    pub fn test_dir(&self) -> PathBuf {
        self.root.join("test")
    }

    /// `<root>/bin/<binary name>`. Existence is not checked.
    pub fn executable(&self) -> PathBuf {
        self.locate_executable(&self.binary_name)
    }

    pub fn locate_executable(&self, name: &str) -> PathBuf {
        normalize(&self.root.join("bin").join(name))
    }

    pub fn bash_function_script(&self) -> PathBuf {
        normalize(&self.root.join(&self.bash_function_script))
    }
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self::discover()
    }
}

fn validate_binary_name(name: &str) -> Result<()> {
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(HarnessError::InvalidConfiguration(format!(
            "binary name must be a bare file name, got {:?}",
            name
        )));
    }
    Ok(())
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&env::current_dir()?.join(path)))
    }
}

/// Lexically drop `.` and resolve `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
