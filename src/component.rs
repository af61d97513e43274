//! Component identity and the collaborators lifecycle operations run against.

use std::path::{Path, PathBuf};

use crate::action_table::ActionTable;
use crate::config::{self, ConfigSource};
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::fs_ops::HostFs;
use crate::packages::{PackageManager, PackageSource};
use crate::types::ComponentKind;

/// A deployable unit with its own working area and trace namespace.
///
/// Layout under the component root:
///
/// ```text
/// <root>/<kind>/          component working area
/// <root>/<kind>/traces/   trace directory (the uninstall handle)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    kind: ComponentKind,
    distro: String,
    root: PathBuf,
}

impl Component {
    pub fn new(kind: ComponentKind, distro: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            distro: distro.into(),
            root: root.into(),
        }
    }

    /// Build from `default.distro` and `default.root`
    pub fn from_config(kind: ComponentKind, cfg: &dyn ConfigSource) -> Result<Self> {
        Ok(Self::new(
            kind,
            cfg.get("default", "distro")?,
            config::component_root(cfg),
        ))
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn distro(&self) -> &str {
        &self.distro
    }

    pub fn component_dir(&self) -> PathBuf {
        self.root.join(self.kind.to_string())
    }

    pub fn trace_dir(&self) -> PathBuf {
        self.component_dir().join("traces")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Borrowed external collaborators shared by installer, uninstaller, runtime
/// and the admin functions.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub config: &'a dyn ConfigSource,
    pub actions: &'a ActionTable,
    pub executor: &'a dyn CommandExecutor,
    pub packager: &'a dyn PackageManager,
    pub packages: &'a dyn PackageSource,
    pub fs: &'a dyn HostFs,
}
