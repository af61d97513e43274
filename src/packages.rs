//! Package-list and package-manager collaborators.
//!
//! A package list maps package name to `PackageInfo` for one (distro,
//! component) pair. Lists are `BTreeMap`s so every consumer walks packages in
//! sorted-name order, which keeps hook execution and trace order reproducible.
//!
//! ```json
//! {
//!   "mysql-server": {
//!     "version": "5.7",
//!     "removable": true,
//!     "pre_install": [
//!       { "cmd": ["debconf-set-selections", "mysql-server/root_password password %PASSWORD%"], "run_as_root": true }
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, StackError};
use crate::executor::{CommandExecutor, run_checked};
use crate::template::{CommandSpec, ParamMap, ResolvedCommand};
use crate::trace::TracedPackage;
use crate::types::{Action, ComponentKind};

fn default_removable() -> bool {
    true
}

/// Descriptor of one package in a package list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_removable")]
    pub removable: bool,
    #[serde(default)]
    pub pre_install: Vec<CommandSpec>,
    #[serde(default)]
    pub post_install: Vec<CommandSpec>,
}

impl PackageInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            removable: true,
            pre_install: Vec::new(),
            post_install: Vec::new(),
        }
    }

    pub fn removable(mut self, removable: bool) -> Self {
        self.removable = removable;
        self
    }
}

impl Default for PackageInfo {
    fn default() -> Self {
        Self::new("")
    }
}

/// Packages keyed (and therefore ordered) by name
pub type PackageSet = BTreeMap<String, PackageInfo>;

pub trait PackageSource {
    fn packages(&self, distro: &str, component: ComponentKind) -> Result<PackageSet>;
}

pub trait PackageManager {
    fn install_batch(&self, packages: &PackageSet, params: &ParamMap) -> Result<()>;

    /// Remove the given traced packages
    fn remove_batch(&self, packages: &[TracedPackage]) -> Result<()>;
}

/// Package lists stored as `<dir>/<distro>/<component>.json`
#[derive(Debug, Clone)]
pub struct JsonPackageSource {
    dir: PathBuf,
}

impl JsonPackageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn list_path(&self, distro: &str, component: ComponentKind) -> PathBuf {
        self.dir.join(distro).join(format!("{component}.json"))
    }
}

impl PackageSource for JsonPackageSource {
    fn packages(&self, distro: &str, component: ComponentKind) -> Result<PackageSet> {
        let path = self.list_path(distro, component);
        let content = fs::read_to_string(&path).map_err(|e| {
            StackError::config(format!("failed to read package list {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            StackError::config(format!("invalid package list {}: {e}", path.display()))
        })
    }
}

/// apt-get backed package manager
#[derive(Debug, Clone)]
pub struct AptPackageManager<E> {
    executor: E,
    service_type: String,
}

impl<E: CommandExecutor> AptPackageManager<E> {
    pub fn new(executor: E, service_type: impl Into<String>) -> Self {
        Self {
            executor,
            service_type: service_type.into(),
        }
    }

    fn apt(&self, verb: &str, targets: impl IntoIterator<Item = String>) -> ResolvedCommand {
        let mut argv: Vec<String> = ["env", "DEBIAN_FRONTEND=noninteractive", "apt-get", verb, "-y", "-q"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        argv.extend(targets);
        ResolvedCommand::new(argv, true)
    }
}

fn install_target(name: &str, info: &PackageInfo) -> String {
    if info.version.is_empty() {
        name.to_string()
    } else {
        format!("{name}={}", info.version)
    }
}

impl<E: CommandExecutor> PackageManager for AptPackageManager<E> {
    fn install_batch(&self, packages: &PackageSet, params: &ParamMap) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        let cmd = self.apt(
            "install",
            packages.iter().map(|(name, info)| install_target(name, info)),
        );
        run_checked(&self.executor, &cmd, Action::Install, &self.service_type)?;

        for (name, info) in packages {
            if info.post_install.is_empty() {
                continue;
            }
            info!(package = %name, "running post-install commands");
            for spec in &info.post_install {
                let cmd = spec.resolve(params, Action::PostInstall, &self.service_type)?;
                run_checked(&self.executor, &cmd, Action::PostInstall, &self.service_type)?;
            }
        }
        Ok(())
    }

    fn remove_batch(&self, packages: &[TracedPackage]) -> Result<()> {
        let mut targets: Vec<String> = Vec::new();
        for pkg in packages {
            if !pkg.removable {
                debug!(package = %pkg.name, "package marked non-removable, keeping");
                continue;
            }
            if !targets.contains(&pkg.name) {
                targets.push(pkg.name.clone());
            }
        }
        if targets.is_empty() {
            return Ok(());
        }
        let cmd = self.apt("purge", targets);
        run_checked(&self.executor, &cmd, Action::Uninstall, &self.service_type)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl CommandExecutor for &Recorder {
        fn execute(&self, command: &ResolvedCommand) -> std::io::Result<CommandOutput> {
            self.calls.borrow_mut().push(command.argv().to_vec());
            Ok(CommandOutput::ok())
        }
    }

    #[test]
    fn test_package_info_defaults() {
        let info: PackageInfo = serde_json::from_str("{}").unwrap();
        assert!(info.removable);
        assert_eq!(info.version, "");
        assert!(info.pre_install.is_empty());
    }

    #[test]
    fn test_json_source_reads_distro_component_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonPackageSource::new(dir.path());
        let path = source.list_path("ubuntu", ComponentKind::Db);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"mysql-server": {"version": "5.7"}, "mysql-client": {}}"#).unwrap();

        let pkgs = source.packages("ubuntu", ComponentKind::Db).unwrap();
        let names: Vec<&String> = pkgs.keys().collect();
        assert_eq!(names, vec!["mysql-client", "mysql-server"]);
    }

    #[test]
    fn test_json_source_missing_list_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonPackageSource::new(dir.path())
            .packages("fedora", ComponentKind::Db)
            .unwrap_err();
        assert!(matches!(err, StackError::Config(_)));
    }

    #[test]
    fn test_apt_install_pins_versions() {
        let recorder = Recorder::default();
        let apt = AptPackageManager::new(&recorder, "mysql");
        let mut pkgs = PackageSet::new();
        pkgs.insert("mysql-server".into(), PackageInfo::new("5.7"));
        pkgs.insert("mysql-client".into(), PackageInfo::default());

        apt.install_batch(&pkgs, &ParamMap::new()).unwrap();

        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0][2..4], ["apt-get", "install"]);
        assert_eq!(&calls[0][6..], ["mysql-client", "mysql-server=5.7"]);
    }

    #[test]
    fn test_apt_remove_skips_non_removable_and_duplicates() {
        let recorder = Recorder::default();
        let apt = AptPackageManager::new(&recorder, "mysql");
        let traced = |name: &str, removable| TracedPackage {
            name: name.into(),
            removable,
            version: String::new(),
        };

        apt.remove_batch(&[traced("a", true), traced("b", false), traced("a", true)])
            .unwrap();

        let calls = recorder.calls.borrow();
        assert_eq!(&calls[0][3..], ["purge", "-y", "-q", "a"]);
    }

    #[test]
    fn test_apt_remove_nothing_removable_runs_nothing() {
        let recorder = Recorder::default();
        let apt = AptPackageManager::new(&recorder, "mysql");
        apt.remove_batch(&[]).unwrap();
        assert!(recorder.calls.borrow().is_empty());
    }
}
