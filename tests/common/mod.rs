//! Recording fake collaborators shared by the integration tests.
//!
//! Every fake pushes a line into one shared `Journal`, so tests can assert both
//! what was called and in which order.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use stackctl::{
    ActionTable, Collaborators, CommandExecutor, CommandOutput, ComponentKind, HostFs, PackageInfo,
    PackageManager, PackageSet, PackageSource, ParamMap, ResolvedCommand, StackConfig,
    StackError, TracedPackage,
};

pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn mysql_config(root: &Path) -> StackConfig {
    StackConfig::new()
        .with("default", "distro", "ubuntu")
        .with("default", "root", root.to_string_lossy())
        .with("db", "type", "mysql")
        .with("db", "sql_user", "admin")
        .with("db", "bind_config", root.join("my.cnf").to_string_lossy())
        .with("passwords", "sql", "secret")
}

/// Executor that records every command and reports success unless told to
/// fail commands whose first token matches.
pub struct FakeExecutor {
    pub journal: Journal,
    pub calls: RefCell<Vec<ResolvedCommand>>,
    pub fail_program: Option<String>,
}

impl FakeExecutor {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: Rc::clone(journal),
            calls: RefCell::new(Vec::new()),
            fail_program: None,
        }
    }

    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls.borrow().iter().map(|c| c.argv().to_vec()).collect()
    }
}

impl CommandExecutor for FakeExecutor {
    fn execute(&self, command: &ResolvedCommand) -> io::Result<CommandOutput> {
        self.journal
            .borrow_mut()
            .push(format!("exec {}", command.argv().join(" ")));
        self.calls.borrow_mut().push(command.clone());
        if self.fail_program.as_deref() == command.argv().first().map(String::as_str) {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "boom".to_string(),
                exit_code: Some(1),
                success: false,
            });
        }
        Ok(CommandOutput::ok())
    }
}

#[derive(Default)]
pub struct FakePackager {
    pub journal: Journal,
    pub installed: RefCell<Vec<Vec<String>>>,
    pub removed: RefCell<Vec<Vec<String>>>,
    pub fail_install: bool,
}

impl FakePackager {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: Rc::clone(journal),
            ..Self::default()
        }
    }
}

impl PackageManager for FakePackager {
    fn install_batch(&self, packages: &PackageSet, _params: &ParamMap) -> stackctl::Result<()> {
        let names: Vec<String> = packages.keys().cloned().collect();
        self.journal
            .borrow_mut()
            .push(format!("install {}", names.join(" ")));
        if self.fail_install {
            return Err(StackError::ExecutionFailure {
                action: stackctl::Action::Install,
                service_type: "mysql".into(),
                command: "apt-get install".into(),
                reason: "exit status 100".into(),
            });
        }
        self.installed.borrow_mut().push(names);
        Ok(())
    }

    fn remove_batch(&self, packages: &[TracedPackage]) -> stackctl::Result<()> {
        let names: Vec<String> = packages.iter().map(|p| p.name.clone()).collect();
        self.journal
            .borrow_mut()
            .push(format!("remove {}", names.join(" ")));
        self.removed.borrow_mut().push(names);
        Ok(())
    }
}

pub struct FakePackageSource {
    pub packages: PackageSet,
}

impl FakePackageSource {
    pub fn new<S: Into<String>>(packages: impl IntoIterator<Item = (S, PackageInfo)>) -> Self {
        Self {
            packages: packages
                .into_iter()
                .map(|(name, info)| (name.into(), info))
                .collect(),
        }
    }
}

impl PackageSource for FakePackageSource {
    fn packages(&self, _distro: &str, _component: ComponentKind) -> stackctl::Result<PackageSet> {
        Ok(self.packages.clone())
    }
}

/// Filesystem that creates nothing on disk: `make_dirs` reports a scripted
/// list and files live in memory.
#[derive(Default)]
pub struct FakeFs {
    pub journal: Journal,
    pub created: Vec<PathBuf>,
    pub removed: RefCell<Vec<PathBuf>>,
    pub files: RefCell<BTreeMap<PathBuf, String>>,
}

impl FakeFs {
    pub fn new(journal: &Journal, created: Vec<PathBuf>) -> Self {
        Self {
            journal: Rc::clone(journal),
            created,
            ..Self::default()
        }
    }
}

impl HostFs for FakeFs {
    fn make_dirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.journal
            .borrow_mut()
            .push(format!("mkdirs {}", path.display()));
        Ok(self.created.clone())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.journal
            .borrow_mut()
            .push(format!("rmdir {}", path.display()));
        self.removed.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}

/// Bundle of fakes owned by a test, lent out as `Collaborators`
pub struct Harness {
    pub journal: Journal,
    pub config: StackConfig,
    pub actions: ActionTable,
    pub executor: FakeExecutor,
    pub packager: FakePackager,
    pub source: FakePackageSource,
    pub fs: FakeFs,
}

impl Harness {
    pub fn new<S: Into<String>>(
        root: &Path,
        packages: impl IntoIterator<Item = (S, PackageInfo)>,
    ) -> Self {
        let journal = journal();
        let config = mysql_config(root);
        let fs = FakeFs::new(&journal, Vec::new());
        fs.files.borrow_mut().insert(
            root.join("my.cnf"),
            "[mysqld]\nbind-address = 127.0.0.1\n".to_string(),
        );
        Self {
            executor: FakeExecutor::new(&journal),
            packager: FakePackager::new(&journal),
            source: FakePackageSource::new(packages),
            fs,
            config,
            actions: ActionTable::builtin().expect("builtin table"),
            journal,
        }
    }

    pub fn deps(&self) -> Collaborators<'_> {
        self.deps_with_fs(&self.fs)
    }

    /// Same collaborators but against another filesystem, e.g. `LocalFs`
    pub fn deps_with_fs<'a>(&'a self, fs: &'a dyn HostFs) -> Collaborators<'a> {
        Collaborators {
            config: &self.config,
            actions: &self.actions,
            executor: &self.executor,
            packager: &self.packager,
            packages: &self.source,
            fs,
        }
    }

    pub fn component(&self) -> stackctl::Component {
        stackctl::Component::from_config(ComponentKind::Db, &self.config).expect("component")
    }

    pub fn events(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }
}
