//! stackctl library
//!
//! Lifecycle management (install, start, stop, uninstall) for host services,
//! built around a durable trace of install-time side effects so uninstall can
//! undo exactly what an install did.

pub mod action_table;
pub mod admin;
pub mod cli;
pub mod component;
pub mod config;
pub mod error;
pub mod executor;
pub mod fs_ops;
pub mod install_state;
pub mod installer;
pub mod packages;
pub mod process_guard;
pub mod runtime;
pub mod template;
pub mod trace;
pub mod types;
pub mod uninstaller;

pub use action_table::{ActionTable, ServiceActions};
pub use admin::{create_db, drop_db};
pub use component::{Collaborators, Component};
pub use config::{ConfigSource, StackConfig};
pub use error::{Result, StackError};
pub use executor::{CommandExecutor, CommandOutput, HostExecutor};
pub use fs_ops::{HostFs, LocalFs};
pub use install_state::{InstallStage, InstallTransitionError, InstallerContext};
pub use installer::DbInstaller;
pub use packages::{
    AptPackageManager, JsonPackageSource, PackageInfo, PackageManager, PackageSet, PackageSource,
};
pub use runtime::{ComponentStatus, DbRuntime};
pub use template::{CommandSpec, CommandTemplate, ParamMap, ResolvedCommand};
pub use trace::{TraceKind, TraceReader, TraceRecord, TraceWriter, TracedPackage};
pub use types::{Action, ComponentKind, Param};
pub use uninstaller::DbUninstaller;
