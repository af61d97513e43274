//! Uninstaller: reverses exactly what this component's trace recorded.
//!
//! Nothing outside the trace is ever touched. An empty category is skipped,
//! so running uninstall again after the trace directory is gone is a no-op.

use tracing::info;

use crate::component::{Collaborators, Component};
use crate::config;
use crate::error::{Result, StackError};
use crate::trace::{INSTALL_TRACE, TraceReader};
use crate::types::Action;

pub struct DbUninstaller<'a> {
    component: Component,
    deps: Collaborators<'a>,
    tracereader: TraceReader,
}

impl<'a> DbUninstaller<'a> {
    pub fn new(component: Component, deps: Collaborators<'a>) -> Self {
        let tracereader = TraceReader::new(component.trace_dir(), INSTALL_TRACE, component.kind());
        Self {
            component,
            deps,
            tracereader,
        }
    }

    /// Nothing was configured, so nothing to unconfigure.
    pub fn unconfigure(&self) -> Result<()> {
        Ok(())
    }

    pub fn uninstall(&self) -> Result<()> {
        let service_type = config::db_type_label(self.deps.config);
        self.remove_traced(&service_type)
            .map_err(|e| e.in_lifecycle(Action::Uninstall, &service_type))
    }

    fn remove_traced(&self, service_type: &str) -> Result<()> {
        let pkgs = self.tracereader.packages_installed(Action::Uninstall)?;
        if !pkgs.is_empty() {
            info!(component = %self.component.kind(), count = pkgs.len(), "removing packages");
            self.deps.packager.remove_batch(&pkgs)?;
        }

        let dirs = self.tracereader.dirs_made(Action::Uninstall)?;
        if !dirs.is_empty() {
            info!(component = %self.component.kind(), count = dirs.len(), "removing created directories");
            for dir in &dirs {
                self.deps
                    .fs
                    .remove_dir_all(dir)
                    .map_err(|source| StackError::Filesystem {
                        action: Action::Uninstall,
                        service_type: service_type.to_string(),
                        path: dir.clone(),
                        source,
                    })?;
                info!(path = %dir.display(), "removed directory");
            }
        }
        Ok(())
    }
}
