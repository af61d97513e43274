//! Runtime controller: start/stop of an installed component.
//!
//! Nothing is cached between calls. Each call re-reads the trace to decide
//! whether the component is installed, so a restarted process behaves the same
//! as a long-lived one.

use std::path::PathBuf;

use tracing::info;

use crate::component::{Collaborators, Component};
use crate::config;
use crate::error::{Result, StackError};
use crate::executor::run_checked;
use crate::template::ParamMap;
use crate::trace::{INSTALL_TRACE, TraceReader, TracedPackage};
use crate::types::Action;

/// Snapshot of what the trace says about a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentStatus {
    pub trace_dir: PathBuf,
    pub packages: Vec<TracedPackage>,
    pub dirs: Vec<PathBuf>,
}

impl ComponentStatus {
    pub fn is_installed(&self) -> bool {
        !self.packages.is_empty()
    }
}

pub struct DbRuntime<'a> {
    component: Component,
    deps: Collaborators<'a>,
    tracereader: TraceReader,
}

impl<'a> DbRuntime<'a> {
    pub fn new(component: Component, deps: Collaborators<'a>) -> Self {
        let tracereader = TraceReader::new(component.trace_dir(), INSTALL_TRACE, component.kind());
        Self {
            component,
            deps,
            tracereader,
        }
    }

    pub fn start(&self) -> Result<()> {
        self.run_service_action(Action::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.run_service_action(Action::Stop)
    }

    pub fn status(&self) -> Result<ComponentStatus> {
        Ok(ComponentStatus {
            trace_dir: self.component.trace_dir(),
            packages: self.tracereader.packages_installed(Action::Status)?,
            dirs: self.tracereader.dirs_made(Action::Status)?,
        })
    }

    fn run_service_action(&self, action: Action) -> Result<()> {
        let service_type = config::db_type_label(self.deps.config);
        self.dispatch(action)
            .map_err(|e| e.in_lifecycle(action, &service_type))
    }

    fn dispatch(&self, action: Action) -> Result<()> {
        if self.tracereader.packages_installed(action)?.is_empty() {
            return Err(StackError::NotInstalled {
                action,
                component: self.component.kind(),
            });
        }

        let service_type = config::db_type(self.deps.config)?;
        let actions = self.deps.actions.require(&service_type, action)?;
        let Some(template) = actions.get(action) else {
            info!(%service_type, %action, "no command defined, nothing to do");
            return Ok(());
        };

        let cmd = template.resolve(&ParamMap::new(), true, action, &service_type)?;
        run_checked(self.deps.executor, &cmd, action, &service_type)?;
        info!(%service_type, %action, "service action complete");
        Ok(())
    }
}
