//! Installer for package-only components.
//!
//! Every side effect that uninstall must undo is appended to the component's
//! trace before the next step starts: one `PACKAGE_INSTALLED` per listed
//! package (whether or not the package manager actually had to install it) and
//! one `DIR_MADE` per directory created. A failure leaves the trace as far as
//! it got and marks the install `Failed`; nothing is rolled back here.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::component::{Collaborators, Component};
use crate::config;
use crate::error::{Result, StackError};
use crate::executor::run_checked;
use crate::install_state::{InstallStage, InstallerContext};
use crate::packages::PackageSet;
use crate::template::ParamMap;
use crate::trace::{INSTALL_TRACE, TraceWriter};
use crate::types::Action;

const LOOPBACK_ADDR: &str = "127.0.0.1";
const WILDCARD_ADDR: &str = "0.0.0.0";

pub struct DbInstaller<'a> {
    component: Component,
    deps: Collaborators<'a>,
    tracewriter: TraceWriter,
    ctx: InstallerContext,
}

impl<'a> DbInstaller<'a> {
    pub fn new(component: Component, deps: Collaborators<'a>) -> Self {
        let tracewriter = TraceWriter::new(component.trace_dir(), INSTALL_TRACE, component.kind());
        Self {
            component,
            deps,
            tracewriter,
            ctx: InstallerContext::new(),
        }
    }

    /// Nothing to download: the component is just packages.
    pub fn download(&self) -> Result<()> {
        debug!(component = %self.component.kind(), "download is a no-op for package components");
        Ok(())
    }

    /// Nothing to configure: the component is just packages.
    pub fn configure(&self) -> Result<()> {
        debug!(component = %self.component.kind(), "configure is a no-op for package components");
        Ok(())
    }

    pub fn stage(&self) -> InstallStage {
        self.ctx.current_stage()
    }

    pub fn context(&self) -> &InstallerContext {
        &self.ctx
    }

    /// Install the component and return its trace directory, the handle an
    /// uninstall is later run against.
    pub fn install(&mut self) -> Result<PathBuf> {
        let service_type = config::db_type_label(self.deps.config);
        let result = self
            .run_install()
            .map_err(|e| e.in_lifecycle(Action::Install, &service_type));
        if result.is_err() && !self.ctx.current_stage().is_terminal() {
            if let Err(e) = self.ctx.fail() {
                warn!(error = %e, "could not mark install failed");
            }
        }
        result
    }

    fn run_install(&mut self) -> Result<PathBuf> {
        let cfg = self.deps.config;
        let service_type = config::db_type(cfg)?;
        let params = config::install_params(cfg)?;

        self.ctx.transition_to(InstallStage::PreInstalling)?;
        let pkgs = self
            .deps
            .packages
            .packages(self.component.distro(), self.component.kind())?;
        self.pre_install(&pkgs, &params, &service_type)?;

        self.ctx.transition_to(InstallStage::PackagesInstalling)?;
        let names: Vec<&str> = pkgs.keys().map(String::as_str).collect();
        info!(packages = %names.join(", "), "installing packages");
        self.deps.packager.install_batch(&pkgs, &params)?;
        for (name, pkg) in &pkgs {
            self.tracewriter
                .package_installed(name, pkg.removable, &pkg.version)?;
        }

        self.ctx.transition_to(InstallStage::DirsRecording)?;
        let trace_dir = self.component.trace_dir();
        let dirs = self
            .deps
            .fs
            .make_dirs(&trace_dir)
            .map_err(|source| StackError::Filesystem {
                action: Action::Install,
                service_type: service_type.clone(),
                path: trace_dir.clone(),
                source,
            })?;
        self.tracewriter.dirs_made(&dirs)?;

        self.ctx.transition_to(InstallStage::PostInstalling)?;
        self.post_install(&service_type)?;

        self.ctx.transition_to(InstallStage::Done)?;
        info!(component = %self.component.kind(), trace_dir = %trace_dir.display(), "install complete");
        Ok(trace_dir)
    }

    fn pre_install(&self, pkgs: &PackageSet, params: &ParamMap, service_type: &str) -> Result<()> {
        for (name, pkg) in pkgs {
            if pkg.pre_install.is_empty() {
                continue;
            }
            info!(package = %name, "running pre-install commands");
            for spec in &pkg.pre_install {
                let cmd = spec.resolve(params, Action::PreInstall, service_type)?;
                run_checked(self.deps.executor, &cmd, Action::PreInstall, service_type)?;
            }
        }
        Ok(())
    }

    fn post_install(&self, service_type: &str) -> Result<()> {
        let Some(actions) = self.deps.actions.service(service_type) else {
            warn!(service_type, "no action table entry, skipping post-install");
            return Ok(());
        };

        if let Some(grant) = actions.get(Action::GrantAll) {
            info!(service_type, "granting configured user full access from any host");
            let params = config::grant_params(self.deps.config)?;
            let cmd = grant.resolve(&params, false, Action::GrantAll, service_type)?;
            run_checked(self.deps.executor, &cmd, Action::GrantAll, service_type)?;
        }

        if actions.get(Action::HostAdjust).is_some() {
            self.rebind_to_any_host(service_type)?;
        }
        Ok(())
    }

    /// Rewrite the service's bind address from loopback to wildcard.
    ///
    /// This edit is not traced; uninstall leaves it in place.
    fn rebind_to_any_host(&self, service_type: &str) -> Result<()> {
        let path = config::bind_config_path(self.deps.config);
        let fs_error = |source: std::io::Error| StackError::Filesystem {
            action: Action::HostAdjust,
            service_type: service_type.to_string(),
            path: path.clone(),
            source,
        };

        let contents = self.deps.fs.read_to_string(&path).map_err(fs_error)?;
        let updated = contents.replace(LOOPBACK_ADDR, WILDCARD_ADDR);
        if updated == contents {
            debug!(path = %path.display(), "bind address already open");
            return Ok(());
        }
        self.deps.fs.write(&path, &updated).map_err(fs_error)?;
        info!(path = %path.display(), bind = WILDCARD_ADDR, "bind address rewritten");
        Ok(())
    }
}
