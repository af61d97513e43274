//! Ad-hoc database administration.
//!
//! These run the configured service type's `create_db` / `drop_db` command as
//! the unprivileged user and never touch the trace: a database created here is
//! not part of any install and is not removed by uninstall.

use tracing::info;

use crate::action_table::ActionTable;
use crate::config::{self, ConfigSource};
use crate::error::Result;
use crate::executor::{CommandExecutor, run_checked};
use crate::types::Action;

pub fn create_db(
    cfg: &dyn ConfigSource,
    actions: &ActionTable,
    executor: &dyn CommandExecutor,
    db_name: &str,
) -> Result<()> {
    run_admin(cfg, actions, executor, Action::CreateDb, db_name)
}

pub fn drop_db(
    cfg: &dyn ConfigSource,
    actions: &ActionTable,
    executor: &dyn CommandExecutor,
    db_name: &str,
) -> Result<()> {
    run_admin(cfg, actions, executor, Action::DropDb, db_name)
}

fn run_admin(
    cfg: &dyn ConfigSource,
    actions: &ActionTable,
    executor: &dyn CommandExecutor,
    action: Action,
    db_name: &str,
) -> Result<()> {
    run_admin_command(cfg, actions, executor, action, db_name)
        .map_err(|e| e.in_lifecycle(action, &config::db_type_label(cfg)))
}

fn run_admin_command(
    cfg: &dyn ConfigSource,
    actions: &ActionTable,
    executor: &dyn CommandExecutor,
    action: Action,
    db_name: &str,
) -> Result<()> {
    let service_type = config::db_type(cfg)?;
    let template = actions.command(&service_type, action)?;
    let params = config::admin_params(cfg, db_name)?;
    let cmd = template.resolve(&params, false, action, &service_type)?;
    run_checked(executor, &cmd, action, &service_type)?;
    info!(%service_type, %action, database = db_name, "database command complete");
    Ok(())
}
