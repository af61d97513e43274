//! Action table: service type -> named command templates.
//!
//! The table is an immutable value handed to the lifecycle components rather
//! than process-wide state, so callers (and tests) can supply their own. It is
//! validated when built: every placeholder used by an action's template must be
//! one of the parameters that action is invoked with.
//!
//! JSON form, as accepted by `ActionTable::load_from_file`:
//!
//! ```json
//! { "mysql": { "start": ["/etc/init.d/mysql", "start"] } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, StackError};
use crate::template::CommandTemplate;
use crate::types::Action;

/// Commands defined for one service type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceActions {
    commands: BTreeMap<Action, CommandTemplate>,
}

impl ServiceActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; the template is parsed immediately
    pub fn with<S: AsRef<str>>(mut self, action: Action, tokens: &[S]) -> Result<Self> {
        self.commands.insert(action, CommandTemplate::parse(tokens)?);
        Ok(self)
    }

    pub fn get(&self, action: Action) -> Option<&CommandTemplate> {
        self.commands.get(&action)
    }

    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.commands.keys().copied()
    }

    fn validate(&self, service_type: &str) -> Result<()> {
        for (action, template) in &self.commands {
            if !action.is_table_action() {
                return Err(StackError::template(format!(
                    "[{service_type}] '{action}' is not an action-table command"
                )));
            }
            let allowed = action.provided_params();
            if let Some(param) = template
                .placeholders()
                .into_iter()
                .find(|p| !allowed.contains(p))
            {
                return Err(StackError::UnresolvedPlaceholder {
                    action: *action,
                    service_type: service_type.to_string(),
                    placeholder: param.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Immutable mapping of service type to its actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionTable {
    services: BTreeMap<String, ServiceActions>,
}

impl ActionTable {
    /// Build a validated table. Service types are matched case-insensitively,
    /// so two entries differing only in case are rejected.
    pub fn new(services: impl IntoIterator<Item = (String, ServiceActions)>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (service_type, actions) in services {
            let key = service_type.trim().to_lowercase();
            actions.validate(&key)?;
            if table.insert(key.clone(), actions).is_some() {
                return Err(StackError::template(format!(
                    "service type [{key}] is defined more than once"
                )));
            }
        }
        Ok(Self { services: table })
    }

    /// The table shipped with stackctl
    pub fn builtin() -> Result<Self> {
        Self::new([("mysql".to_string(), mysql_actions()?)])
    }

    /// Load a replacement table from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StackError::config(format!("failed to read action table {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<Action, CommandTemplate>> =
            serde_json::from_str(content)
                .map_err(|e| StackError::config(format!("invalid action table: {e}")))?;
        Self::new(
            raw.into_iter()
                .map(|(service, commands)| (service, ServiceActions { commands })),
        )
    }

    /// Entry for a service type
    pub fn service(&self, service_type: &str) -> Option<&ServiceActions> {
        self.services.get(&service_type.trim().to_lowercase())
    }

    /// Entry for a service type, or `UnsupportedType` naming the action
    pub fn require(&self, service_type: &str, action: Action) -> Result<&ServiceActions> {
        self.service(service_type)
            .ok_or_else(|| StackError::unsupported(action, service_type))
    }

    /// Command for (service type, action), or `UnsupportedType`
    pub fn command(&self, service_type: &str, action: Action) -> Result<&CommandTemplate> {
        self.require(service_type, action)?
            .get(action)
            .ok_or_else(|| StackError::unsupported(action, service_type))
    }

    pub fn service_types(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}

fn mysql_actions() -> Result<ServiceActions> {
    ServiceActions::new()
        .with(Action::Start, &["/etc/init.d/mysql", "start"])?
        .with(Action::Stop, &["/etc/init.d/mysql", "stop"])?
        .with(
            Action::CreateDb,
            &["mysql", "-u%USER%", "-p%PASSWORD%", "-e", "CREATE DATABASE %DB%;"],
        )?
        .with(
            Action::DropDb,
            &["mysql", "-u%USER%", "-p%PASSWORD%", "-e", "DROP DATABASE IF EXISTS %DB%;"],
        )?
        .with(
            Action::GrantAll,
            &[
                "mysql",
                "-uroot",
                "-p%PASSWORD%",
                "-h127.0.0.1",
                "-e",
                "GRANT ALL PRIVILEGES ON *.* TO '%USER%'@'%' identified by '%PASSWORD%';",
            ],
        )?
        .with(
            Action::HostAdjust,
            &["sed", "-i", "s/127.0.0.1/0.0.0.0/g", "/etc/mysql/my.cnf"],
        )
}
