//! Type-safe identifiers for actions, template parameters and components
//!
//! These replace the stringly-typed keys of the action table and parameter
//! maps with enums that give exhaustive matching.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Named operations. The subset for which `is_table_action` holds can appear
/// as keys of an action-table entry; the rest name lifecycle steps so errors
/// can always say where they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Start,
    Stop,
    CreateDb,
    DropDb,
    GrantAll,
    HostAdjust,
    PreInstall,
    Install,
    PostInstall,
    Uninstall,
    Status,
}

impl Action {
    /// Actions that are backed by a command template in the action table
    pub const fn is_table_action(self) -> bool {
        matches!(
            self,
            Self::Start
                | Self::Stop
                | Self::CreateDb
                | Self::DropDb
                | Self::GrantAll
                | Self::HostAdjust
        )
    }

    /// Parameters the caller supplies when invoking this action.
    ///
    /// A table template may only reference these; anything else could never be
    /// resolved and is rejected when the table is built.
    pub const fn provided_params(self) -> &'static [Param] {
        match self {
            Self::CreateDb | Self::DropDb => &[Param::User, Param::Password, Param::Db],
            Self::GrantAll => &[Param::User, Param::Password],
            Self::PreInstall | Self::Install | Self::PostInstall => {
                &[Param::User, Param::Password, Param::BootStart]
            }
            Self::Start | Self::Stop | Self::HostAdjust | Self::Uninstall | Self::Status => &[],
        }
    }
}

/// Named placeholder inside a command template, written `%NAME%`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Param {
    User,
    Password,
    Db,
    BootStart,
}

impl Param {
    /// Values of secret parameters are redacted from logs
    pub const fn is_secret(self) -> bool {
        matches!(self, Self::Password)
    }
}

/// Deployable unit type; each kind owns its own trace namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComponentKind {
    #[default]
    Db,
}
