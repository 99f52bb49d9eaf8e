use crate::domain::result::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Commands a device understands, as carried in the `action` field of
/// request and response envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Device,
    List,
    Install,
    Remove,
    Refresh,
    Revert,
    Enable,
    Disable,
    SetConf,
    Conf,
    Info,
    Server,
    Start,
    Stop,
    Restart,
    Unregister,
    Ack,
}

/// How the result of a successful response is merged into twin state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// `device`: the device describes itself
    SelfDescription,
    /// `list`: full snap inventory, replaces the stored set
    Inventory,
    /// snap mutations: result is an opaque task id
    Task,
    /// `conf`, `info`: one snap descriptor
    SnapDescriptor,
    /// `server`: OS and kernel identity
    OsVersion,
    /// `unregister`: drop the twin
    Unregister,
    Unhandled,
}

impl ActionKind {
    pub const ALL: [ActionKind; 17] = [
        ActionKind::Device,
        ActionKind::List,
        ActionKind::Install,
        ActionKind::Remove,
        ActionKind::Refresh,
        ActionKind::Revert,
        ActionKind::Enable,
        ActionKind::Disable,
        ActionKind::SetConf,
        ActionKind::Conf,
        ActionKind::Info,
        ActionKind::Server,
        ActionKind::Start,
        ActionKind::Stop,
        ActionKind::Restart,
        ActionKind::Unregister,
        ActionKind::Ack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Device => "device",
            ActionKind::List => "list",
            ActionKind::Install => "install",
            ActionKind::Remove => "remove",
            ActionKind::Refresh => "refresh",
            ActionKind::Revert => "revert",
            ActionKind::Enable => "enable",
            ActionKind::Disable => "disable",
            ActionKind::SetConf => "setconf",
            ActionKind::Conf => "conf",
            ActionKind::Info => "info",
            ActionKind::Server => "server",
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Restart => "restart",
            ActionKind::Unregister => "unregister",
            ActionKind::Ack => "ack",
        }
    }

    pub fn response_class(&self) -> ResponseClass {
        match self {
            ActionKind::Device => ResponseClass::SelfDescription,
            ActionKind::List => ResponseClass::Inventory,
            ActionKind::Install
            | ActionKind::Remove
            | ActionKind::Refresh
            | ActionKind::Revert
            | ActionKind::Enable
            | ActionKind::Disable
            | ActionKind::SetConf
            | ActionKind::Start
            | ActionKind::Stop
            | ActionKind::Restart => ResponseClass::Task,
            ActionKind::Conf | ActionKind::Info => ResponseClass::SnapDescriptor,
            ActionKind::Server => ResponseClass::OsVersion,
            ActionKind::Unregister => ResponseClass::Unregister,
            ActionKind::Ack => ResponseClass::Unhandled,
        }
    }

    /// Mutations that change the installed snap set and are followed by a
    /// deferred inventory refresh.
    pub fn is_snap_mutation(&self) -> bool {
        self.response_class() == ResponseClass::Task
    }

    /// Kinds that address a single snap and need its name in the request.
    pub fn requires_snap(&self) -> bool {
        matches!(
            self,
            ActionKind::Install
                | ActionKind::Remove
                | ActionKind::Refresh
                | ActionKind::Revert
                | ActionKind::Enable
                | ActionKind::Disable
                | ActionKind::SetConf
                | ActionKind::Conf
                | ActionKind::Info
                | ActionKind::Start
                | ActionKind::Stop
                | ActionKind::Restart
        )
    }

    pub fn is_service_control(&self) -> bool {
        matches!(
            self,
            ActionKind::Start | ActionKind::Stop | ActionKind::Restart
        )
    }

    /// Sub-kinds accepted by the snap "update" operation.
    pub fn is_update_kind(&self) -> bool {
        matches!(
            self,
            ActionKind::Enable | ActionKind::Disable | ActionKind::Refresh
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::UnhandledAction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_kind() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_parse_unknown_is_unhandled() {
        let err = "reboot".parse::<ActionKind>().unwrap_err();
        assert!(matches!(err, DomainError::UnhandledAction(ref s) if s == "reboot"));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&ActionKind::SetConf).unwrap(),
            "\"setconf\""
        );
        let kind: ActionKind = serde_json::from_str("\"unregister\"").unwrap();
        assert_eq!(kind, ActionKind::Unregister);
    }

    #[test]
    fn test_response_classes() {
        assert_eq!(
            ActionKind::Device.response_class(),
            ResponseClass::SelfDescription
        );
        assert_eq!(ActionKind::List.response_class(), ResponseClass::Inventory);
        assert_eq!(ActionKind::Restart.response_class(), ResponseClass::Task);
        assert_eq!(
            ActionKind::Info.response_class(),
            ResponseClass::SnapDescriptor
        );
        assert_eq!(ActionKind::Server.response_class(), ResponseClass::OsVersion);
        assert_eq!(ActionKind::Ack.response_class(), ResponseClass::Unhandled);
    }

    #[test]
    fn test_snap_mutations() {
        let mutations: Vec<_> = ActionKind::ALL
            .into_iter()
            .filter(ActionKind::is_snap_mutation)
            .collect();
        assert_eq!(mutations.len(), 10);
        assert!(!ActionKind::List.is_snap_mutation());
        assert!(!ActionKind::Conf.is_snap_mutation());
        assert!(!ActionKind::Unregister.is_snap_mutation());
    }

    #[test]
    fn test_snap_scoped_kinds() {
        assert!(ActionKind::Install.requires_snap());
        assert!(ActionKind::Info.requires_snap());
        assert!(!ActionKind::List.requires_snap());
        assert!(!ActionKind::Server.requires_snap());
        assert!(!ActionKind::Device.requires_snap());
    }
}
