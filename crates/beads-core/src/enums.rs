//! Enum types for the beads system.
//!
//! Each enum serializes as its snake_case (or hyphenated) string form and
//! deserializes known variants plus a catch-all `Custom(String)` so that
//! records federated from repos with extended type sets round-trip without
//! loss.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Macro: defines an enum with known string variants + a Custom(String) fallback.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
            Custom(String),
        }

        impl $name {
            /// Returns the string representation.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $str, )+
                    Self::Custom(s) => s.as_str(),
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(&self) -> bool {
                *self == Self::$default
            }

            /// Returns `true` if this is a built-in (non-custom) variant.
            pub fn is_builtin(&self) -> bool {
                !matches!(self, Self::Custom(_))
            }

            /// Returns `true` if this is a known variant or any non-empty custom string.
            pub fn is_valid(&self) -> bool {
                match self {
                    Self::Custom(s) => !s.is_empty(),
                    _ => true,
                }
            }

            /// Returns `true` if builtin, or if the custom value appears in the allowlist.
            pub fn is_valid_with_custom(&self, custom_values: &[&str]) -> bool {
                match self {
                    Self::Custom(s) => custom_values.contains(&s.as_str()),
                    _ => true,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from(s))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $( $str => Self::$variant, )+
                    other => Self::Custom(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                // Check known variants first to avoid allocation in common case.
                match s.as_str() {
                    $( $str => Self::$variant, )+
                    _ => Self::Custom(s),
                }
            }
        }
    };
}

// ===========================================================================
// Status
// ===========================================================================

define_enum! {
    /// Current state of an issue.
    ///
    /// `Tombstone` is terminal: tombstoned issues never appear in any query.
    Status, default = Open,
    variants: [
        (Open, "open"),
        (InProgress, "in_progress"),
        (Blocked, "blocked"),
        (Closed, "closed"),
        (Tombstone, "tombstone"),
    ]
}

impl Status {
    /// Returns `true` for states that count as unfinished work when deciding
    /// whether a blocker is still open.
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, Self::Closed | Self::Tombstone)
    }
}

// ===========================================================================
// IssueType
// ===========================================================================

define_enum! {
    /// Categorises the kind of record. Every workflow concept is a typed
    /// variant of the universal issue.
    IssueType, default = Task,
    variants: [
        (Task, "task"),
        (Bug, "bug"),
        (Feature, "feature"),
        (Epic, "epic"),
        (Chore, "chore"),
        (Advice, "advice"),
        (Gate, "gate"),
        (Decision, "decision"),
        (Formula, "formula"),
        (Event, "event"),
        (Agent, "agent"),
        (Message, "message"),
        (Role, "role"),
        (Skill, "skill"),
    ]
}

impl IssueType {
    /// Normalises common aliases to their canonical form.
    pub fn normalize(&self) -> Self {
        match self.as_str() {
            "enhancement" | "feat" => Self::Feature,
            "dec" => Self::Decision,
            _ => self.clone(),
        }
    }
}

// ===========================================================================
// DependencyType
// ===========================================================================

define_enum! {
    /// Relationship type between issues.
    DependencyType, default = Blocks,
    variants: [
        (Blocks, "blocks"),
        (ParentChild, "parent-child"),
        (Related, "related"),
        (DiscoveredFrom, "discovered-from"),
    ]
}

impl DependencyType {
    /// Returns `true` if this edge type gates readiness of its source.
    ///
    /// `blocks` always does; `parent-child` does not block on its own but
    /// participates in cycle checks and epic rollups, so the graph engine
    /// treats both as structural.
    pub fn affects_ready_work(&self) -> bool {
        matches!(self, Self::Blocks)
    }

    /// Returns `true` for edge types that must stay acyclic.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Blocks | Self::ParentChild)
    }
}

// ===========================================================================
// AwaitType
// ===========================================================================

define_enum! {
    /// What a gate issue is waiting on.
    AwaitType, default = Human,
    variants: [
        (GhRun, "gh:run"),
        (GhPr, "gh:pr"),
        (Timer, "timer"),
        (Human, "human"),
        (Mail, "mail"),
        (Bead, "bead"),
        (Decision, "decision"),
    ]
}

// ===========================================================================
// SortPolicy
// ===========================================================================

define_enum! {
    /// Determines how ready work is ordered.
    SortPolicy, default = Hybrid,
    variants: [
        (Hybrid, "hybrid"),
        (Priority, "priority"),
        (Oldest, "oldest"),
    ]
}

// ===========================================================================
// EventType
// ===========================================================================

define_enum! {
    /// Categorises audit trail events.
    EventType, default = Created,
    variants: [
        (Created, "created"),
        (Updated, "updated"),
        (StatusChanged, "status_changed"),
        (Commented, "commented"),
        (Closed, "closed"),
        (Reopened, "reopened"),
        (DependencyAdded, "dependency_added"),
        (DependencyRemoved, "dependency_removed"),
        (LabelAdded, "label_added"),
        (LabelRemoved, "label_removed"),
        (Tombstoned, "tombstoned"),
        (Claimed, "claimed"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_default_is_open() {
        assert_eq!(Status::default(), Status::Open);
        assert!(Status::Open.is_default());
        assert!(!Status::Closed.is_default());
    }

    #[test]
    fn status_roundtrip_serde() {
        let s = Status::InProgress;
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#""in_progress""#);
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn status_unresolved() {
        assert!(Status::Open.is_unresolved());
        assert!(Status::InProgress.is_unresolved());
        assert!(!Status::Closed.is_unresolved());
        assert!(!Status::Tombstone.is_unresolved());
    }

    #[test]
    fn status_custom_roundtrip() {
        let json = r#""my_custom_status""#;
        let s: Status = serde_json::from_str(json).unwrap();
        assert_eq!(s, Status::Custom("my_custom_status".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), json);
    }

    #[test]
    fn dependency_type_as_str() {
        assert_eq!(DependencyType::ParentChild.as_str(), "parent-child");
        assert_eq!(DependencyType::DiscoveredFrom.as_str(), "discovered-from");
    }

    #[test]
    fn dependency_type_readiness() {
        assert!(DependencyType::Blocks.affects_ready_work());
        assert!(!DependencyType::ParentChild.affects_ready_work());
        assert!(DependencyType::ParentChild.is_structural());
        assert!(!DependencyType::Related.affects_ready_work());
        assert!(!DependencyType::DiscoveredFrom.is_structural());
    }

    #[test]
    fn await_type_wire_names() {
        assert_eq!(AwaitType::GhRun.as_str(), "gh:run");
        assert_eq!(AwaitType::from("gh:pr"), AwaitType::GhPr);
        assert_eq!(AwaitType::default(), AwaitType::Human);
    }

    #[test]
    fn issue_type_normalize() {
        assert_eq!(
            IssueType::Custom("enhancement".into()).normalize(),
            IssueType::Feature
        );
        assert_eq!(IssueType::Custom("dec".into()).normalize(), IssueType::Decision);
        assert_eq!(IssueType::Bug.normalize(), IssueType::Bug);
    }

    #[test]
    fn event_type_custom_variant() {
        let json = r#""custom_event""#;
        let e: EventType = serde_json::from_str(json).unwrap();
        assert_eq!(e, EventType::Custom("custom_event".into()));
    }

    #[test]
    fn custom_allowlist() {
        let t = IssueType::Custom("convoy".into());
        assert!(!t.is_valid_with_custom(&[]));
        assert!(t.is_valid_with_custom(&["convoy", "slot"]));
    }
}
