//! Emitted behavior.
//!
//! A [`Module`] is one unit of target-specific behavior placed in an
//! execution plan. Every variant records the trace node it was derived from.
//! The switch has its own vocabulary; the switch CPU and the controller both
//! run general-purpose code and share [`SoftwareModule`].

use std::fmt;

use synapse_core::{Expr, ExprGroup, NodeId, ObjAddr};

use crate::placement::ResourceId;
use crate::target::TargetType;

/// Flat discriminant of every module variant, used to key the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleKind {
    If,
    Then,
    Else,
    Drop,
    Forward,
    Broadcast,
    Ignore,
    ParseHeader,
    ModifyHeader,
    TableLookup,
    CachedTableLookup,
    SendToCpu,
    SendToController,
    MapGet,
    MapPut,
    ChainAllocate,
    VectorRead,
    VectorWrite,
}

impl ModuleKind {
    /// Returns `true` if `target` has a module of this kind.
    pub fn available_on(self, target: TargetType) -> bool {
        use ModuleKind::*;
        match self {
            If | Then | Else | Drop | Forward | Broadcast | Ignore | ParseHeader | ModifyHeader => {
                true
            }
            TableLookup | CachedTableLookup | SendToCpu | SendToController => {
                target == TargetType::Switch
            }
            MapGet | MapPut | ChainAllocate | VectorRead | VectorWrite => target.is_software(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwitchModule {
    If { node: NodeId, condition: Expr },
    Then { node: NodeId },
    Else { node: NodeId },
    Drop { node: NodeId },
    Forward { node: NodeId, port: u32 },
    Broadcast { node: NodeId },
    Ignore { node: NodeId },
    ParseHeader { node: NodeId, chunk: Expr, length: u32 },
    ModifyHeader { node: NodeId, fields: Vec<ExprGroup> },
    TableLookup { node: NodeId, obj: ObjAddr, table: ResourceId },
    CachedTableLookup {
        node: NodeId,
        obj: ObjAddr,
        table: ResourceId,
        capacity: u64,
    },
    SendToCpu { node: NodeId },
    SendToController { node: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SoftwareModule {
    If { node: NodeId, condition: Expr },
    Then { node: NodeId },
    Else { node: NodeId },
    Drop { node: NodeId },
    Forward { node: NodeId, port: u32 },
    Broadcast { node: NodeId },
    Ignore { node: NodeId },
    ParseHeader { node: NodeId, chunk: Expr, length: u32 },
    ModifyHeader { node: NodeId, fields: Vec<ExprGroup> },
    MapGet { node: NodeId, obj: ObjAddr },
    MapPut { node: NodeId, obj: ObjAddr },
    ChainAllocate { node: NodeId, obj: ObjAddr },
    VectorRead { node: NodeId, obj: ObjAddr },
    VectorWrite { node: NodeId, obj: ObjAddr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Module {
    Switch(SwitchModule),
    SwitchCpu(SoftwareModule),
    Controller(SoftwareModule),
}

impl SwitchModule {
    pub fn kind(&self) -> ModuleKind {
        match self {
            SwitchModule::If { .. } => ModuleKind::If,
            SwitchModule::Then { .. } => ModuleKind::Then,
            SwitchModule::Else { .. } => ModuleKind::Else,
            SwitchModule::Drop { .. } => ModuleKind::Drop,
            SwitchModule::Forward { .. } => ModuleKind::Forward,
            SwitchModule::Broadcast { .. } => ModuleKind::Broadcast,
            SwitchModule::Ignore { .. } => ModuleKind::Ignore,
            SwitchModule::ParseHeader { .. } => ModuleKind::ParseHeader,
            SwitchModule::ModifyHeader { .. } => ModuleKind::ModifyHeader,
            SwitchModule::TableLookup { .. } => ModuleKind::TableLookup,
            SwitchModule::CachedTableLookup { .. } => ModuleKind::CachedTableLookup,
            SwitchModule::SendToCpu { .. } => ModuleKind::SendToCpu,
            SwitchModule::SendToController { .. } => ModuleKind::SendToController,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            SwitchModule::If { node, .. }
            | SwitchModule::Then { node }
            | SwitchModule::Else { node }
            | SwitchModule::Drop { node }
            | SwitchModule::Forward { node, .. }
            | SwitchModule::Broadcast { node }
            | SwitchModule::Ignore { node }
            | SwitchModule::ParseHeader { node, .. }
            | SwitchModule::ModifyHeader { node, .. }
            | SwitchModule::TableLookup { node, .. }
            | SwitchModule::CachedTableLookup { node, .. }
            | SwitchModule::SendToCpu { node }
            | SwitchModule::SendToController { node } => *node,
        }
    }
}

impl SoftwareModule {
    pub fn kind(&self) -> ModuleKind {
        match self {
            SoftwareModule::If { .. } => ModuleKind::If,
            SoftwareModule::Then { .. } => ModuleKind::Then,
            SoftwareModule::Else { .. } => ModuleKind::Else,
            SoftwareModule::Drop { .. } => ModuleKind::Drop,
            SoftwareModule::Forward { .. } => ModuleKind::Forward,
            SoftwareModule::Broadcast { .. } => ModuleKind::Broadcast,
            SoftwareModule::Ignore { .. } => ModuleKind::Ignore,
            SoftwareModule::ParseHeader { .. } => ModuleKind::ParseHeader,
            SoftwareModule::ModifyHeader { .. } => ModuleKind::ModifyHeader,
            SoftwareModule::MapGet { .. } => ModuleKind::MapGet,
            SoftwareModule::MapPut { .. } => ModuleKind::MapPut,
            SoftwareModule::ChainAllocate { .. } => ModuleKind::ChainAllocate,
            SoftwareModule::VectorRead { .. } => ModuleKind::VectorRead,
            SoftwareModule::VectorWrite { .. } => ModuleKind::VectorWrite,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            SoftwareModule::If { node, .. }
            | SoftwareModule::Then { node }
            | SoftwareModule::Else { node }
            | SoftwareModule::Drop { node }
            | SoftwareModule::Forward { node, .. }
            | SoftwareModule::Broadcast { node }
            | SoftwareModule::Ignore { node }
            | SoftwareModule::ParseHeader { node, .. }
            | SoftwareModule::ModifyHeader { node, .. }
            | SoftwareModule::MapGet { node, .. }
            | SoftwareModule::MapPut { node, .. }
            | SoftwareModule::ChainAllocate { node, .. }
            | SoftwareModule::VectorRead { node, .. }
            | SoftwareModule::VectorWrite { node, .. } => *node,
        }
    }
}

/// Constructors for the behavior every target shares. Each one picks the
/// vocabulary of `target`.
macro_rules! common_ctor {
    ($(#[$doc:meta])* $name:ident => $variant:ident { $($field:ident : $ty:ty),* }) => {
        $(#[$doc])*
        pub fn $name(target: TargetType, node: NodeId $(, $field: $ty)*) -> Module {
            match target {
                TargetType::Switch => Module::Switch(SwitchModule::$variant { node $(, $field)* }),
                TargetType::SwitchCpu => {
                    Module::SwitchCpu(SoftwareModule::$variant { node $(, $field)* })
                }
                TargetType::Controller => {
                    Module::Controller(SoftwareModule::$variant { node $(, $field)* })
                }
            }
        }
    };
}

impl Module {
    common_ctor!(if_ => If { condition: Expr });
    common_ctor!(then => Then {});
    common_ctor!(else_ => Else {});
    common_ctor!(drop => Drop {});
    common_ctor!(forward => Forward { port: u32 });
    common_ctor!(broadcast => Broadcast {});
    common_ctor!(ignore => Ignore {});
    common_ctor!(parse_header => ParseHeader { chunk: Expr, length: u32 });
    common_ctor!(modify_header => ModifyHeader { fields: Vec<ExprGroup> });

    /// Wraps a software module for a software target.
    ///
    /// # Panics
    ///
    /// Panics if `target` is the switch.
    pub fn software(target: TargetType, module: SoftwareModule) -> Module {
        match target {
            TargetType::SwitchCpu => Module::SwitchCpu(module),
            TargetType::Controller => Module::Controller(module),
            TargetType::Switch => {
                panic!("{:?} is a software module, not a switch module", module.kind())
            }
        }
    }

    pub fn target(&self) -> TargetType {
        match self {
            Module::Switch(_) => TargetType::Switch,
            Module::SwitchCpu(_) => TargetType::SwitchCpu,
            Module::Controller(_) => TargetType::Controller,
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            Module::Switch(m) => m.kind(),
            Module::SwitchCpu(m) | Module::Controller(m) => m.kind(),
        }
    }

    /// The trace node this module was derived from.
    pub fn node(&self) -> NodeId {
        match self {
            Module::Switch(m) => m.node(),
            Module::SwitchCpu(m) | Module::Controller(m) => m.node(),
        }
    }

    /// For modules that hand traffic to another target, that target.
    pub fn crosses_to(&self) -> Option<TargetType> {
        match self {
            Module::Switch(SwitchModule::SendToCpu { .. }) => Some(TargetType::SwitchCpu),
            Module::Switch(SwitchModule::SendToController { .. }) => Some(TargetType::Controller),
            _ => None,
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{:?}", self.target(), self.kind())?;
        match self {
            Module::Switch(SwitchModule::If { condition, .. })
            | Module::SwitchCpu(SoftwareModule::If { condition, .. })
            | Module::Controller(SoftwareModule::If { condition, .. }) => {
                write!(f, "({})", condition)?
            }
            Module::Switch(SwitchModule::Forward { port, .. })
            | Module::SwitchCpu(SoftwareModule::Forward { port, .. })
            | Module::Controller(SoftwareModule::Forward { port, .. }) => write!(f, "({})", port)?,
            Module::Switch(SwitchModule::ParseHeader { length, .. })
            | Module::SwitchCpu(SoftwareModule::ParseHeader { length, .. })
            | Module::Controller(SoftwareModule::ParseHeader { length, .. }) => {
                write!(f, "({}B)", length)?
            }
            Module::Switch(SwitchModule::ModifyHeader { fields, .. })
            | Module::SwitchCpu(SoftwareModule::ModifyHeader { fields, .. })
            | Module::Controller(SoftwareModule::ModifyHeader { fields, .. }) => {
                write!(f, "({} fields)", fields.len())?
            }
            Module::Switch(SwitchModule::TableLookup { obj, table, .. }) => {
                write!(f, "({}, {})", obj, table)?
            }
            Module::Switch(SwitchModule::CachedTableLookup {
                obj, table, capacity, ..
            }) => write!(f, "({}, {}, capacity={})", obj, table, capacity)?,
            Module::SwitchCpu(
                SoftwareModule::MapGet { obj, .. }
                | SoftwareModule::MapPut { obj, .. }
                | SoftwareModule::ChainAllocate { obj, .. }
                | SoftwareModule::VectorRead { obj, .. }
                | SoftwareModule::VectorWrite { obj, .. },
            )
            | Module::Controller(
                SoftwareModule::MapGet { obj, .. }
                | SoftwareModule::MapPut { obj, .. }
                | SoftwareModule::ChainAllocate { obj, .. }
                | SoftwareModule::VectorRead { obj, .. }
                | SoftwareModule::VectorWrite { obj, .. },
            ) => write!(f, "({})", obj)?,
            _ => {}
        }
        write!(f, " @{}", self.node())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_constructors_pick_the_target_vocabulary() {
        let node = NodeId(3);
        assert_eq!(
            Module::drop(TargetType::Switch, node),
            Module::Switch(SwitchModule::Drop { node })
        );
        assert_eq!(
            Module::forward(TargetType::Controller, node, 2),
            Module::Controller(SoftwareModule::Forward { node, port: 2 })
        );
        assert_eq!(Module::ignore(TargetType::SwitchCpu, node).target(), TargetType::SwitchCpu);
    }

    #[test]
    fn kinds_respect_target_availability() {
        for target in TargetType::ALL {
            assert!(ModuleKind::If.available_on(target));
        }
        assert!(ModuleKind::TableLookup.available_on(TargetType::Switch));
        assert!(!ModuleKind::TableLookup.available_on(TargetType::Controller));
        assert!(ModuleKind::MapPut.available_on(TargetType::SwitchCpu));
        assert!(!ModuleKind::MapPut.available_on(TargetType::Switch));
    }

    #[test]
    fn cross_target_modules() {
        let send = Module::Switch(SwitchModule::SendToController { node: NodeId(1) });
        assert_eq!(send.crosses_to(), Some(TargetType::Controller));
        assert_eq!(send.kind(), ModuleKind::SendToController);
        assert_eq!(Module::drop(TargetType::Switch, NodeId(1)).crosses_to(), None);
    }

    #[test]
    fn display_names_target_kind_and_node() {
        let m = Module::forward(TargetType::Switch, NodeId(4), 7);
        assert_eq!(m.to_string(), "switch::Forward(7) @4");
        let get = Module::software(
            TargetType::Controller,
            SoftwareModule::MapGet {
                node: NodeId(2),
                obj: ObjAddr(0x10),
            },
        );
        assert_eq!(get.to_string(), "controller::MapGet(0x10) @2");
    }

    #[test]
    #[should_panic(expected = "software module")]
    fn software_module_on_switch_panics() {
        Module::software(
            TargetType::Switch,
            SoftwareModule::MapGet {
                node: NodeId(0),
                obj: ObjAddr(1),
            },
        );
    }
}
