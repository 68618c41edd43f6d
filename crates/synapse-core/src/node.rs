//! Node payloads of the trace graph.
//!
//! A [`TraceNode`] pairs an immutable [`NodeKind`] payload with the ordered
//! list of branch constraints that hold on the path from the root to it.
//! Graph links live on the edges of the owning
//! [`TraceGraph`](crate::TraceGraph), never inside the payload.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::expr::Expr;
use crate::id::NodeId;

/// A named, fixed-width value produced by a call.
///
/// Several symbols may share a `base` name (e.g. two `map_get` calls both
/// produce `map_has_this_key`); `origin` disambiguates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: String,
    pub width: u32,
    /// The call node that produced this symbol.
    pub origin: NodeId,
    /// The symbolic value itself.
    pub expr: Expr,
}

impl Symbol {
    pub fn new(base: impl Into<String>, width: u32, origin: NodeId, expr: Expr) -> Self {
        Symbol {
            base: base.into(),
            width,
            origin,
            expr,
        }
    }

    /// Unique name in the trace: `"<base>_<origin>"`.
    pub fn unique_name(&self) -> String {
        format!("{}_{}", self.base, self.origin)
    }
}

/// One argument of a call.
///
/// `expr` is the argument value itself (often a pointer). For arguments
/// pointing to memory, `input` and `output` hold the pointee before and after
/// the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallArg {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Expr>,
}

impl CallArg {
    pub fn value(expr: Expr) -> Self {
        CallArg {
            expr,
            input: None,
            output: None,
        }
    }

    pub fn with_input(mut self, input: Expr) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: Expr) -> Self {
        self.output = Some(output);
        self
    }
}

/// A primitive operation invocation recorded in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub function: String,
    /// Arguments in declaration order.
    #[serde(default)]
    pub args: IndexMap<String, CallArg>,
    /// Return value of the call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<Expr>,
    /// Symbols produced by this call.
    #[serde(default)]
    pub produced: SmallVec<[Symbol; 2]>,
}

impl Call {
    pub fn new(function: impl Into<String>) -> Self {
        Call {
            function: function.into(),
            args: IndexMap::new(),
            ret: None,
            produced: SmallVec::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, arg: CallArg) -> Self {
        self.args.insert(name.into(), arg);
        self
    }

    pub fn returning(mut self, ret: Expr) -> Self {
        self.ret = Some(ret);
        self
    }

    /// Declares a produced symbol. The origin is fixed up when the call is
    /// inserted into a graph.
    pub fn producing(mut self, base: impl Into<String>, expr: Expr) -> Self {
        let width = expr.width();
        self.produced.push(Symbol::new(base, width, NodeId(0), expr));
        self
    }

    /// Looks up an argument by name.
    pub fn get_arg(&self, name: &str) -> Option<&CallArg> {
        self.args.get(name)
    }

    /// Looks up an argument that a generator requires to exist.
    ///
    /// # Panics
    ///
    /// Panics if the call has no such argument: generators only ask for
    /// arguments that belong to the operation's fixed signature.
    pub fn expect_arg(&self, name: &str) -> &CallArg {
        match self.args.get(name) {
            Some(arg) => arg,
            None => panic!(
                "call '{}' has no argument '{}' (has: {:?})",
                self.function,
                name,
                self.args.keys().collect::<Vec<_>>()
            ),
        }
    }
}

/// Terminal routing decision for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    Drop,
    Broadcast,
    Forward { port: u32 },
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Drop => write!(f, "drop"),
            Route::Broadcast => write!(f, "broadcast"),
            Route::Forward { port } => write!(f, "forward({})", port),
        }
    }
}

/// The payload variants of a trace node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Call(Call),
    Branch { condition: Expr },
    Terminal(Route),
}

impl NodeKind {
    pub fn is_branch(&self) -> bool {
        matches!(self, NodeKind::Branch { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::Terminal(_))
    }

    /// The call payload, if this is a call.
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            NodeKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// The branch condition, if this is a branch.
    pub fn condition(&self) -> Option<&Expr> {
        match self {
            NodeKind::Branch { condition } => Some(condition),
            _ => None,
        }
    }

    /// Human-readable operation name, used in diagnostics.
    pub fn operation(&self) -> String {
        match self {
            NodeKind::Call(call) => call.function.clone(),
            NodeKind::Branch { .. } => "branch".to_string(),
            NodeKind::Terminal(route) => route.to_string(),
        }
    }
}

/// A node in the trace graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceNode {
    pub kind: NodeKind,
    /// Ordered conjunction of branch conditions on the root-to-node path.
    /// Maintained by the owning graph.
    #[serde(default)]
    pub constraints: Vec<Expr>,
}

impl TraceNode {
    pub fn new(kind: NodeKind) -> Self {
        TraceNode {
            kind,
            constraints: Vec::new(),
        }
    }

    pub fn call(call: Call) -> Self {
        TraceNode::new(NodeKind::Call(call))
    }

    pub fn branch(condition: Expr) -> Self {
        TraceNode::new(NodeKind::Branch { condition })
    }

    pub fn terminal(route: Route) -> Self {
        TraceNode::new(NodeKind::Terminal(route))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_builder_keeps_argument_order() {
        let call = Call::new("map_get")
            .arg("map", CallArg::value(Expr::constant(0x100, 64)))
            .arg("key", CallArg::value(Expr::symbol("k", 32)))
            .producing("map_has_this_key", Expr::symbol("hit", 1));
        let names: Vec<_> = call.args.keys().cloned().collect();
        assert_eq!(names, vec!["map", "key"]);
        assert_eq!(call.produced[0].width, 1);
        assert!(call.get_arg("value_out").is_none());
    }

    #[test]
    #[should_panic(expected = "has no argument 'value_out'")]
    fn expect_arg_panics_on_unknown_argument() {
        Call::new("map_get").expect_arg("value_out");
    }

    #[test]
    fn unique_symbol_name_includes_origin() {
        let sym = Symbol::new("pkt", 8, NodeId(4), Expr::symbol("pkt", 8));
        assert_eq!(sym.unique_name(), "pkt_4");
    }

    #[test]
    fn operation_names() {
        assert_eq!(NodeKind::Terminal(Route::Forward { port: 2 }).operation(), "forward(2)");
        assert_eq!(NodeKind::Branch { condition: Expr::truth() }.operation(), "branch");
        assert!(NodeKind::Terminal(Route::Drop).is_terminal());
    }

    #[test]
    fn node_kind_serde_roundtrip() {
        let kind = NodeKind::Call(Call::new("current_time").returning(Expr::symbol("now", 64)));
        let json = serde_json::to_string(&kind).unwrap();
        let back: NodeKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, back);
    }
}
