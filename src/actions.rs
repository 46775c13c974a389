//! The catalogue of optimization actions a session can apply.
//!
//! Each action is a single LLVM pass, addressed either by its position in the
//! catalogue or by its flag name. Loop and call-graph passes carry their
//! adaptor nesting explicitly so the pass builder never has to infer it.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! llvm_actions {
    ($($variant:ident => $flag:literal, $pipeline:literal;)+) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum LlvmAction {
            $($variant,)+
        }

        impl LlvmAction {
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Flag name, as passed to `opt` without the leading dash.
            pub fn flag(self) -> &'static str {
                match self {
                    $(Self::$variant => $flag,)+
                }
            }

            /// Textual new-pass-manager pipeline implementing this action.
            pub fn pipeline(self) -> &'static str {
                match self {
                    $(Self::$variant => $pipeline,)+
                }
            }
        }
    };
}

llvm_actions! {
    AggressiveInstCombine => "aggressive-instcombine", "aggressive-instcombine";
    Adce => "adce", "adce";
    AlwaysInline => "always-inline", "always-inline";
    ArgPromotion => "argpromotion", "cgscc(argpromotion)";
    Bdce => "bdce", "bdce";
    CalledValuePropagation => "called-value-propagation", "called-value-propagation";
    CallsiteSplitting => "callsite-splitting", "callsite-splitting";
    ConstMerge => "constmerge", "constmerge";
    CorrelatedPropagation => "correlated-propagation", "correlated-propagation";
    Dce => "dce", "dce";
    DeadArgElim => "deadargelim", "deadargelim";
    DivRemPairs => "div-rem-pairs", "div-rem-pairs";
    Dse => "dse", "dse";
    EarlyCse => "early-cse", "early-cse";
    EarlyCseMemSsa => "early-cse-memssa", "early-cse<memssa>";
    Float2Int => "float2int", "float2int";
    FunctionAttrs => "function-attrs", "cgscc(function-attrs)";
    GlobalDce => "globaldce", "globaldce";
    GlobalOpt => "globalopt", "globalopt";
    Gvn => "gvn", "gvn";
    GvnHoist => "gvn-hoist", "gvn-hoist";
    GvnSink => "gvn-sink", "gvn-sink";
    IndVars => "indvars", "function(loop(indvars))";
    Inline => "inline", "cgscc(inline)";
    InstCombine => "instcombine", "instcombine";
    InstSimplify => "instsimplify", "instsimplify";
    Ipsccp => "ipsccp", "ipsccp";
    JumpThreading => "jump-threading", "jump-threading";
    Lcssa => "lcssa", "lcssa";
    Licm => "licm", "function(loop-mssa(licm))";
    LoopDeletion => "loop-deletion", "function(loop(loop-deletion))";
    LoopIdiom => "loop-idiom", "function(loop(loop-idiom))";
    LoopInstSimplify => "loop-instsimplify", "function(loop(loop-instsimplify))";
    LoopRotate => "loop-rotate", "function(loop(loop-rotate))";
    LoopSimplify => "loop-simplify", "loop-simplify";
    LoopSimplifyCfg => "loop-simplifycfg", "function(loop(loop-simplifycfg))";
    LoopUnroll => "loop-unroll", "loop-unroll";
    LoopVectorize => "loop-vectorize", "loop-vectorize";
    LowerExpect => "lower-expect", "lower-expect";
    Mem2Reg => "mem2reg", "mem2reg";
    MemCpyOpt => "memcpyopt", "memcpyopt";
    MergeFunc => "mergefunc", "mergefunc";
    MldstMotion => "mldst-motion", "mldst-motion";
    NewGvn => "newgvn", "newgvn";
    PartiallyInlineLibcalls => "partially-inline-libcalls", "partially-inline-libcalls";
    Reassociate => "reassociate", "reassociate";
    Sccp => "sccp", "sccp";
    SimplifyCfg => "simplifycfg", "simplifycfg";
    Sink => "sink", "sink";
    SlpVectorizer => "slp-vectorizer", "slp-vectorizer";
    Sroa => "sroa", "sroa";
    StripDeadPrototypes => "strip-dead-prototypes", "strip-dead-prototypes";
    TailCallElim => "tailcallelim", "tailcallelim";
}

impl LlvmAction {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Look up a flag, with or without its leading dash.
    pub fn from_flag(flag: &str) -> Option<Self> {
        let flag = flag.trim();
        let flag = flag.strip_prefix('-').unwrap_or(flag);
        Self::ALL.iter().copied().find(|action| action.flag() == flag)
    }

    pub fn resolve(id: &ActionId) -> Option<Self> {
        match id {
            ActionId::Index(index) => Self::from_index(*index),
            ActionId::Name(name) => Self::from_flag(name),
        }
    }
}

impl fmt::Display for LlvmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-{}", self.flag())
    }
}

/// How a caller names an action: by catalogue index or by flag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionId {
    Index(usize),
    Name(String),
}

impl From<usize> for ActionId {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for ActionId {
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        raw.parse()
            .map_or_else(|_| Self::Name(raw.to_string()), Self::Index)
    }
}

impl From<LlvmAction> for ActionId {
    fn from(action: LlvmAction) -> Self {
        Self::Name(action.flag().to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub index: usize,
    pub flag: String,
}

pub fn catalogue() -> Vec<ActionInfo> {
    LlvmAction::ALL
        .iter()
        .map(|action| ActionInfo {
            index: action.index(),
            flag: action.flag().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn indices_match_catalogue_positions() {
        for (position, action) in LlvmAction::ALL.iter().enumerate() {
            assert_eq!(action.index(), position);
            assert_eq!(LlvmAction::from_index(position), Some(*action));
        }
        assert_eq!(LlvmAction::from_index(LlvmAction::ALL.len()), None);
    }

    #[test]
    fn flags_are_unique() {
        let flags: HashSet<_> = LlvmAction::ALL.iter().map(|action| action.flag()).collect();
        assert_eq!(flags.len(), LlvmAction::ALL.len());
    }

    #[test]
    fn resolves_names_and_indices() {
        assert_eq!(
            LlvmAction::resolve(&"-instcombine".into()),
            Some(LlvmAction::InstCombine)
        );
        assert_eq!(
            LlvmAction::resolve(&"gvn-sink".into()),
            Some(LlvmAction::GvnSink)
        );
        assert_eq!(ActionId::from("3"), ActionId::Index(3));
        assert_eq!(
            LlvmAction::resolve(&ActionId::Index(LlvmAction::Sroa.index())),
            Some(LlvmAction::Sroa)
        );
        assert_eq!(LlvmAction::resolve(&"-not-a-pass".into()), None);
    }

    #[test]
    fn action_ids_deserialize_untagged() {
        let ids: Vec<ActionId> = serde_json::from_str(r#"[4, "-sroa"]"#).unwrap();
        assert_eq!(ids, vec![ActionId::Index(4), ActionId::Name("-sroa".into())]);
    }
}
