use serde::{Deserialize, Serialize};

/// Terminal predicate that inspects one field of a [`DetectionContext`](crate::DetectionContext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", deny_unknown_fields)]
pub enum Leaf {
    HeaderEquals {
        name: String,
        value: String,
    },
    HeaderIncludes {
        name: String,
        substr: String,
    },
    /// Matches even when the header value is empty
    HeaderPresent {
        name: String,
    },
    MxSuffix {
        suffix: String,
    },
    /// `flags` of `None` means the default (`i`); `Some("")` means no flags
    MxRegex {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<String>,
    },
    NsSuffix {
        suffix: String,
    },
    NsRegex {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<String>,
    },
    IssuerEquals {
        value: String,
    },
    IssuerIncludes {
        substr: String,
    },
    RegistrarEquals {
        value: String,
    },
    RegistrarIncludes {
        substr: String,
    },
}

impl Leaf {
    /// The `(pattern, flags)` pair of a regex leaf
    pub fn regex(&self) -> Option<(&str, Option<&str>)> {
        match self {
            Leaf::MxRegex { pattern, flags } | Leaf::NsRegex { pattern, flags } => {
                Some((pattern.as_str(), flags.as_deref()))
            }
            _ => None,
        }
    }
}

/// A provider-signature boolean expression.
///
/// Each node is exactly one shape. In YAML/JSON a leaf is a map with a `kind`
/// key and its own fields, and a combinator is a map with exactly one of the
/// keys `all`, `any` or `not`. Anything else is rejected on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RuleRepr", into = "RuleRepr")]
pub enum Rule {
    Leaf(Leaf),
    /// True when every child is true (vacuously true when empty)
    All(Vec<Rule>),
    /// True when some child is true (false when empty)
    Any(Vec<Rule>),
    Not(Box<Rule>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RuleRepr {
    Leaf(Leaf),
    All(AllRepr),
    Any(AnyRepr),
    Not(NotRepr),
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllRepr {
    all: Vec<Rule>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnyRepr {
    any: Vec<Rule>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotRepr {
    not: Box<Rule>,
}

impl From<RuleRepr> for Rule {
    fn from(repr: RuleRepr) -> Self {
        match repr {
            RuleRepr::Leaf(leaf) => Rule::Leaf(leaf),
            RuleRepr::All(AllRepr { all }) => Rule::All(all),
            RuleRepr::Any(AnyRepr { any }) => Rule::Any(any),
            RuleRepr::Not(NotRepr { not }) => Rule::Not(not),
        }
    }
}

impl From<Rule> for RuleRepr {
    fn from(rule: Rule) -> Self {
        match rule {
            Rule::Leaf(leaf) => RuleRepr::Leaf(leaf),
            Rule::All(all) => RuleRepr::All(AllRepr { all }),
            Rule::Any(any) => RuleRepr::Any(AnyRepr { any }),
            Rule::Not(not) => RuleRepr::Not(NotRepr { not }),
        }
    }
}

impl From<Leaf> for Rule {
    fn from(leaf: Leaf) -> Self {
        Rule::Leaf(leaf)
    }
}

impl Rule {
    pub fn all(rules: impl IntoIterator<Item = Rule>) -> Self {
        Rule::All(rules.into_iter().collect())
    }

    pub fn any(rules: impl IntoIterator<Item = Rule>) -> Self {
        Rule::Any(rules.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(rule: Rule) -> Self {
        Rule::Not(Box::new(rule))
    }

    pub fn header_equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Leaf::HeaderEquals {
            name: name.into(),
            value: value.into(),
        }
        .into()
    }

    pub fn header_includes(name: impl Into<String>, substr: impl Into<String>) -> Self {
        Leaf::HeaderIncludes {
            name: name.into(),
            substr: substr.into(),
        }
        .into()
    }

    pub fn header_present(name: impl Into<String>) -> Self {
        Leaf::HeaderPresent { name: name.into() }.into()
    }

    pub fn mx_suffix(suffix: impl Into<String>) -> Self {
        Leaf::MxSuffix {
            suffix: suffix.into(),
        }
        .into()
    }

    pub fn mx_regex(pattern: impl Into<String>, flags: Option<&str>) -> Self {
        Leaf::MxRegex {
            pattern: pattern.into(),
            flags: flags.map(str::to_string),
        }
        .into()
    }

    pub fn ns_suffix(suffix: impl Into<String>) -> Self {
        Leaf::NsSuffix {
            suffix: suffix.into(),
        }
        .into()
    }

    pub fn ns_regex(pattern: impl Into<String>, flags: Option<&str>) -> Self {
        Leaf::NsRegex {
            pattern: pattern.into(),
            flags: flags.map(str::to_string),
        }
        .into()
    }

    pub fn issuer_equals(value: impl Into<String>) -> Self {
        Leaf::IssuerEquals {
            value: value.into(),
        }
        .into()
    }

    pub fn issuer_includes(substr: impl Into<String>) -> Self {
        Leaf::IssuerIncludes {
            substr: substr.into(),
        }
        .into()
    }

    pub fn registrar_equals(value: impl Into<String>) -> Self {
        Leaf::RegistrarEquals {
            value: value.into(),
        }
        .into()
    }

    pub fn registrar_includes(substr: impl Into<String>) -> Self {
        Leaf::RegistrarIncludes {
            substr: substr.into(),
        }
        .into()
    }

    /// Visit every leaf in the tree, depth first
    pub fn for_each_leaf<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Leaf),
    {
        match self {
            Rule::Leaf(leaf) => f(leaf),
            Rule::All(rules) | Rule::Any(rules) => {
                for rule in rules {
                    rule.for_each_leaf(f);
                }
            }
            Rule::Not(rule) => rule.for_each_leaf(f),
        }
    }

    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut leaves = Vec::new();
        self.for_each_leaf(&mut |leaf| leaves.push(leaf));
        leaves
    }

    /// Nesting depth, where a lone leaf has depth 1
    pub fn depth(&self) -> usize {
        match self {
            Rule::Leaf(_) => 1,
            Rule::All(rules) | Rule::Any(rules) => {
                1 + rules.iter().map(Rule::depth).max().unwrap_or(0)
            }
            Rule::Not(rule) => 1 + rule.depth(),
        }
    }
}
