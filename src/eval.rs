use crate::context::DetectionContext;
use crate::matching::TextMatch;
use crate::pattern::{self, PatternCache};
use crate::rule::{Leaf, Rule};

/// Evaluate `rule` against `context`, compiling regex leaves on demand.
///
/// Never fails: missing context data and uncompilable patterns make the
/// affected leaf false.
pub fn evaluate(rule: &Rule, context: &DetectionContext) -> bool {
    Evaluator::new().matches(rule, context)
}

/// Rule evaluator, optionally backed by a cache of pre-compiled patterns
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator<'p> {
    patterns: Option<&'p PatternCache>,
}

impl<'p> Evaluator<'p> {
    pub fn new() -> Self {
        Self { patterns: None }
    }

    pub fn with_patterns(patterns: &'p PatternCache) -> Self {
        Self {
            patterns: Some(patterns),
        }
    }

    pub fn matches(&self, rule: &Rule, context: &DetectionContext) -> bool {
        match rule {
            Rule::Leaf(leaf) => self.matches_leaf(leaf, context),
            Rule::All(rules) => rules.iter().all(|r| self.matches(r, context)),
            Rule::Any(rules) => rules.iter().any(|r| self.matches(r, context)),
            Rule::Not(rule) => !self.matches(rule, context),
        }
    }

    fn matches_leaf(&self, leaf: &Leaf, context: &DetectionContext) -> bool {
        match leaf {
            Leaf::HeaderEquals { name, value } => context
                .header(name)
                .is_some_and(|found| TextMatch::equals(found, value)),
            Leaf::HeaderIncludes { name, substr } => context
                .header(name)
                .is_some_and(|found| TextMatch::contains(found, substr)),
            Leaf::HeaderPresent { name } => context.has_header(name),
            Leaf::MxSuffix { suffix } => TextMatch::any_domain_suffix(&context.mx, suffix),
            Leaf::NsSuffix { suffix } => TextMatch::any_domain_suffix(&context.ns, suffix),
            Leaf::MxRegex { pattern, flags } => {
                self.any_regex_match(&context.mx, pattern, flags.as_deref())
            }
            Leaf::NsRegex { pattern, flags } => {
                self.any_regex_match(&context.ns, pattern, flags.as_deref())
            }
            Leaf::IssuerEquals { value } => context
                .issuer
                .as_deref()
                .is_some_and(|issuer| TextMatch::equals(issuer, value)),
            Leaf::IssuerIncludes { substr } => context
                .issuer
                .as_deref()
                .is_some_and(|issuer| TextMatch::contains(issuer, substr)),
            Leaf::RegistrarEquals { value } => context
                .registrar
                .as_deref()
                .is_some_and(|registrar| TextMatch::equals(registrar, value)),
            Leaf::RegistrarIncludes { substr } => context
                .registrar
                .as_deref()
                .is_some_and(|registrar| TextMatch::contains(registrar, substr)),
        }
    }

    fn any_regex_match(&self, hosts: &[String], pattern: &str, flags: Option<&str>) -> bool {
        if hosts.is_empty() {
            return false;
        }

        if let Some(cached) = self.patterns.and_then(|cache| cache.get(pattern, flags)) {
            return match cached {
                Ok(regex) => hosts.iter().any(|host| regex.is_match(host)),
                Err(_) => false,
            };
        }

        match pattern::compile(pattern, flags) {
            Ok(regex) => hosts.iter().any(|host| regex.is_match(host)),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mx_context(hosts: &[&str]) -> DetectionContext {
        DetectionContext::new().with_mx(hosts.iter().copied())
    }

    fn vercel_rule() -> Rule {
        Rule::all([
            Rule::header_present("x-vercel-id"),
            Rule::header_equals("server", "vercel"),
        ])
    }

    #[test]
    fn test_empty_all_is_true_and_empty_any_is_false() {
        let contexts = [
            DetectionContext::new(),
            mx_context(&["aspmx.l.google.com"]),
            DetectionContext::new()
                .with_header("server", "Vercel")
                .with_issuer("R3"),
        ];

        for context in &contexts {
            assert!(evaluate(&Rule::All(vec![]), context));
            assert!(!evaluate(&Rule::Any(vec![]), context));
        }
    }

    #[test]
    fn test_double_negation_is_identity() {
        let context = DetectionContext::new()
            .with_header("x-vercel-id", "abc")
            .with_header("server", "Vercel");
        let rules = [
            vercel_rule(),
            Rule::header_present("cf-ray"),
            Rule::All(vec![]),
            Rule::Any(vec![]),
            Rule::mx_regex("[invalid(", None),
        ];

        for rule in rules {
            let doubled = Rule::not(Rule::not(rule.clone()));
            assert_eq!(evaluate(&doubled, &context), evaluate(&rule, &context));
        }
    }

    #[test]
    fn test_header_equals_ignores_case_in_name_and_value() {
        let rule = Rule::header_equals("X-Powered-By", "next.js");
        let context = DetectionContext::new().with_header("x-powered-by", "Next.js");

        assert!(evaluate(&rule, &context));
        assert!(!evaluate(
            &rule,
            &DetectionContext::new().with_header("x-powered-by", "Next.js 14")
        ));
        assert!(!evaluate(&rule, &DetectionContext::new()));
    }

    #[test]
    fn test_header_includes() {
        let rule = Rule::header_includes("Server", "CLOUDFLARE");

        assert!(evaluate(
            &rule,
            &DetectionContext::new().with_header("server", "cloudflare-nginx")
        ));
        assert!(!evaluate(
            &rule,
            &DetectionContext::new().with_header("server", "nginx")
        ));
        assert!(!evaluate(&rule, &DetectionContext::new()));
    }

    #[test]
    fn test_header_present_with_empty_value() {
        let rule = Rule::header_present("X-Nf-Request-Id");

        assert!(evaluate(
            &rule,
            &DetectionContext::new().with_header("x-nf-request-id", "")
        ));
        assert!(!evaluate(
            &rule,
            &DetectionContext::new().with_header("x-request-id", "1")
        ));
    }

    #[test]
    fn test_mx_suffix_is_domain_aware() {
        let rule = Rule::mx_suffix("google.com");

        assert!(!evaluate(&rule, &mx_context(&["notgoogle.com"])));
        assert!(evaluate(&rule, &mx_context(&["aspmx.l.google.com"])));
        assert!(evaluate(&rule, &mx_context(&["GOOGLE.COM"])));
        assert!(evaluate(
            &rule,
            &mx_context(&["mx.example.net", "alt2.aspmx.l.google.com"])
        ));
        assert!(!evaluate(&rule, &mx_context(&[])));
    }

    #[test]
    fn test_ns_suffix_only_checks_nameservers() {
        let rule = Rule::ns_suffix("cloudflare.com");
        let context = DetectionContext::new()
            .with_mx(["route1.mx.cloudflare.com"])
            .with_ns(["dana.ns.CLOUDFLARE.com"]);

        assert!(evaluate(&rule, &context));
        assert!(!evaluate(
            &rule,
            &DetectionContext::new().with_mx(["route1.mx.cloudflare.com"])
        ));
    }

    #[test]
    fn test_regex_defaults_to_case_insensitive() {
        let context = mx_context(&["google.com"]);

        assert!(evaluate(&Rule::mx_regex("GOOGLE", None), &context));
        assert!(!evaluate(&Rule::mx_regex("GOOGLE", Some("")), &context));
    }

    #[test]
    fn test_invalid_regex_is_false() {
        let context = mx_context(&["test.com"]);

        assert!(!evaluate(&Rule::mx_regex("[invalid(", None), &context));
        assert!(!evaluate(&Rule::mx_regex("test", Some("q")), &context));
        assert!(!evaluate(&Rule::ns_regex("[invalid(", None), &context));
        assert!(evaluate(
            &Rule::not(Rule::mx_regex("[invalid(", None)),
            &context
        ));
    }

    #[test]
    fn test_ns_regex() {
        let rule = Rule::ns_regex(r"^ns-\d+\.awsdns-\d+\.", None);
        let context = DetectionContext::new().with_ns(["NS-1234.AWSDNS-56.org"]);

        assert!(evaluate(&rule, &context));
        assert!(!evaluate(&rule, &mx_context(&["ns-1234.awsdns-56.org"])));
    }

    #[test]
    fn test_absent_issuer_and_registrar_never_match() {
        let context = DetectionContext::new();
        let rules = [
            Rule::issuer_equals(""),
            Rule::issuer_includes(""),
            Rule::registrar_equals(""),
            Rule::registrar_includes(""),
            Rule::issuer_equals("R3"),
            Rule::registrar_includes("GoDaddy"),
        ];

        for rule in &rules {
            assert!(!evaluate(rule, &context), "{rule:?} should not match");
        }
    }

    #[test]
    fn test_issuer_and_registrar_matching() {
        let context = DetectionContext::new()
            .with_issuer("Let's Encrypt")
            .with_registrar("GoDaddy.com, LLC");

        assert!(evaluate(&Rule::issuer_equals("let's encrypt"), &context));
        assert!(evaluate(&Rule::issuer_includes("ENCRYPT"), &context));
        assert!(!evaluate(&Rule::issuer_equals("Let's"), &context));
        assert!(evaluate(&Rule::registrar_includes("godaddy"), &context));
        assert!(evaluate(&Rule::registrar_equals("godaddy.com, llc"), &context));
        assert!(!evaluate(&Rule::registrar_equals("GoDaddy"), &context));
    }

    #[test]
    fn test_deep_nesting_matches_flattened_logic() {
        // (a && !(b || (c && !d))) with a, b, c, d as header presence
        let rule = Rule::all([
            Rule::header_present("a"),
            Rule::not(Rule::any([
                Rule::header_present("b"),
                Rule::all([
                    Rule::header_present("c"),
                    Rule::not(Rule::header_present("d")),
                ]),
            ])),
        ]);
        assert!(rule.depth() >= 4);

        for mask in 0u8..16 {
            let (a, b, c, d) = (mask & 1 != 0, mask & 2 != 0, mask & 4 != 0, mask & 8 != 0);
            let mut context = DetectionContext::new();
            for (name, set) in [("a", a), ("b", b), ("c", c), ("d", d)] {
                if set {
                    context.insert_header(name, "1");
                }
            }

            let expected = a && !(b || (c && !d));
            assert_eq!(evaluate(&rule, &context), expected, "mask {mask:04b}");
        }
    }

    #[test]
    fn test_vercel_signature_end_to_end() {
        let rule = vercel_rule();

        let vercel = DetectionContext::new()
            .with_header("x-vercel-id", "abc")
            .with_header("server", "Vercel");
        let apache = DetectionContext::new()
            .with_header("x-vercel-id", "abc")
            .with_header("server", "Apache");

        assert!(evaluate(&rule, &vercel));
        assert!(!evaluate(&rule, &apache));
    }

    #[test]
    fn test_cached_evaluator_agrees_with_on_demand() {
        let mut cache = PatternCache::new();
        cache.insert("GOOGLE", None).unwrap();
        cache.insert("GOOGLE", Some("")).unwrap();
        assert!(cache.insert("[invalid(", None).is_err());

        let evaluator = Evaluator::with_patterns(&cache);
        let context = mx_context(&["aspmx.l.google.com"]);
        let rules = [
            Rule::mx_regex("GOOGLE", None),
            Rule::mx_regex("GOOGLE", Some("")),
            Rule::mx_regex("[invalid(", None),
            // not in the cache, compiled on demand
            Rule::mx_regex(r"aspmx\.l\.", Some("y")),
        ];

        for rule in &rules {
            assert_eq!(evaluator.matches(rule, &context), evaluate(rule, &context));
        }
        assert!(evaluator.matches(&rules[0], &context));
        assert!(evaluator.matches(&rules[3], &context));
    }
}
