use crate::context::DetectionContext;
use crate::eval::Evaluator;
use crate::pattern::PatternCache;
use crate::signature::{Catalog, Category, ProviderSignature};
use serde::Serialize;

pub struct ProviderDetector {
    catalog: Catalog,
    compiled_patterns: PatternCache,
}

/// A signature that matched a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub id: String,
    pub name: String,
    pub category: Category,
}

impl From<&ProviderSignature> for Detection {
    fn from(signature: &ProviderSignature) -> Self {
        Self {
            id: signature.id.clone(),
            name: signature.name.clone(),
            category: signature.category,
        }
    }
}

/// Matched signatures, kept in catalog order
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionReport {
    matches: Vec<Detection>,
}

impl DetectionReport {
    pub fn matches(&self) -> &[Detection] {
        &self.matches
    }

    pub fn for_category(&self, category: Category) -> impl Iterator<Item = &Detection> {
        self.matches
            .iter()
            .filter(move |d| d.category == category)
    }

    /// Highest-priority match of a category
    pub fn primary(&self, category: Category) -> Option<&Detection> {
        self.for_category(category).next()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.matches.iter().any(|d| d.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl ProviderDetector {
    pub fn new(catalog: Catalog) -> anyhow::Result<Self> {
        catalog
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid signature catalog: {}", e))?;

        let mut detector = ProviderDetector {
            catalog,
            compiled_patterns: PatternCache::new(),
        };

        // Pre-compile all regex patterns; invalid ones are kept so they evaluate to false
        detector.compile_patterns();
        log::info!(
            "Loaded {} provider signatures ({} regex patterns, {} invalid)",
            detector.catalog.len(),
            detector.compiled_patterns.len(),
            detector.compiled_patterns.invalid_count()
        );
        Ok(detector)
    }

    fn compile_patterns(&mut self) {
        for signature in &self.catalog.signatures {
            for leaf in signature.rule.leaves() {
                if let Some((pattern, flags)) = leaf.regex() {
                    if let Err(e) = self.compiled_patterns.insert(pattern, flags) {
                        log::warn!(
                            "Signature '{}' has a pattern that will never match: {}",
                            signature.id,
                            e
                        );
                    }
                }
            }
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::with_patterns(&self.compiled_patterns)
    }

    pub fn detect(&self, context: &DetectionContext) -> DetectionReport {
        let evaluator = self.evaluator();
        let mut report = DetectionReport::default();

        for signature in &self.catalog.signatures {
            let matched = evaluator.matches(&signature.rule, context);
            log::debug!(
                "Signature '{}' ({}) evaluation result: {}",
                signature.id,
                signature.category,
                matched
            );
            if matched {
                report.matches.push(Detection::from(signature));
            }
        }

        report
    }

    /// Evaluate a single signature by id; `None` when the id is unknown
    pub fn matches(&self, id: &str, context: &DetectionContext) -> Option<bool> {
        self.catalog
            .get(id)
            .map(|signature| self.evaluator().matches(&signature.rule, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use crate::signature::ProviderSignature;

    fn signature(id: &str, category: Category, rule: Rule) -> ProviderSignature {
        ProviderSignature {
            id: id.to_string(),
            name: id.to_uppercase(),
            category,
            rule,
        }
    }

    #[test]
    fn test_default_catalog_detects_vercel_stack() {
        let detector = ProviderDetector::new(Catalog::default()).unwrap();
        let context = DetectionContext::new()
            .with_header("X-Vercel-Id", "iad1::abc")
            .with_header("Server", "Vercel")
            .with_mx(["aspmx.l.google.com", "alt1.aspmx.l.google.com"])
            .with_ns(["ns1.vercel-dns.com", "ns2.vercel-dns.com"])
            .with_issuer("R11")
            .with_registrar("NameCheap, Inc.");

        let report = detector.detect(&context);

        assert_eq!(report.primary(Category::Hosting).unwrap().id, "vercel");
        assert_eq!(report.primary(Category::Dns).unwrap().id, "vercel-dns");
        assert_eq!(
            report.primary(Category::Email).unwrap().id,
            "google-workspace"
        );
        assert_eq!(
            report.primary(Category::Certificate).unwrap().id,
            "lets-encrypt"
        );
        assert_eq!(report.primary(Category::Registrar).unwrap().id, "namecheap");
        assert!(!report.contains("netlify"));
    }

    #[test]
    fn test_default_catalog_detects_cloudflare_and_route53() {
        let detector = ProviderDetector::new(Catalog::default()).unwrap();

        let cloudflare = DetectionContext::new()
            .with_header("cf-ray", "7d1c2f-IAD")
            .with_header("server", "cloudflare")
            .with_ns(["dana.ns.cloudflare.com", "rick.ns.cloudflare.com"])
            .with_mx(["route1.mx.cloudflare.net"]);
        let report = detector.detect(&cloudflare);
        assert_eq!(
            report.primary(Category::Hosting).unwrap().id,
            "cloudflare-hosting"
        );
        assert_eq!(report.primary(Category::Dns).unwrap().id, "cloudflare-dns");
        assert_eq!(
            report.primary(Category::Email).unwrap().id,
            "cloudflare-email-routing"
        );

        let aws = DetectionContext::new()
            .with_header("x-amz-cf-id", "abc==")
            .with_ns(["ns-1234.awsdns-56.org", "ns-789.awsdns-01.co.uk"]);
        let report = detector.detect(&aws);
        assert_eq!(
            report.primary(Category::Hosting).unwrap().id,
            "aws-cloudfront"
        );
        assert_eq!(report.primary(Category::Dns).unwrap().id, "route53");
    }

    #[test]
    fn test_empty_context_matches_nothing_in_default_catalog() {
        let detector = ProviderDetector::new(Catalog::default()).unwrap();
        let report = detector.detect(&DetectionContext::new());

        assert!(report.is_empty());
        for category in Category::ALL {
            assert!(report.primary(category).is_none());
        }
    }

    #[test]
    fn test_report_keeps_catalog_order() {
        let catalog = Catalog::new(vec![
            signature("second-choice", Category::Email, Rule::mx_regex("mail", None)),
            signature("always", Category::Hosting, Rule::All(vec![])),
            signature("first-choice", Category::Email, Rule::mx_suffix("example.com")),
        ]);
        let detector = ProviderDetector::new(catalog).unwrap();
        let context = DetectionContext::new().with_mx(["mail.example.com"]);

        let report = detector.detect(&context);
        let ids: Vec<&str> = report.matches().iter().map(|d| d.id.as_str()).collect();

        assert_eq!(ids, vec!["second-choice", "always", "first-choice"]);
        assert_eq!(report.primary(Category::Email).unwrap().id, "second-choice");
        assert_eq!(report.for_category(Category::Email).count(), 2);
    }

    #[test]
    fn test_invalid_pattern_does_not_abort_detection() {
        let catalog = Catalog::new(vec![
            signature("broken", Category::Dns, Rule::ns_regex("(unclosed", None)),
            signature("negated", Category::Dns, Rule::not(Rule::ns_regex("(unclosed", None))),
            signature("working", Category::Dns, Rule::ns_suffix("example.net")),
        ]);
        let detector = ProviderDetector::new(catalog).unwrap();
        let context = DetectionContext::new().with_ns(["ns1.example.net"]);

        let report = detector.detect(&context);

        assert!(!report.contains("broken"));
        assert!(report.contains("negated"));
        assert!(report.contains("working"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let catalog = Catalog::new(vec![
            signature("dup", Category::Dns, Rule::ns_suffix("a.net")),
            signature("dup", Category::Dns, Rule::ns_suffix("b.net")),
        ]);

        assert!(ProviderDetector::new(catalog).is_err());
    }

    #[test]
    fn test_matches_single_signature() {
        let detector = ProviderDetector::new(Catalog::default()).unwrap();
        let context = DetectionContext::new().with_mx(["example-com.mail.protection.outlook.com"]);

        assert_eq!(detector.matches("microsoft-365", &context), Some(true));
        assert_eq!(detector.matches("google-workspace", &context), Some(false));
        assert_eq!(detector.matches("no-such-provider", &context), None);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let catalog = Catalog::new(vec![signature(
            "godaddy",
            Category::Registrar,
            Rule::registrar_includes("godaddy"),
        )]);
        let detector = ProviderDetector::new(catalog).unwrap();
        let report = detector.detect(&DetectionContext::new().with_registrar("GoDaddy.com, LLC"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "matches": [
                    {"id": "godaddy", "name": "GODADDY", "category": "registrar"}
                ]
            })
        );
    }
}
