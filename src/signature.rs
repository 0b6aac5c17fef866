use crate::pattern::{self, PatternError};
use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hosting,
    Dns,
    Email,
    Registrar,
    Certificate,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Hosting,
        Category::Dns,
        Category::Email,
        Category::Registrar,
        Category::Certificate,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Hosting => "hosting",
            Category::Dns => "dns",
            Category::Email => "email",
            Category::Registrar => "registrar",
            Category::Certificate => "certificate",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSignature {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub rule: Rule,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to serialize catalog: {0}")]
    Serialize(serde_yaml::Error),
    #[error("signature #{index} has an empty id")]
    EmptyId { index: usize },
    #[error("duplicate signature id '{0}'")]
    DuplicateId(String),
}

/// A regex leaf that cannot be compiled and will therefore never match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub signature_id: String,
    pub pattern: String,
    pub flags: Option<String>,
    pub error: PatternError,
}

impl fmt::Display for InvalidPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.signature_id, self.error)
    }
}

/// Provider signatures in priority order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub signatures: Vec<ProviderSignature>,
}

impl Catalog {
    pub fn new(signatures: Vec<ProviderSignature>) -> Self {
        Self { signatures }
    }

    pub fn from_yaml(content: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_yaml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let content = serde_yaml::to_string(self).map_err(CatalogError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for (index, signature) in self.signatures.iter().enumerate() {
            if signature.id.trim().is_empty() {
                return Err(CatalogError::EmptyId { index });
            }
            if !seen.insert(signature.id.as_str()) {
                return Err(CatalogError::DuplicateId(signature.id.clone()));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ProviderSignature> {
        self.signatures.iter().find(|s| s.id == id)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &ProviderSignature> {
        self.signatures
            .iter()
            .filter(move |s| s.category == category)
    }

    /// Every regex leaf whose pattern or flags fail to compile
    pub fn invalid_patterns(&self) -> Vec<InvalidPattern> {
        let mut invalid = Vec::new();
        for signature in &self.signatures {
            for leaf in signature.rule.leaves() {
                let Some((pattern, flags)) = leaf.regex() else {
                    continue;
                };
                if let Err(error) = pattern::compile(pattern, flags) {
                    invalid.push(InvalidPattern {
                        signature_id: signature.id.clone(),
                        pattern: pattern.to_string(),
                        flags: flags.map(str::to_string),
                        error,
                    });
                }
            }
        }
        invalid
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

fn signature(id: &str, name: &str, category: Category, rule: Rule) -> ProviderSignature {
    ProviderSignature {
        id: id.to_string(),
        name: name.to_string(),
        category,
        rule,
    }
}

impl Default for Catalog {
    fn default() -> Self {
        use Category::*;

        Catalog::new(vec![
            // Hosting
            signature(
                "vercel",
                "Vercel",
                Hosting,
                Rule::any([
                    Rule::header_present("x-vercel-id"),
                    Rule::header_equals("server", "vercel"),
                ]),
            ),
            signature(
                "netlify",
                "Netlify",
                Hosting,
                Rule::any([
                    Rule::header_present("x-nf-request-id"),
                    Rule::header_equals("server", "netlify"),
                ]),
            ),
            signature(
                "github-pages",
                "GitHub Pages",
                Hosting,
                Rule::all([
                    Rule::header_equals("server", "github.com"),
                    Rule::header_present("x-github-request-id"),
                ]),
            ),
            signature(
                "cloudflare-hosting",
                "Cloudflare",
                Hosting,
                Rule::any([
                    Rule::header_present("cf-ray"),
                    Rule::header_equals("server", "cloudflare"),
                ]),
            ),
            signature(
                "aws-cloudfront",
                "Amazon CloudFront",
                Hosting,
                Rule::any([
                    Rule::header_present("x-amz-cf-id"),
                    Rule::header_includes("via", "cloudfront"),
                ]),
            ),
            signature(
                "fastly",
                "Fastly",
                Hosting,
                Rule::any([
                    Rule::header_present("x-fastly-request-id"),
                    Rule::header_includes("x-served-by", "cache-"),
                ]),
            ),
            // DNS
            signature(
                "cloudflare-dns",
                "Cloudflare",
                Dns,
                Rule::ns_suffix("ns.cloudflare.com"),
            ),
            signature(
                "route53",
                "Amazon Route 53",
                Dns,
                Rule::ns_regex(r"^ns-\d+\.awsdns-\d+\.(com|net|org|co\.uk)$", None),
            ),
            signature(
                "google-cloud-dns",
                "Google Cloud DNS",
                Dns,
                Rule::ns_regex(r"^ns-cloud-[a-e]\d+\.googledomains\.com$", None),
            ),
            signature("vercel-dns", "Vercel", Dns, Rule::ns_suffix("vercel-dns.com")),
            signature(
                "godaddy-dns",
                "GoDaddy",
                Dns,
                Rule::ns_suffix("domaincontrol.com"),
            ),
            // Email
            signature(
                "google-workspace",
                "Google Workspace",
                Email,
                Rule::any([
                    Rule::mx_suffix("google.com"),
                    Rule::mx_suffix("googlemail.com"),
                ]),
            ),
            signature(
                "microsoft-365",
                "Microsoft 365",
                Email,
                Rule::mx_suffix("mail.protection.outlook.com"),
            ),
            signature("zoho-mail", "Zoho Mail", Email, Rule::mx_regex(r"^mx\d*\.zoho\.", None)),
            signature(
                "proton-mail",
                "Proton Mail",
                Email,
                Rule::mx_suffix("protonmail.ch"),
            ),
            signature(
                "cloudflare-email-routing",
                "Cloudflare Email Routing",
                Email,
                Rule::mx_suffix("mx.cloudflare.net"),
            ),
            // Registrar
            signature(
                "godaddy",
                "GoDaddy",
                Registrar,
                Rule::registrar_includes("godaddy"),
            ),
            signature(
                "namecheap",
                "Namecheap",
                Registrar,
                Rule::registrar_includes("namecheap"),
            ),
            signature(
                "cloudflare-registrar",
                "Cloudflare",
                Registrar,
                Rule::registrar_includes("cloudflare"),
            ),
            signature(
                "markmonitor",
                "MarkMonitor",
                Registrar,
                Rule::registrar_includes("markmonitor"),
            ),
            // Certificate authorities
            signature(
                "lets-encrypt",
                "Let's Encrypt",
                Certificate,
                Rule::any([
                    Rule::issuer_includes("let's encrypt"),
                    Rule::issuer_equals("R3"),
                    Rule::issuer_equals("R10"),
                    Rule::issuer_equals("R11"),
                    Rule::issuer_equals("E5"),
                    Rule::issuer_equals("E6"),
                ]),
            ),
            signature(
                "google-trust-services",
                "Google Trust Services",
                Certificate,
                Rule::issuer_includes("google trust services"),
            ),
            signature(
                "digicert",
                "DigiCert",
                Certificate,
                Rule::issuer_includes("digicert"),
            ),
            signature(
                "sectigo",
                "Sectigo",
                Certificate,
                Rule::any([
                    Rule::issuer_includes("sectigo"),
                    Rule::issuer_includes("comodo"),
                ]),
            ),
        ])
    }
}
