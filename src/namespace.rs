//! Directive and role name resolution.
//!
//! The namespace is an immutable snapshot built once before parsing. Lookup
//! follows the docutils/Sphinx order: lowercase, language translation,
//! explicit `domain:` prefix, the default domain, the `std` domain, then the
//! top-level registry. There is no global mutable registry; callers extend
//! the snapshot through [`Namespace::add_directive`] and friends before
//! handing it to the parser.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

/// How a recognized directive is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ConversionStrategy {
    /// Argument, options and content all kept as unprocessed text.
    #[serde(rename = "direct")]
    Direct,
    /// Only the argument is parsed as inline markup.
    #[serde(rename = "parse_argument")]
    ParseArgument,
    /// Only the content is parsed, titles not allowed.
    #[serde(rename = "parse_content")]
    ParseContent,
    /// Content parsed with section titles allowed.
    #[serde(rename = "parse_content_titles")]
    ParseContentAndTitles,
    /// Argument and content both parsed.
    #[serde(rename = "parse_all")]
    ParseAll,
    /// Preserve the whole block verbatim in an `eval-rst` fence.
    #[serde(rename = "eval_rst")]
    VerbatimFallback,
}

/// Metadata needed to split a directive block into argument/options/content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSpec {
    /// Stable implementation id, the key into the conversion table.
    pub implementation: String,
    pub required_arguments: usize,
    pub optional_arguments: usize,
    /// Whether the final argument may contain whitespace.
    pub final_argument_whitespace: bool,
    pub has_content: bool,
}

impl DirectiveSpec {
    pub fn new(
        implementation: &str,
        required_arguments: usize,
        optional_arguments: usize,
        final_argument_whitespace: bool,
        has_content: bool,
    ) -> Self {
        Self {
            implementation: implementation.to_string(),
            required_arguments,
            optional_arguments,
            final_argument_whitespace,
            has_content,
        }
    }

    pub fn max_arguments(&self) -> usize {
        self.required_arguments + self.optional_arguments
    }
}

/// A named group of directives and roles (`py:`, `std:`, ...).
#[derive(Debug, Clone, Default)]
pub struct Domain {
    pub directives: HashMap<String, DirectiveSpec>,
    pub roles: HashMap<String, String>,
}

/// Immutable lookup snapshot for directive and role names.
#[derive(Debug, Clone)]
pub struct Namespace {
    directives: HashMap<String, DirectiveSpec>,
    /// Role alias to canonical name.
    roles: HashMap<String, String>,
    domains: HashMap<String, Domain>,
    /// Translated name to canonical name, per the configured language.
    translations: HashMap<String, String>,
    default_domain: Option<String>,
}

impl Namespace {
    /// Snapshot of the docutils built-in directives and roles.
    ///
    /// `language_code` other than `"en"` has no built-in translation table;
    /// use [`add_translation`](Self::add_translation) to supply one.
    pub fn builtin(language_code: &str, default_domain: Option<&str>) -> Self {
        let _ = language_code;
        let mut ns = Self {
            directives: HashMap::new(),
            roles: HashMap::new(),
            domains: HashMap::new(),
            translations: HashMap::new(),
            default_domain: default_domain.map(str::to_string),
        };
        ns.register_builtin_directives();
        ns.register_builtin_roles();
        ns
    }

    pub fn add_directive(&mut self, name: &str, spec: DirectiveSpec) {
        self.directives.insert(name.to_string(), spec);
    }

    pub fn add_role(&mut self, alias: &str, canonical: &str) {
        self.roles
            .insert(alias.to_string(), canonical.to_string());
    }

    pub fn add_domain(&mut self, name: &str, domain: Domain) {
        self.domains.insert(name.to_string(), domain);
    }

    pub fn add_translation(&mut self, translated: &str, canonical: &str) {
        self.translations
            .insert(translated.to_string(), canonical.to_string());
    }

    fn canonicalize(&self, name: &str) -> String {
        let lower = name.to_lowercase();
        match self.translations.get(&lower) {
            Some(canonical) => canonical.clone(),
            None => lower,
        }
    }

    /// Resolve a directive name to its spec, or `None` for the verbatim
    /// fallback path.
    pub fn directive(&self, name: &str) -> Option<&DirectiveSpec> {
        let canonical = self.canonicalize(name);

        if let Some((domain_name, element)) = canonical.split_once(':') {
            if let Some(domain) = self.domains.get(domain_name)
                && let Some(spec) = domain.directives.get(element)
            {
                return Some(spec);
            }
        } else if let Some(default) = &self.default_domain
            && let Some(domain) = self.domains.get(default)
            && let Some(spec) = domain.directives.get(&canonical)
        {
            return Some(spec);
        }

        if let Some(domain) = self.domains.get("std")
            && let Some(spec) = domain.directives.get(&canonical)
        {
            return Some(spec);
        }

        self.directives.get(&canonical)
    }

    /// Resolve a role alias to its canonical name.
    pub fn role(&self, name: &str) -> Option<&str> {
        let canonical = self.canonicalize(name);

        if let Some((domain_name, element)) = canonical.split_once(':') {
            if let Some(domain) = self.domains.get(domain_name)
                && let Some(role) = domain.roles.get(element)
            {
                return Some(role);
            }
        } else if let Some(default) = &self.default_domain
            && let Some(domain) = self.domains.get(default)
            && let Some(role) = domain.roles.get(&canonical)
        {
            return Some(role);
        }

        if let Some(domain) = self.domains.get("std")
            && let Some(role) = domain.roles.get(&canonical)
        {
            return Some(role);
        }

        self.roles.get(&canonical).map(String::as_str)
    }

    /// All registered directive names, domain-qualified ones included.
    pub fn list_directives(&self) -> Vec<String> {
        let mut top: Vec<String> = self.directives.keys().cloned().collect();
        top.sort();
        let mut qualified: Vec<String> = self
            .domains
            .iter()
            .flat_map(|(prefix, domain)| {
                domain
                    .directives
                    .keys()
                    .map(move |name| format!("{prefix}:{name}"))
            })
            .collect();
        qualified.sort();
        top.extend(qualified);
        top
    }

    /// All registered role names, domain-qualified ones included.
    pub fn list_roles(&self) -> Vec<String> {
        let mut top: Vec<String> = self.roles.keys().cloned().collect();
        top.sort();
        let mut qualified: Vec<String> = self
            .domains
            .iter()
            .flat_map(|(prefix, domain)| {
                domain
                    .roles
                    .keys()
                    .map(move |name| format!("{prefix}:{name}"))
            })
            .collect();
        qualified.sort();
        top.extend(qualified);
        top
    }

    fn register_builtin_directives(&mut self) {
        // (name, implementation id, required, optional, final-ws, content)
        let specs: &[(&str, &str, usize, usize, bool, bool)] = &[
            ("attention", "admonitions.Attention", 0, 0, false, true),
            ("caution", "admonitions.Caution", 0, 0, false, true),
            ("danger", "admonitions.Danger", 0, 0, false, true),
            ("error", "admonitions.Error", 0, 0, false, true),
            ("hint", "admonitions.Hint", 0, 0, false, true),
            ("important", "admonitions.Important", 0, 0, false, true),
            ("note", "admonitions.Note", 0, 0, false, true),
            ("tip", "admonitions.Tip", 0, 0, false, true),
            ("warning", "admonitions.Warning", 0, 0, false, true),
            ("admonition", "admonitions.Admonition", 1, 0, true, true),
            ("topic", "body.Topic", 1, 0, true, true),
            ("sidebar", "body.Sidebar", 1, 0, true, true),
            ("line-block", "body.LineBlock", 0, 0, false, true),
            ("parsed-literal", "body.ParsedLiteral", 0, 0, false, true),
            ("math", "body.MathBlock", 0, 1, true, true),
            ("rubric", "body.Rubric", 1, 0, true, false),
            ("epigraph", "body.Epigraph", 0, 0, false, true),
            ("highlights", "body.Highlights", 0, 0, false, true),
            ("pull-quote", "body.PullQuote", 0, 0, false, true),
            ("compound", "body.Compound", 0, 0, false, true),
            ("container", "body.Container", 0, 1, true, true),
            ("code", "body.CodeBlock", 0, 1, false, true),
            ("image", "images.Image", 1, 0, true, false),
            ("figure", "images.Figure", 1, 0, true, true),
            ("include", "misc.Include", 1, 0, true, false),
            ("raw", "misc.Raw", 0, 2, false, true),
            ("replace", "misc.Replace", 0, 0, false, true),
            ("unicode", "misc.Unicode", 1, 0, true, false),
            ("class", "misc.Class", 1, 0, false, true),
            ("role", "misc.Role", 1, 0, false, true),
            ("default-role", "misc.DefaultRole", 0, 1, false, false),
            ("title", "misc.Title", 1, 0, true, false),
            ("date", "misc.Date", 0, 1, true, false),
            ("meta", "html.Meta", 0, 0, false, true),
            ("contents", "parts.Contents", 0, 1, true, false),
            ("sectnum", "parts.Sectnum", 0, 0, false, false),
            ("section-numbering", "parts.Sectnum", 0, 0, false, false),
            ("header", "parts.Header", 0, 0, false, true),
            ("footer", "parts.Footer", 0, 0, false, true),
            ("target-notes", "references.TargetNotes", 0, 0, false, false),
            ("table", "tables.RSTTable", 0, 1, true, true),
            ("csv-table", "tables.CSVTable", 0, 1, true, true),
            ("list-table", "tables.ListTable", 0, 1, true, true),
        ];
        for &(name, implementation, req, opt, ws, content) in specs {
            self.add_directive(
                name,
                DirectiveSpec::new(implementation, req, opt, ws, content),
            );
        }
    }

    fn register_builtin_roles(&mut self) {
        let roles: &[(&str, &str)] = &[
            ("abbreviation", "abbreviation"),
            ("ab", "abbreviation"),
            ("acronym", "acronym"),
            ("ac", "acronym"),
            ("code", "code"),
            ("emphasis", "emphasis"),
            ("literal", "literal"),
            ("math", "math"),
            ("pep-reference", "pep-reference"),
            ("pep", "pep-reference"),
            ("rfc-reference", "rfc-reference"),
            ("rfc", "rfc-reference"),
            ("strong", "strong"),
            ("subscript", "subscript"),
            ("sub", "subscript"),
            ("superscript", "superscript"),
            ("sup", "superscript"),
            ("title-reference", "title-reference"),
            ("title", "title-reference"),
            ("t", "title-reference"),
            ("raw", "raw"),
            ("index", "index"),
            ("i", "index"),
        ];
        for &(alias, canonical) in roles {
            self.add_role(alias, canonical);
        }
    }
}

/// Implementation id to conversion strategy, defaults merged under caller
/// overrides. Deserializable so callers can load overrides from YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct ConversionTable {
    entries: BTreeMap<String, ConversionStrategy>,
}

impl Default for ConversionTable {
    fn default() -> Self {
        use ConversionStrategy::*;
        let defaults: &[(&str, ConversionStrategy)] = &[
            ("admonitions.Attention", ParseAll),
            ("admonitions.Caution", ParseAll),
            ("admonitions.Danger", ParseAll),
            ("admonitions.Error", ParseAll),
            ("admonitions.Hint", ParseAll),
            ("admonitions.Important", ParseAll),
            ("admonitions.Note", ParseAll),
            ("admonitions.Tip", ParseAll),
            ("admonitions.Warning", ParseAll),
            ("admonitions.Admonition", ParseAll),
            ("body.Topic", ParseAll),
            ("body.Sidebar", ParseAll),
            ("body.Epigraph", ParseContent),
            ("body.Highlights", ParseContent),
            ("body.PullQuote", ParseContent),
            ("body.Compound", ParseContent),
            ("body.Container", ParseContent),
            ("body.MathBlock", Direct),
            ("body.Rubric", ParseArgument),
            ("body.CodeBlock", Direct),
            ("images.Image", Direct),
            ("images.Figure", ParseAll),
            ("misc.Replace", ParseContent),
            ("misc.Date", Direct),
        ];
        Self {
            entries: defaults
                .iter()
                .map(|&(key, strategy)| (key.to_string(), strategy))
                .collect(),
        }
    }
}

impl ConversionTable {
    /// Strategy for a directive, `VerbatimFallback` when unmapped.
    pub fn strategy(&self, implementation: &str) -> ConversionStrategy {
        self.entries
            .get(implementation)
            .copied()
            .unwrap_or(ConversionStrategy::VerbatimFallback)
    }

    /// Overlay caller entries over the defaults.
    pub fn merge(&mut self, overrides: ConversionTable) {
        self.entries.extend(overrides.entries);
    }

    pub fn insert(&mut self, implementation: &str, strategy: ConversionStrategy) {
        self.entries.insert(implementation.to_string(), strategy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_directive_lookup_is_case_insensitive() {
        let ns = Namespace::builtin("en", Some("py"));
        let spec = ns.directive("NOTE").unwrap();
        assert_eq!(spec.implementation, "admonitions.Note");
        assert!(spec.has_content);
    }

    #[test]
    fn unknown_directive_resolves_to_none() {
        let ns = Namespace::builtin("en", Some("py"));
        assert!(ns.directive("autosummary").is_none());
    }

    #[test]
    fn domain_lookup_order() {
        let mut ns = Namespace::builtin("en", Some("py"));
        let mut py = Domain::default();
        py.directives.insert(
            "function".into(),
            DirectiveSpec::new("domains.python.PyFunction", 1, 0, true, true),
        );
        ns.add_domain("py", py);
        // default domain tried without the prefix
        assert!(ns.directive("function").is_some());
        assert!(ns.directive("py:function").is_some());
        assert!(ns.directive("rb:function").is_none());
    }

    #[test]
    fn translation_applies_before_lookup() {
        let mut ns = Namespace::builtin("fr", Some("py"));
        ns.add_translation("astuce", "tip");
        assert_eq!(
            ns.directive("Astuce").unwrap().implementation,
            "admonitions.Tip"
        );
    }

    #[test]
    fn role_aliases_resolve_to_canonical() {
        let ns = Namespace::builtin("en", Some("py"));
        assert_eq!(ns.role("SUB"), Some("subscript"));
        assert_eq!(ns.role("math"), Some("math"));
        assert_eq!(ns.role("py:func"), None);
    }

    #[test]
    fn list_roles_covers_aliases() {
        let ns = Namespace::builtin("en", Some("py"));
        let roles = ns.list_roles();
        assert!(roles.contains(&"sup".to_string()));
        assert!(roles.contains(&"superscript".to_string()));
        assert!(roles.contains(&"title-reference".to_string()));
    }

    #[test]
    fn conversion_table_merges_overrides() {
        let mut table = ConversionTable::default();
        assert_eq!(table.strategy("images.Image"), ConversionStrategy::Direct);
        assert_eq!(
            table.strategy("sphinx.Autosummary"),
            ConversionStrategy::VerbatimFallback
        );
        table.insert("images.Image", ConversionStrategy::VerbatimFallback);
        assert_eq!(
            table.strategy("images.Image"),
            ConversionStrategy::VerbatimFallback
        );
    }

    #[test]
    fn conversion_table_deserializes_strategy_names() {
        let table: ConversionTable =
            serde_yaml::from_str("x.Custom: parse_all\ny.Other: eval_rst\n").unwrap();
        assert_eq!(table.strategy("x.Custom"), ConversionStrategy::ParseAll);
        assert_eq!(
            table.strategy("y.Other"),
            ConversionStrategy::VerbatimFallback
        );
    }

    #[test]
    fn list_directives_includes_domain_qualified_names() {
        let mut ns = Namespace::builtin("en", None);
        let mut std_domain = Domain::default();
        std_domain.directives.insert(
            "glossary".into(),
            DirectiveSpec::new("domains.std.Glossary", 0, 0, false, true),
        );
        ns.add_domain("std", std_domain);
        let names = ns.list_directives();
        assert!(names.contains(&"note".to_string()));
        assert!(names.contains(&"std:glossary".to_string()));
    }
}
