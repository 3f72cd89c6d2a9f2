use serde::Deserialize;

/// Conversion parameters.
///
/// All fields have sensible defaults; use [`ConfigBuilder`] to override
/// individual ones. File/CLI handling is out of scope for this crate, but the
/// struct is deserializable so callers can load it from their own config
/// layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language code used for directive/role name translation.
    pub language_code: String,
    /// Default domain, tried for unprefixed directive/role names.
    pub default_domain: Option<String>,
    /// Role applied to bare interpreted text. When unset, bare interpreted
    /// text renders as a literal code span.
    pub default_role: Option<String>,
    /// Prefix added to citation labels, to keep them apart from footnotes.
    pub cite_prefix: String,
    /// Renumber ordered list items consecutively (1. 2. 3.) on output.
    pub consecutive_numbering: bool,
    /// Use colon fences for directives with parsed (Markdown) content.
    pub colon_fences: bool,
    /// Render `:math:` roles as dollar-delimited math.
    pub dollar_math: bool,
    /// Treat a leading field list as front matter.
    pub front_matter: bool,
    /// Recognize `PEP 287` style references in plain text.
    pub pep_references: bool,
    /// Recognize `RFC 2822` style references in plain text.
    pub rfc_references: bool,
    /// Strict mode: abort on the first warning instead of collecting it.
    pub raise_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language_code: "en".into(),
            default_domain: Some("py".into()),
            default_role: None,
            cite_prefix: "cite_".into(),
            consecutive_numbering: true,
            colon_fences: true,
            dollar_math: true,
            front_matter: true,
            pep_references: false,
            rfc_references: false,
            raise_on_error: false,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn language_code(mut self, code: impl Into<String>) -> Self {
        self.config.language_code = code.into();
        self
    }

    pub fn default_domain(mut self, domain: Option<String>) -> Self {
        self.config.default_domain = domain;
        self
    }

    pub fn default_role(mut self, role: Option<String>) -> Self {
        self.config.default_role = role;
        self
    }

    pub fn cite_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.cite_prefix = prefix.into();
        self
    }

    pub fn consecutive_numbering(mut self, on: bool) -> Self {
        self.config.consecutive_numbering = on;
        self
    }

    pub fn colon_fences(mut self, on: bool) -> Self {
        self.config.colon_fences = on;
        self
    }

    pub fn dollar_math(mut self, on: bool) -> Self {
        self.config.dollar_math = on;
        self
    }

    pub fn front_matter(mut self, on: bool) -> Self {
        self.config.front_matter = on;
        self
    }

    pub fn pep_references(mut self, on: bool) -> Self {
        self.config.pep_references = on;
        self
    }

    pub fn rfc_references(mut self, on: bool) -> Self {
        self.config.rfc_references = on;
        self
    }

    pub fn raise_on_error(mut self, on: bool) -> Self {
        self.config.raise_on_error = on;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::builder()
            .dollar_math(false)
            .cite_prefix("ref_")
            .build();
        assert!(!config.dollar_math);
        assert_eq!(config.cite_prefix, "ref_");
        assert!(config.colon_fences);
    }

    #[test]
    fn deserializes_partial() {
        let config: Config =
            serde_yaml::from_str("colon_fences: false\ndefault_role: any\n").unwrap();
        assert!(!config.colon_fences);
        assert_eq!(config.default_role.as_deref(), Some("any"));
        assert_eq!(config.language_code, "en");
    }
}
