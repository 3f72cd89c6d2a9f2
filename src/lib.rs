pub mod block;
pub mod config;
pub mod error;
pub mod inline;
pub mod lowering;
pub mod namespace;
pub mod nodes;
pub mod serializer;
pub mod tokens;
pub mod transforms;

pub use config::Config;
pub use config::ConfigBuilder;
pub use error::ConvertError;
pub use error::Diagnostic;
pub use lowering::Environment;
pub use lowering::Extension;
pub use lowering::LinkDefinition;
pub use namespace::ConversionStrategy;
pub use namespace::ConversionTable;
pub use namespace::Namespace;

use std::collections::BTreeSet;

use nodes::Node;
use tokens::Token;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn detect_line_ending(input: &str) -> &str {
    let rn_pos = input.find("\r\n");
    let n_pos = input.find('\n');

    if let (Some(rn), Some(n)) = (rn_pos, n_pos) {
        if rn < n {
            return "\r\n";
        }
    } else if rn_pos.is_some() {
        return "\r\n";
    }

    "\n"
}

/// Everything a conversion produces besides the text itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedOutput {
    pub text: String,
    pub tokens: Vec<Token>,
    pub env: Environment,
    pub diagnostics: Vec<Diagnostic>,
    /// MyST parser extensions the output text relies on.
    pub extensions: BTreeSet<Extension>,
}

/// Parses a source into the typed tree with all transforms applied.
///
/// Useful for callers that want to inspect or rewrite the tree before
/// lowering it themselves.
pub fn to_tree(input: &str, config: &Config) -> (Node, Vec<Diagnostic>) {
    let namespace = Namespace::builtin(&config.language_code, config.default_domain.as_deref());
    to_tree_with(input, config, &namespace, &ConversionTable::default())
}

/// Like [`to_tree`], with a caller-built namespace snapshot and conversion
/// table (overrides merged over [`ConversionTable::default`]).
pub fn to_tree_with(
    input: &str,
    config: &Config,
    namespace: &Namespace,
    conversions: &ConversionTable,
) -> (Node, Vec<Diagnostic>) {
    #[cfg(debug_assertions)]
    {
        init_logger();
    }

    let normalized_input = input.replace("\r\n", "\n");
    let parser = block::BlockParser::new(config, namespace, conversions);

    let mut diagnostics = Vec::new();
    let mut document = parser.parse(&normalized_input, &mut diagnostics);
    transforms::apply_transforms(&mut document, config, &mut diagnostics);
    (document, diagnostics)
}

/// Converts a reStructuredText source to MyST Markdown.
///
/// The conversion never fails on malformed input; unconvertible constructs
/// degrade to verbatim `{eval-rst}` fences and a [`Diagnostic`] is recorded
/// for each. With [`Config::raise_on_error`] set, the first diagnostic
/// aborts the conversion instead.
///
/// # Arguments
///
/// * `input` - The reStructuredText content to convert
/// * `config` - Conversion options (defaults to [`Config::default`])
pub fn convert(input: &str, config: Option<Config>) -> Result<ConvertedOutput, ConvertError> {
    let config = config.unwrap_or_default();
    let namespace = Namespace::builtin(&config.language_code, config.default_domain.as_deref());
    convert_with(input, &config, &namespace, &ConversionTable::default())
}

/// Like [`convert`], with a caller-built namespace snapshot and conversion
/// table. The snapshot is treated as immutable; building it is the caller's
/// concern.
pub fn convert_with(
    input: &str,
    config: &Config,
    namespace: &Namespace,
    conversions: &ConversionTable,
) -> Result<ConvertedOutput, ConvertError> {
    let line_ending = detect_line_ending(input);

    let (document, mut diagnostics) = to_tree_with(input, config, namespace, conversions);
    let (tokens, env) = lowering::lower(&document, config, namespace, &mut diagnostics)?;
    let extensions = lowering::required_extensions(&tokens);
    let text = serializer::serialize(&tokens, &env, config);

    if config.raise_on_error
        && let Some(diag) = diagnostics.first()
    {
        return Err(ConvertError::Strict(diag.clone()));
    }

    let text = if line_ending == "\r\n" {
        text.replace('\n', "\r\n")
    } else {
        text
    };
    Ok(ConvertedOutput {
        text,
        tokens,
        env,
        diagnostics,
        extensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_simple_document() {
        let out = convert("Title\n=====\n\nSome *text*.\n", None).unwrap();
        assert_eq!(out.text, "# Title\n\nSome *text*.\n");
        assert!(out.diagnostics.is_empty());
        assert!(out.extensions.is_empty());
    }

    #[test]
    fn crlf_input_round_trips_line_ending() {
        let out = convert("one\r\n\r\ntwo\r\n", None).unwrap();
        assert_eq!(out.text, "one\r\n\r\ntwo\r\n");
    }

    #[test]
    fn raise_on_error_aborts_on_first_diagnostic() {
        let config = Config::builder().raise_on_error(true).build();
        let err = convert("bad__ reference\n", Some(config)).unwrap_err();
        assert!(matches!(err, ConvertError::Strict(_)));
    }

    #[test]
    fn lenient_mode_collects_diagnostics() {
        let out = convert("bad__ reference\n", None).unwrap();
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.text, "bad__ reference\n");
    }

    #[test]
    fn conversion_table_overrides_apply() {
        let config = Config::default();
        let namespace =
            Namespace::builtin(&config.language_code, config.default_domain.as_deref());
        let mut conversions = ConversionTable::default();
        conversions.insert("admonitions.Note", ConversionStrategy::VerbatimFallback);
        let out = convert_with(".. note:: Careful.\n", &config, &namespace, &conversions).unwrap();
        assert!(out.text.contains("{eval-rst}"));
        assert!(out.text.contains(".. note:: Careful."));
    }

    #[test]
    fn extensions_reported_for_colon_fences() {
        let out = convert(".. note:: Careful.\n", None).unwrap();
        assert!(out.extensions.contains(&Extension::ColonFence));
    }
}
