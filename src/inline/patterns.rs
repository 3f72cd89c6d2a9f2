//! Compiled regular expressions for inline markup.
//!
//! The `regex` engine has no look-around, so the context assertions that the
//! reStructuredText grammar attaches to these patterns (what may precede a
//! start-string, what may follow an end-string) are not part of the patterns.
//! The scanner checks them explicitly via [`super::punctuation`] and restarts
//! the search one character further on failure, which is equivalent to a
//! pattern whose zero-width assertion failed.

use std::sync::LazyLock;

use regex::Regex;

/// Alphanumerics with isolated internal `[-._+:]` characters, never starting
/// or ending on an underscore run.
pub const SIMPLENAME: &str = r"[\w&&[^_]]+(?:[-._+:][\w&&[^_]]+)*";

/// URI characters per RFC 2396/2732; `\x00` admits backslash escapes.
const URIC: &str = r"[-_.!~*'()\[\];/:@&=+$,%a-zA-Z0-9\x00]";
/// Characters a URI may end on (no trailing punctuation).
const URILAST: &str = r"[_~*/=+a-zA-Z0-9]";
const EMAILC: &str = r"[-_!~*'{|}/#?^`&=+$%a-zA-Z0-9\x00]";

pub struct Regexes {
    /// Master candidate pattern: start-strings, whole constructs
    /// (simple/anonymous references, footnote/citation references) and
    /// role-prefixed backquotes.
    pub initial: Regex,
    pub emphasis_end: Regex,
    pub strong_end: Regex,
    pub literal_end: Regex,
    pub target_end: Regex,
    pub substitution_end: Regex,
    /// End of interpreted text or phrase reference, with optional role
    /// suffix and reference suffix.
    pub interpreted_end: Regex,
    /// Embedded `<target>` at the end of a phrase reference.
    pub embedded_link: Regex,
    pub email: Regex,
    pub uri: Regex,
    pub pep: Regex,
    pub rfc: Regex,
}

fn email_pattern() -> String {
    format!("{EMAILC}+(?:\\.{EMAILC}+)*@{EMAILC}+(?:\\.{EMAILC}*)*{URILAST}")
}

impl Regexes {
    fn new() -> Self {
        let sn = SIMPLENAME;
        let email = email_pattern();
        let initial = format!(
            "(?P<start>\\*\\*|\\*|``|_`|\\|)\
             |(?P<refname>{sn})(?P<refend>__?)\
             |\\[(?P<footlabel>[0-9]+|\\#(?:{sn})?|\\*|(?P<citlabel>{sn}))(?P<fnend>\\]_)\
             |(?P<role>:{sn}:)?(?P<backquote>`)"
        );
        let uri = format!(
            "(?P<whole>(?P<absolute>(?P<scheme>[a-zA-Z][a-zA-Z0-9.+-]*):\
             (?://?)?{URIC}*{URILAST}\
             (?:\\?{URIC}*{URILAST})?\
             (?:\\#{URIC}*{URILAST})?)\
             |(?P<email>{email}))"
        );
        Self {
            initial: Regex::new(&initial).expect("initial pattern"),
            emphasis_end: Regex::new(r"\*").expect("emphasis end"),
            strong_end: Regex::new(r"\*\*").expect("strong end"),
            literal_end: Regex::new("``").expect("literal end"),
            target_end: Regex::new("`").expect("target end"),
            substitution_end: Regex::new(r"\|_{0,2}").expect("substitution end"),
            interpreted_end: Regex::new(&format!(
                "`(?P<suffix>(?P<endrole>:{sn}:)?(?P<endrefend>__?)?)"
            ))
            .expect("interpreted end"),
            embedded_link: Regex::new(
                "(?P<elwhole>(?:[ \\n]+|^)<(?P<elinner>(?:[^<>]|\\x00[<>])+)>)$",
            )
            .expect("embedded link"),
            email: Regex::new(&format!("^(?:{email})$")).expect("email"),
            uri: Regex::new(&uri).expect("uri"),
            pep: Regex::new(r"(?:pep-(?P<pepnum1>[0-9]+)(?:\.txt)?)|(?:PEP\s+(?P<pepnum2>[0-9]+))")
                .expect("pep"),
            rfc: Regex::new(r"RFC(?:-|\s+)?(?P<rfcnum>[0-9]+)").expect("rfc"),
        }
    }

    /// Whether `text` starts with something URI-shaped (prefix match).
    pub fn uri_prefix_match(&self, text: &str) -> bool {
        self.uri.find(text).is_some_and(|m| m.start() == 0)
    }

    /// Full-string email address check. The escape placeholder may not
    /// immediately precede the `@`.
    pub fn is_email(&self, text: &str) -> bool {
        if !self.email.is_match(text) {
            return false;
        }
        match text.find('@') {
            Some(at) => !text[..at].ends_with('\0'),
            None => false,
        }
    }
}

static REGEXES: LazyLock<Regexes> = LazyLock::new(Regexes::new);

pub fn regexes() -> &'static Regexes {
    &REGEXES
}

/// URI schemes recognized for standalone hyperlinks.
pub const SCHEMES: &[&str] = &[
    "about", "acap", "addbook", "afp", "afs", "aim", "callto", "castanet",
    "chttp", "cid", "crid", "data", "dav", "dict", "dns", "doi", "eid", "fax",
    "feed", "file", "finger", "freenet", "ftp", "go", "gopher", "gsm-sms",
    "h323", "h324", "hdl", "hnews", "http", "https", "iioploc", "ilu", "im",
    "imap", "info", "ior", "ipp", "irc", "iris.beep", "iseek", "jar",
    "javascript", "jdbc", "ldap", "lifn", "livescript", "lrq", "mailbox",
    "mailserver", "mailto", "md5", "mid", "mocha", "modem", "mtqp", "mupdate",
    "news", "nfs", "nntp", "opaquelocktoken", "phone", "pop", "pop3", "pres",
    "printer", "prospero", "rdar", "res", "rtsp", "rvp", "rwhois", "rx",
    "sdp", "service", "shttp", "sip", "sips", "smb", "snews", "snmp",
    "soap.beep", "soap.beeps", "ssh", "t120", "tag", "tcp", "tel", "telephone",
    "telnet", "tftp", "tip", "tn3270", "tv", "urn", "uuid", "vemmi",
    "videotex", "view-source", "wais", "whodp", "whois++", "x-man-page",
    "xmlrpc.beep", "xmlrpc.beeps", "z39.50r", "z39.50s",
];

pub fn known_scheme(scheme: &str) -> bool {
    let lower = scheme.to_lowercase();
    SCHEMES.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplename_rejects_leading_underscore() {
        let re = Regex::new(&format!("^{SIMPLENAME}$")).unwrap();
        assert!(re.is_match("a-b.c"));
        assert!(re.is_match("py:func"));
        assert!(!re.is_match("_name"));
        assert!(!re.is_match("a--b"));
    }

    #[test]
    fn initial_finds_strong_before_emphasis() {
        let caps = regexes().initial.captures("see **bold**").unwrap();
        assert_eq!(caps.name("start").unwrap().as_str(), "**");
    }

    #[test]
    fn initial_finds_role_prefixed_backquote() {
        let caps = regexes().initial.captures(":math:`x`").unwrap();
        assert_eq!(caps.name("role").unwrap().as_str(), ":math:");
        assert!(caps.name("backquote").is_some());
    }

    #[test]
    fn initial_finds_footnote_and_citation_labels() {
        let caps = regexes().initial.captures("[#note]_").unwrap();
        assert_eq!(caps.name("footlabel").unwrap().as_str(), "#note");
        assert!(caps.name("citlabel").is_none());

        let caps = regexes().initial.captures("[CIT2002]_").unwrap();
        assert!(caps.name("citlabel").is_some());
    }

    #[test]
    fn uri_drops_trailing_punctuation() {
        let m = regexes().uri.find("http://example.com/path.").unwrap();
        assert_eq!(m.as_str(), "http://example.com/path");
    }

    #[test]
    fn email_detection() {
        assert!(regexes().is_email("user@example.com"));
        assert!(!regexes().is_email("not an email"));
    }
}
