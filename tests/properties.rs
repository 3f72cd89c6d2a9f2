//! Structural invariants that must hold for any input.

use rst2myst::tokens::{inline_capture_holds, nesting_balance, Token};
use rst2myst::{convert, to_tree, Config};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const SAMPLES: &[&str] = &[
    "plain paragraph\n",
    "Title\n=====\n\nSub\n---\n\ntext\n",
    "- a\n- b\n\n  extra\n",
    "1. one\n2. two\n",
    ".. note:: careful\n",
    ".. foo:: unknown\n",
    "term\n    definition\n",
    "See `x`_ and [1]_.\n\n.. _x: http://a\n.. [1] note\n",
    "+-----+-----+\n| a   | b   |\n+=====+=====+\n| c   | d   |\n+-----+-----+\n",
    ":field: value\n\nbody\n",
    "|sub| here\n\n.. |sub| replace:: text\n",
    "   quoted\n\n   -- someone\n",
];

/// Running nesting sum stays non-negative and ends at zero.
fn prefix_balanced(tokens: &[Token]) -> bool {
    let mut depth = 0i32;
    for token in tokens {
        depth += i32::from(token.nesting);
        if depth < 0 {
            return false;
        }
        if let Some(children) = &token.children
            && !prefix_balanced(children)
        {
            return false;
        }
    }
    depth == 0
}

#[test]
fn token_streams_are_balanced() {
    init_logger();
    for sample in SAMPLES {
        let out = convert(sample, None).expect(sample);
        assert_eq!(nesting_balance(&out.tokens), 0, "input: {sample:?}");
        assert!(prefix_balanced(&out.tokens), "input: {sample:?}");
    }
}

#[test]
fn inline_capture_holds_everywhere() {
    init_logger();
    for sample in SAMPLES {
        let out = convert(sample, None).expect(sample);
        assert!(inline_capture_holds(&out.tokens), "input: {sample:?}");
    }
}

#[test]
fn transforms_are_idempotent() {
    init_logger();
    let config = Config::default();
    for sample in SAMPLES {
        let (tree, _) = to_tree(sample, &config);
        let again = {
            let mut tree = tree.clone();
            let mut diags = Vec::new();
            rst2myst::transforms::apply_transforms(&mut tree, &config, &mut diags);
            tree
        };
        assert_eq!(tree, again, "input: {sample:?}");
    }
}

#[test]
fn fences_always_exceed_content_runs() {
    init_logger();
    let inner = "````\nnested\n````";
    let input = format!(".. foo::\n\n   {}\n", inner.replace('\n', "\n   "));
    let out = convert(&input, None).unwrap();
    let fence_line = out
        .text
        .lines()
        .find(|l| l.contains("{eval-rst}"))
        .expect("verbatim fence expected");
    let run = fence_line.chars().take_while(|c| *c == '`').count();
    assert!(run > 4, "fence {run} not longer than content run");
}

#[test]
fn reference_definitions_are_deterministic() {
    init_logger();
    let input = "`x`_ `x`_\n\n.. _x: http://a\n.. _x: http://b\n";
    let first = convert(input, None).unwrap();
    let second = convert(input, None).unwrap();
    assert_eq!(first.text, second.text);
    let defs: Vec<&str> = first
        .text
        .lines()
        .filter(|l| l.starts_with("[x]:"))
        .collect();
    assert_eq!(defs, ["[x]: http://a"]);
}

#[test]
fn conversion_never_panics_on_fragments() {
    init_logger();
    let fragments = [
        "", "\n", ".. ", ":", "::", "`", "``", "__", ".. [", "+--", "===\n",
        "a\n=\n", "* ", ".. |x|", ".. _:", "| ",
    ];
    for fragment in fragments {
        let _ = convert(fragment, None);
    }
}
