//! Extraction of usable content from raw model responses.

use once_cell::sync::Lazy;
use regex::Regex;

/// Returned by [`extract_section`] when the start marker is missing.
pub const NOT_DOCUMENTED: &str = "No changes documented";

/// Words that open a conversational first line ("Here is the refactored code:").
const PREAMBLE_WORDS: &[&str] = &["Here", "Sure", "Certainly", "Below"];

static REASONING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid reasoning regex"));

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+#.\-]*[ \t]*\r?\n(.*?)```").expect("valid code fence regex")
});

static LEADING_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*][ \t]*").expect("valid bullet regex"));

/// Extracts source code from a raw model response.
///
/// # Algorithm
///
/// 1. Removes every `<think>...</think>` reasoning block
/// 2. If fenced code blocks exist, joins their trimmed bodies with a blank line
/// 3. Otherwise drops one leading preamble line ("Here is ...") and trims
///
/// Never fails. An empty string means the response had nothing usable.
#[must_use]
pub fn clean_code_content(response: &str) -> String {
    let without_reasoning = REASONING_BLOCK.replace_all(response, "");

    let blocks: Vec<&str> = CODE_FENCE
        .captures_iter(&without_reasoning)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    if !blocks.is_empty() {
        return blocks.join("\n\n").trim().to_string();
    }

    strip_preamble(&without_reasoning).trim().to_string()
}

fn strip_preamble(text: &str) -> &str {
    let text = text.trim_start();
    let first_line_end = text.find('\n').unwrap_or(text.len());
    let first_line = &text[..first_line_end];

    if PREAMBLE_WORDS.iter().any(|word| first_line.starts_with(word)) {
        &text[first_line_end..]
    } else {
        text
    }
}

/// Returns the text between `start_marker` and the next `end_marker`.
///
/// Runs to the end of the text when the end marker is missing. Leading `-`/`*`
/// bullets are removed from every line and the result is trimmed. Returns
/// [`NOT_DOCUMENTED`] when the start marker is absent.
#[must_use]
pub fn extract_section(text: &str, start_marker: &str, end_marker: &str) -> String {
    let Some(start) = text.find(start_marker) else {
        return NOT_DOCUMENTED.to_string();
    };

    let body = &text[start + start_marker.len()..];
    let body = match body.find(end_marker) {
        Some(end) if !end_marker.is_empty() => &body[..end],
        _ => body,
    };

    LEADING_BULLET.replace_all(body.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_fenced_block() {
        let response = "Here you go:\n```python\nprint('hi')\n```\nCHANGES_START\n- x\nCHANGES_END";
        assert_eq!(clean_code_content(response), "print('hi')");
    }

    #[test]
    fn test_multiple_blocks_joined_by_blank_line() {
        let response = "```java\n  class A {}  \n```\ntext\n```\nclass B {}\n```";
        assert_eq!(clean_code_content(response), "class A {}\n\nclass B {}");
    }

    #[test]
    fn test_reasoning_removed_before_fences() {
        let response = "<think>\nmaybe ```python\nwrong()\n``` here\n</think>\n```python\nright()\n```";
        assert_eq!(clean_code_content(response), "right()");
    }

    #[test]
    fn test_reasoning_removed_anywhere() {
        let response = "```js\na();\n```\n<think>plan\n```js\nb();\n```</think>";
        assert_eq!(clean_code_content(response), "a();");
    }

    #[test]
    fn test_untagged_and_unknown_language_fences() {
        let response = "```rust\nfn a() {}\n```\n```\nfn b() {}\n```";
        assert_eq!(clean_code_content(response), "fn a() {}\n\nfn b() {}");
    }

    #[test]
    fn test_fallback_strips_one_preamble_line() {
        let response = "Here is the code:\nx = 1\nHere = 2\n";
        assert_eq!(clean_code_content(response), "x = 1\nHere = 2");
    }

    #[test]
    fn test_fallback_without_preamble_only_trims() {
        let response = "\n\n  x = 1\ny = 2  \n";
        assert_eq!(clean_code_content(response), "x = 1\ny = 2");
    }

    #[test]
    fn test_empty_result_is_allowed() {
        assert_eq!(clean_code_content("<think>only thoughts</think>"), "");
        assert_eq!(clean_code_content("Here is nothing"), "");
    }

    #[test]
    fn test_extract_section_basic() {
        assert_eq!(extract_section("A_STARTfooA_END", "A_START", "A_END"), "foo");
    }

    #[test]
    fn test_extract_section_missing_start() {
        for end in ["CHANGES_END", "", "anything"] {
            assert_eq!(extract_section("no markers here", "CHANGES_START", end), NOT_DOCUMENTED);
        }
    }

    #[test]
    fn test_extract_section_strips_bullets() {
        let text = "CHANGES_START\n- first change\n* second change\n  -   third\nCHANGES_END";
        assert_eq!(
            extract_section(text, "CHANGES_START", "CHANGES_END"),
            "first change\nsecond change\nthird"
        );
    }

    #[test]
    fn test_extract_section_runs_to_end_without_end_marker() {
        let text = "NEXT_STEPS_START\n- add caching\n";
        assert_eq!(
            extract_section(text, "NEXT_STEPS_START", "NEXT_STEPS_END"),
            "add caching"
        );
    }

    #[test]
    fn test_extract_section_uses_first_end_after_start() {
        let text = "END junk START a END b END";
        assert_eq!(extract_section(text, "START", "END"), "a");
    }
}
