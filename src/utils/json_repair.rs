/// Best-effort fix for JSON that some upstream services emit with broken string escaping.
///
/// Inside string literals, a backslash that does not start a valid JSON escape
/// is doubled and raw control characters are escaped. Returns `None` when
/// nothing needed fixing, so the caller knows a retry parse is pointless.
pub(crate) fn repair_json(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut in_string = false;
    let mut changed = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }

        match ch {
            '"' => {
                in_string = false;
                out.push(ch);
            }
            '\\' => match chars.peek() {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                    out.push(ch);
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                _ => {
                    out.push_str("\\\\");
                    changed = true;
                }
            },
            '\n' => {
                out.push_str("\\n");
                changed = true;
            }
            '\r' => {
                out.push_str("\\r");
                changed = true;
            }
            '\t' => {
                out.push_str("\\t");
                changed = true;
            }
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", u32::from(c)));
                changed = true;
            }
            c => out.push(c),
        }
    }

    changed.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::repair_json;
    use serde_json::Value;

    #[test]
    fn doubles_invalid_escapes() {
        let raw = r#"{"smiles": "C\C=C", "ok": "a\nb"}"#;
        assert!(serde_json::from_str::<Value>(raw).is_err());

        let fixed = repair_json(raw).unwrap();
        let value: Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["smiles"], "C\\C=C");
        assert_eq!(value["ok"], "a\nb");
    }

    #[test]
    fn escapes_raw_control_characters_in_strings() {
        let raw = "{\"title\": \"line one\nline\ttwo\"}";
        let fixed = repair_json(raw).unwrap();
        let value: Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["title"], "line one\nline\ttwo");
    }

    #[test]
    fn leaves_whitespace_between_tokens_alone() {
        let raw = "{\n\t\"a\": 1\n}";
        assert_eq!(repair_json(raw), None);
    }

    #[test]
    fn returns_none_for_valid_json() {
        assert_eq!(repair_json(r#"{"a": "b\"c", "d": "é"}"#), None);
    }
}
