//! Command line tokenization
//!
//! Splits a raw input line into whitespace-separated components, honoring
//! single and double quoting so arguments may contain spaces. Quotes are
//! stripped and no escape processing is performed; an unterminated quote
//! degrades to a literal character rather than an error.

/// Split `line` into tokens.
///
/// A token is either a maximal run of unquoted non-whitespace characters or
/// the contents of a quoted span. Adjacent quoted and unquoted text merges
/// into one token. Never fails; empty or all-whitespace input yields an
/// empty vec.
pub fn extract_components(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            i += 1;
        } else if c == '"' || c == '\'' {
            match chars[i + 1..].iter().position(|&x| x == c) {
                Some(off) => {
                    current.extend(&chars[i + 1..i + 1 + off]);
                    i += off + 2;
                }
                None => {
                    // Unterminated quote: keep it as a literal character.
                    current.push(c);
                    i += 1;
                }
            }
        } else {
            current.push(c);
            i += 1;
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
