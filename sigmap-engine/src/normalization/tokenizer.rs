//! Point label tokenizer
//!
//! Splits raw controller labels on separators, camel-case boundaries and
//! letter/digit boundaries: "SaTmp" -> ["Sa", "Tmp"], "SATemp2" ->
//! ["SA", "Temp", "2"], "ZN-T" -> ["ZN", "T"].

use super::dictionary::PreExpansion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Upper,
    Lower,
    Digit,
    Other,
}

fn classify(c: char) -> CharClass {
    if c.is_ascii_digit() {
        CharClass::Digit
    } else if c.is_uppercase() {
        CharClass::Upper
    } else if c.is_alphabetic() {
        CharClass::Lower
    } else {
        CharClass::Other
    }
}

/// Split a label into tokens
pub fn split_tokens(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        let class = classify(c);
        if class == CharClass::Other {
            flush(&mut current, &mut tokens);
            continue;
        }

        if let Some(prev) = current.chars().last() {
            let prev_class = classify(prev);
            let next_class = chars.get(i + 1).map(|&n| classify(n));

            let boundary = match (prev_class, class) {
                // "saTmp" -> "sa" | "Tmp"
                (CharClass::Lower, CharClass::Upper) => true,
                // "SATemp" -> "SA" | "Temp"
                (CharClass::Upper, CharClass::Upper) => next_class == Some(CharClass::Lower),
                (CharClass::Digit, CharClass::Upper | CharClass::Lower) => true,
                (CharClass::Upper | CharClass::Lower, CharClass::Digit) => true,
                _ => false,
            };
            if boundary {
                flush(&mut current, &mut tokens);
            }
        }
        current.push(c);
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// Expand ambiguous short tokens that sit directly before an upper-case letter
///
/// Only positions that start a word (label start, after a separator, or at
/// a lower-to-upper boundary) are considered. Returns the rewritten label
/// and the entries that fired, in order.
pub fn pre_expand<'a>(label: &str, entries: &'a [PreExpansion]) -> (String, Vec<&'a PreExpansion>) {
    let chars: Vec<char> = label.chars().collect();
    let mut out = String::with_capacity(label.len() + 16);
    let mut fired = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let starts_word = i == 0
            || classify(chars[i - 1]) == CharClass::Other
            || (classify(chars[i - 1]) == CharClass::Lower && classify(chars[i]) == CharClass::Upper)
            || (classify(chars[i - 1]) == CharClass::Digit && classify(chars[i]) != CharClass::Digit);

        let matched = if starts_word {
            entries.iter().find(|entry| {
                let len = entry.token.chars().count();
                if i + len >= chars.len() {
                    return false;
                }
                let candidate: String = chars[i..i + len].iter().collect();
                candidate.eq_ignore_ascii_case(&entry.token)
                    && classify(chars[i + len]) == CharClass::Upper
            })
        } else {
            None
        };

        match matched {
            Some(entry) => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
                out.push_str(&entry.expansion);
                out.push(' ');
                fired.push(entry);
                i += entry.token.chars().count();
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }

    (out.trim().to_string(), fired)
}
