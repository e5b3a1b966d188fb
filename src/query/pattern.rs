use crate::core::{MockError, Result};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

lazy_static::lazy_static! {
    static ref LIKE_REGEX_CACHE: Arc<Mutex<LruCache<String, Arc<Regex>>>> =
        Arc::new(Mutex::new(LruCache::new(NonZeroUsize::new(200).expect("non-zero capacity"))));
}

/// Translate a LIKE pattern into an anchored regex.
/// `%` is any run, `_` any single character, `\` escapes the next character.
#[inline]
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                regex.push_str(&regex::escape(&chars[i].to_string()));
            }
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    regex.push('$');
    regex
}

/// Plain patterns (no `_`, no escapes, `%` only at the ends) skip the regex engine.
#[inline]
fn fast_path_like(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();

    let leading = pattern.starts_with('%');
    let trailing = pattern.len() > 1 && pattern.ends_with('%');
    let inner = pattern
        .strip_prefix('%')
        .unwrap_or(&pattern);
    let inner = if trailing {
        inner.strip_suffix('%').unwrap_or(inner)
    } else {
        inner
    };
    if inner.contains('%') {
        return None;
    }

    Some(match (leading, trailing) {
        (false, false) => text == inner,
        (false, true) => text.starts_with(inner),
        (true, false) => text.ends_with(inner),
        (true, true) => text.contains(inner),
    })
}

fn get_or_compile_regex(pattern: &str) -> Result<Arc<Regex>> {
    if let Ok(mut cache) = LIKE_REGEX_CACHE.lock()
        && let Some(regex) = cache.get(pattern)
    {
        return Ok(Arc::clone(regex));
    }

    let compiled = regex::RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| MockError::MalformedQuery(format!("Invalid LIKE pattern: {}", e)))?;
    let compiled = Arc::new(compiled);

    if let Ok(mut cache) = LIKE_REGEX_CACHE.lock() {
        cache.put(pattern.to_string(), Arc::clone(&compiled));
    }

    Ok(compiled)
}

/// Case-insensitive whole-string LIKE match.
#[inline]
pub fn eval_like(text: &str, pattern: &str) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern) {
        return Ok(result);
    }
    let regex = get_or_compile_regex(pattern)?;
    Ok(regex.is_match(text))
}
