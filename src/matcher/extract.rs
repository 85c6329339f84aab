// Parameter value extraction from free-text requests.
use std::collections::{HashMap, HashSet};

use crate::workflow::types::{ParameterType, Workflow};

/// Filler words that are never taken as a parameter value.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "can", "for", "go", "i", "in", "me", "my", "of", "on", "open", "please",
    "the", "to", "with", "you",
];

/// Parameter-name fragments too generic to act as keywords.
const GENERIC_FRAGMENTS: &[&str] = &["id", "name", "param", "text", "value"];

/// Pulls a value for every declared parameter of `workflow` out of `request`.
///
/// Parameters without a usable value are left out. A request word is used for
/// at most one parameter.
pub fn extract_parameters(request: &str, workflow: &Workflow) -> HashMap<String, String> {
    let words: Vec<&str> = request
        .split_whitespace()
        .map(clean)
        .filter(|w| !w.is_empty())
        .collect();
    let name_words: HashSet<String> = workflow
        .name
        .split_whitespace()
        .map(|w| clean(w).to_lowercase())
        .collect();

    let mut used = HashSet::new();
    let mut values = HashMap::new();

    for param in &workflow.parameters {
        let picked = match param.param_type {
            ParameterType::Number => first_unused(&words, &used, |w| w.replace(',', "").parse::<f64>().is_ok()),
            ParameterType::Url => first_unused(&words, &used, looks_like_url),
            ParameterType::String => {
                let keywords = keywords_of(&param.name);
                near_keyword(&words, &used, &keywords)
                    .or_else(|| first_unused(&words, &used, |w| is_candidate(w, &keywords, &name_words)))
            }
        };

        match picked {
            Some(i) => {
                tracing::debug!(param = %param.name, value = %words[i], "parameter extracted");
                used.insert(i);
                values.insert(param.name.clone(), words[i].to_string());
            }
            None => tracing::debug!(param = %param.name, "no value found in request"),
        }
    }
    values
}

fn clean(word: &str) -> &str {
    word.trim_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '"' | '\'' | '(' | ')'))
}

fn keywords_of(param_name: &str) -> Vec<String> {
    param_name
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty() && !GENERIC_FRAGMENTS.contains(&t.as_str()))
        .collect()
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_lowercase().as_str())
}

fn is_keyword(word: &str, keywords: &[String]) -> bool {
    let lower = word.to_lowercase();
    keywords.iter().any(|k| lower.starts_with(k.as_str()))
}

fn looks_like_url(word: &str) -> bool {
    let lower = word.to_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("www.")
        || (lower.contains('.') && lower.contains('/'))
}

fn is_candidate(word: &str, keywords: &[String], name_words: &HashSet<String>) -> bool {
    is_capitalized(word)
        && !is_stopword(word)
        && !is_keyword(word, keywords)
        && !name_words.contains(&word.to_lowercase())
}

fn first_unused(words: &[&str], used: &HashSet<usize>, pred: impl Fn(&str) -> bool) -> Option<usize> {
    (0..words.len()).find(|i| !used.contains(i) && pred(words[*i]))
}

/// A capitalized word right after a keyword, else right before it.
fn near_keyword(words: &[&str], used: &HashSet<usize>, keywords: &[String]) -> Option<usize> {
    if keywords.is_empty() {
        return None;
    }
    let usable = |i: usize| {
        !used.contains(&i) && is_capitalized(words[i]) && !is_stopword(words[i]) && !is_keyword(words[i], keywords)
    };
    for (i, word) in words.iter().enumerate() {
        if !is_keyword(word, keywords) {
            continue;
        }
        if i + 1 < words.len() && usable(i + 1) {
            return Some(i + 1);
        }
        if i > 0 && usable(i - 1) {
            return Some(i - 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Parameter;
    use std::collections::BTreeSet;

    fn workflow(name: &str, params: Vec<Parameter>) -> Workflow {
        let mut wf = Workflow::new(name, "", BTreeSet::new());
        wf.parameters = params;
        wf
    }

    #[test]
    fn capitalized_word_before_keyword() {
        let wf = workflow("Open Canvas Class", vec![Parameter::new("class_name", "Machine Learning")]);
        let params = extract_parameters("open my DataVis class", &wf);
        assert_eq!(params.get("class_name").map(String::as_str), Some("DataVis"));
    }

    #[test]
    fn capitalized_word_after_keyword() {
        let wf = workflow("Close ticket", vec![Parameter::new("ticket_id", "XYZ-1")]);
        let params = extract_parameters("Close Jira ticket ABC-123, please", &wf);
        assert_eq!(params["ticket_id"], "ABC-123");
    }

    #[test]
    fn fallback_skips_name_words_and_stopwords() {
        let wf = workflow("Open Canvas Class", vec![Parameter::new("course", "Biology")]);
        let params = extract_parameters("Please Open Canvas for Chemistry", &wf);
        assert_eq!(params["course"], "Chemistry");
    }

    #[test]
    fn typed_parameters_and_no_word_reuse() {
        let mut level = Parameter::new("level", "10");
        level.param_type = ParameterType::Number;
        let mut site = Parameter::new("site", "https://example.com");
        site.param_type = ParameterType::Url;
        let wf = workflow(
            "Share volume",
            vec![level, site, Parameter::new("recipient", "Bob"), Parameter::new("cc", "Eve")],
        );

        let params = extract_parameters("Share 40 from https://news.example.org/today with Alice and Bob", &wf);
        assert_eq!(params["level"], "40");
        assert_eq!(params["site"], "https://news.example.org/today");
        assert_eq!(params["recipient"], "Alice");
        assert_eq!(params["cc"], "Bob");
    }

    #[test]
    fn nothing_extracted_without_candidates() {
        let wf = workflow("Open Canvas Class", vec![Parameter::new("class_name", "ML")]);
        assert!(extract_parameters("open canvas class", &wf).is_empty());
    }
}
