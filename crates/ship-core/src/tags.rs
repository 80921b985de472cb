//! Single-pass scanning for the small, fixed set of tags LLM replies are
//! expected to carry (`<status>`, `<summary>`, `<task>`, ...).
//!
//! Replies are treated as opaque strings, never as well-formed XML:
//! unknown tags and surrounding prose are ignored, and a missing tag is
//! simply `None` rather than a parse error.

use std::sync::OnceLock;

use regex::Regex;

fn tag_regex(name: &str) -> Regex {
    Regex::new(&format!(r"(?s)<{name}>(.*?)</{name}>")).expect("valid tag regex")
}

/// First occurrence of `<name>...</name>`, trimmed. `None` if absent or
/// the captured text is empty after trimming.
pub fn find_tag(text: &str, name: &str) -> Option<String> {
    let re = tag_regex(name);
    let captured = re.captures(text)?.get(1)?.as_str().trim();
    (!captured.is_empty()).then(|| captured.to_owned())
}

/// Every non-empty occurrence of `<name>...</name>`, trimmed, in order.
pub fn find_all_tags(text: &str, name: &str) -> Vec<String> {
    let re = tag_regex(name);
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_owned()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// A `<tag attr="val" ...>body</tag>` element with its raw attribute
/// string (not yet parsed) and trimmed body.
pub struct TaggedElement {
    pub attrs: String,
    pub body: String,
}

static TASK_ELEMENT_RE: OnceLock<Regex> = OnceLock::new();

/// Every `<task ...>description</task>` element, in document order,
/// including any inline attributes (`worker=`, `depends=`).
pub fn find_task_elements(text: &str) -> Vec<TaggedElement> {
    let re = TASK_ELEMENT_RE
        .get_or_init(|| Regex::new(r"(?s)<task(?:\s+([^>]*?))?>(.*?)</task>").expect("valid regex"));
    re.captures_iter(text)
        .map(|c| TaggedElement {
            attrs: c.get(1).map(|m| m.as_str().to_owned()).unwrap_or_default(),
            body: c.get(2).map(|m| m.as_str().trim().to_owned()).unwrap_or_default(),
        })
        .collect()
}

/// Value of `name="..."` within a raw attribute string.
pub fn find_attr(attrs: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"{name}="([^"]*)""#)).expect("valid attr regex");
    re.captures(attrs).and_then(|c| c.get(1)).map(|m| m.as_str().to_owned())
}

/// Comma-separated list of positive integers, e.g. `depends="1,3"`.
/// Non-numeric tokens are silently dropped rather than rejecting the
/// whole attribute.
pub fn parse_index_list(raw: &str) -> Vec<usize> {
    raw.split(',')
        .filter_map(|p| p.trim().parse::<usize>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_tag_trims_and_returns_first_match() {
        let text = "prefix <status>  done  </status> suffix";
        assert_eq!(find_tag(text, "status").as_deref(), Some("done"));
    }

    #[test]
    fn find_tag_absent_is_none() {
        assert_eq!(find_tag("no tags here", "status"), None);
    }

    #[test]
    fn find_tag_empty_body_is_none() {
        assert_eq!(find_tag("<summary>   </summary>", "summary"), None);
    }

    #[test]
    fn find_all_tags_collects_every_nonempty_match() {
        let text = "<challenge>a</challenge><challenge></challenge><challenge>b</challenge>";
        assert_eq!(find_all_tags(text, "challenge"), vec!["a", "b"]);
    }

    #[test]
    fn find_task_elements_parses_attrs_and_body() {
        let text = r#"<task worker="w1" depends="1,2">do the thing</task><task>plain</task>"#;
        let elements = find_task_elements(text);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].body, "do the thing");
        assert_eq!(find_attr(&elements[0].attrs, "worker").as_deref(), Some("w1"));
        assert_eq!(find_attr(&elements[0].attrs, "depends").as_deref(), Some("1,2"));
        assert_eq!(elements[1].body, "plain");
        assert_eq!(find_attr(&elements[1].attrs, "worker"), None);
    }

    #[test]
    fn parse_index_list_drops_non_numeric_tokens() {
        assert_eq!(parse_index_list("1, 2,x,3"), vec![1, 2, 3]);
        assert_eq!(parse_index_list(""), Vec::<usize>::new());
    }
}
