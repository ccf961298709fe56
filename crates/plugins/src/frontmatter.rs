use serde_yaml::{Mapping, Value};

/// Front matter of a Markdown document.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontMatter {
    Absent,
    Parsed(Mapping),
    Malformed(String),
}

/// Split `---` delimited front matter from the body.
///
/// Returns `None` when the document does not open with `---`; an opening
/// delimiter without a closing one yields `Err`.
pub fn split_front_matter(content: &str) -> Option<Result<(&str, &str), String>> {
    let trimmed = content.trim_start();
    let after_open = trimmed.strip_prefix("---")?;
    let Some(close_pos) = after_open.find("\n---") else {
        return Some(Err("missing closing --- for front matter".to_string()));
    };
    let front = after_open[..close_pos].trim();
    let body = after_open[close_pos + 4..].trim();
    Some(Ok((front, body)))
}

pub fn read_front_matter(content: &str) -> FrontMatter {
    match split_front_matter(content) {
        None => FrontMatter::Absent,
        Some(Err(reason)) => FrontMatter::Malformed(reason),
        Some(Ok((front, _))) if front.is_empty() => FrontMatter::Parsed(Mapping::new()),
        Some(Ok((front, _))) => match serde_yaml::from_str::<Value>(front) {
            Ok(Value::Mapping(map)) => FrontMatter::Parsed(map),
            Ok(_) => FrontMatter::Malformed("front matter is not a mapping".to_string()),
            Err(e) => FrontMatter::Malformed(e.to_string()),
        },
    }
}
