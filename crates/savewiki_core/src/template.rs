use std::collections::BTreeMap;

/// A `{{Name|positional|key=value}}` invocation found in page wikitext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateNode {
    pub name: String,
    pub positional: Vec<String>,
    pub named: BTreeMap<String, String>,
}

impl TemplateNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_template_name(name),
            ..Self::default()
        }
    }

    pub fn with_positional(mut self, value: &str) -> Self {
        self.positional.push(value.to_string());
        self
    }

    pub fn with_named(mut self, key: &str, value: &str) -> Self {
        self.named
            .insert(normalize_parameter_key(key), value.to_string());
        self
    }

    /// Positional parameter by its 1-based wiki index.
    pub fn positional(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|index| self.positional.get(index))
            .map(String::as_str)
    }

    pub fn named(&self, key: &str) -> Option<&str> {
        self.named
            .get(&normalize_parameter_key(key))
            .map(String::as_str)
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(&normalize_template_name(name))
    }
}

/// Collects every template node in `content`, parents before the nodes nested
/// in their parameters.
pub fn parse_templates(content: &str) -> Vec<TemplateNode> {
    let stripped = strip_comments(content);
    let mut out = Vec::new();
    collect_templates(&stripped, &mut out);
    out
}

fn collect_templates(content: &str, out: &mut Vec<TemplateNode>) {
    let bytes = content.as_bytes();
    let mut cursor = 0usize;

    while cursor + 1 < bytes.len() {
        if bytes[cursor] == b'{' && bytes[cursor + 1] == b'{' {
            let start = cursor + 2;
            let Some(end) = find_closing_braces(bytes, start) else {
                break;
            };

            let inner = &content[start..end];
            if let Some(node) = parse_template_body(inner) {
                out.push(node);
            }
            if let Some(split) = top_level_split_points(inner).first() {
                collect_templates(&inner[split + 1..], out);
            }
            cursor = end + 2;
            continue;
        }
        cursor += 1;
    }
}

fn find_closing_braces(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut index = start;
    while index + 1 < bytes.len() {
        if bytes[index] == b'{' && bytes[index + 1] == b'{' {
            depth += 1;
            index += 2;
            continue;
        }
        if bytes[index] == b'}' && bytes[index + 1] == b'}' {
            depth -= 1;
            if depth == 0 {
                return Some(index);
            }
            index += 2;
            continue;
        }
        index += 1;
    }
    None
}

fn parse_template_body(inner: &str) -> Option<TemplateNode> {
    let splits = top_level_split_points(inner);
    let name_end = splits.first().copied().unwrap_or(inner.len());
    let name = inner[..name_end].trim();
    // Parser functions and template-argument references are not templates.
    if name.is_empty() || name.starts_with('#') || name.starts_with('{') || name.contains(':') {
        return None;
    }

    let mut node = TemplateNode::new(name);
    let mut boundaries = splits;
    boundaries.push(inner.len());
    for window in boundaries.windows(2) {
        let part = &inner[window[0] + 1..window[1]];
        match top_level_equals(part) {
            Some(equals) => {
                let key = normalize_parameter_key(&part[..equals]);
                let value = part[equals + 1..].trim();
                match positional_index(&key, node.positional.len()) {
                    Some(index) => set_positional(&mut node, index, value),
                    None => {
                        node.named.insert(key, value.to_string());
                    }
                }
            }
            None => node.positional.push(part.trim().to_string()),
        }
    }
    Some(node)
}

/// Numbered keys further than this past the filled positions stay named.
const MAX_POSITIONAL_GAP: usize = 64;

/// 1-based index for an explicit numeric key, when it is close enough to the
/// positions already filled to be stored densely.
fn positional_index(key: &str, filled: usize) -> Option<usize> {
    if key.is_empty() || !key.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let index = key.parse::<usize>().ok()?;
    (index > 0 && index <= filled + MAX_POSITIONAL_GAP).then_some(index)
}

fn set_positional(node: &mut TemplateNode, index: usize, value: &str) {
    if node.positional.len() < index {
        node.positional.resize(index, String::new());
    }
    node.positional[index - 1] = value.to_string();
}

/// Byte offsets of `|` separators outside nested templates and links.
fn top_level_split_points(inner: &str) -> Vec<usize> {
    let bytes = inner.as_bytes();
    let mut out = Vec::new();
    let mut brace_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut index = 0usize;

    while index < bytes.len() {
        let pair = bytes.get(index..index + 2);
        match pair {
            Some(b"{{") => {
                brace_depth += 1;
                index += 2;
                continue;
            }
            Some(b"}}") => {
                brace_depth = brace_depth.saturating_sub(1);
                index += 2;
                continue;
            }
            Some(b"[[") => {
                bracket_depth += 1;
                index += 2;
                continue;
            }
            Some(b"]]") => {
                bracket_depth = bracket_depth.saturating_sub(1);
                index += 2;
                continue;
            }
            _ => {}
        }
        if bytes[index] == b'|' && brace_depth == 0 && bracket_depth == 0 {
            out.push(index);
        }
        index += 1;
    }
    out
}

fn top_level_equals(part: &str) -> Option<usize> {
    let bytes = part.as_bytes();
    let mut depth = 0usize;
    let mut index = 0usize;
    while index < bytes.len() {
        match bytes.get(index..index + 2) {
            Some(b"{{") | Some(b"[[") => {
                depth += 1;
                index += 2;
                continue;
            }
            Some(b"}}") | Some(b"]]") => {
                depth = depth.saturating_sub(1);
                index += 2;
                continue;
            }
            _ => {}
        }
        if bytes[index] == b'=' && depth == 0 {
            return Some(index);
        }
        index += 1;
    }
    None
}

fn strip_comments(content: &str) -> String {
    let mut output = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("<!--") {
        output.push_str(&rest[..start]);
        match rest[start + 4..].find("-->") {
            Some(end) => rest = &rest[start + 4 + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    output.push_str(rest);
    output
}

fn normalize_template_name(name: &str) -> String {
    let collapsed = collapse_spaces(&name.replace('_', " "));
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn normalize_parameter_key(key: &str) -> String {
    collapse_spaces(&key.replace('_', " "))
}

fn collapse_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
