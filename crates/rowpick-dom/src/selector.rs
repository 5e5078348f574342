//! Structural Selectors
//!
//! The subset of CSS selectors page profiles are written in: type, `*`,
//! `#id`, `.class`, attribute conditions, `:not(<compound>)`, descendant
//! and child combinators, and comma-separated lists.

use crate::{Document, DomError, NodeId};

/// Parsed selector list
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    groups: Vec<ComplexSelector>,
}

/// Compound selectors joined by combinators, subject last
#[derive(Debug, Clone, PartialEq)]
struct ComplexSelector {
    /// Each part carries the combinator linking it to the previous part
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    negations: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrCondition {
    name: String,
    op: AttrOp,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl Selector {
    /// Parse a selector list
    pub fn parse(input: &str) -> Result<Self, DomError> {
        let invalid = |reason| DomError::InvalidSelector { selector: input.to_string(), reason };

        let mut groups = Vec::new();
        for group in split_top_level(input).map_err(invalid)? {
            let group = group.trim();
            if group.is_empty() {
                return Err(invalid("empty selector"));
            }
            groups.push(parse_complex(group).map_err(invalid)?);
        }
        Ok(Self { source: input.trim().to_string(), groups })
    }

    /// Source text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check if an element matches any group
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.groups.iter().any(|g| g.matches(doc, node))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl ComplexSelector {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        !self.parts.is_empty() && self.matches_at(doc, node, self.parts.len() - 1)
    }

    fn matches_at(&self, doc: &Document, node: NodeId, idx: usize) -> bool {
        let (combinator, compound) = &self.parts[idx];
        if !compound.matches(doc, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => doc.parent_element(node)
                .is_some_and(|p| self.matches_at(doc, p, idx - 1)),
            Combinator::Descendant => {
                let mut cursor = doc.parent_element(node);
                while let Some(ancestor) = cursor {
                    if self.matches_at(doc, ancestor, idx - 1) {
                        return true;
                    }
                    cursor = doc.parent_element(ancestor);
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(el) = doc.element(node) else {
            return false;
        };
        if self.tag.as_ref().is_some_and(|t| *t != el.tag) {
            return false;
        }
        if self.id.is_some() && el.id != self.id {
            return false;
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        if !self.attrs.iter().all(|a| a.matches(el.get_attr(&a.name))) {
            return false;
        }
        !self.negations.iter().any(|n| n.matches(doc, node))
    }
}

impl AttrCondition {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let v = self.value.as_str();
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == v,
            AttrOp::Includes => actual.split_whitespace().any(|t| t == v),
            AttrOp::DashMatch => actual == v || actual.starts_with(&format!("{v}-")),
            AttrOp::Prefix => !v.is_empty() && actual.starts_with(v),
            AttrOp::Suffix => !v.is_empty() && actual.ends_with(v),
            AttrOp::Substring => !v.is_empty() && actual.contains(v),
        }
    }
}

// === Parsing ===

/// Split on commas outside brackets, parentheses and quotes
fn split_top_level(src: &str) -> Result<Vec<&str>, &'static str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in src.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced brackets");
                }
            }
            ',' if depth == 0 => {
                out.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return Err("unbalanced brackets or quotes");
    }
    out.push(&src[start..]);
    Ok(out)
}

fn parse_complex(src: &str) -> Result<ComplexSelector, &'static str> {
    let mut parts: Vec<(Combinator, Compound)> = Vec::new();
    let mut buf = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut child_pending = false;

    let flush = |buf: &mut String, child_pending: &mut bool, parts: &mut Vec<(Combinator, Compound)>| {
        let combinator = if *child_pending { Combinator::Child } else { Combinator::Descendant };
        *child_pending = false;
        let compound = parse_compound(buf)?;
        parts.push((combinator, compound));
        buf.clear();
        Ok::<(), &'static str>(())
    };

    for c in src.chars() {
        if let Some(q) = quote {
            buf.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                buf.push(c);
            }
            '[' | '(' => {
                depth += 1;
                buf.push(c);
            }
            ']' | ')' => {
                depth -= 1;
                buf.push(c);
            }
            c if depth == 0 && (c.is_whitespace() || c == '>') => {
                if !buf.is_empty() {
                    flush(&mut buf, &mut child_pending, &mut parts)?;
                }
                if c == '>' {
                    if parts.is_empty() || child_pending {
                        return Err("misplaced child combinator");
                    }
                    child_pending = true;
                }
            }
            _ => buf.push(c),
        }
    }
    if buf.is_empty() {
        if child_pending {
            return Err("trailing child combinator");
        }
    } else {
        flush(&mut buf, &mut child_pending, &mut parts)?;
    }
    if parts.is_empty() {
        return Err("empty selector");
    }
    Ok(ComplexSelector { parts })
}

fn parse_compound(src: &str) -> Result<Compound, &'static str> {
    let mut compound = Compound::default();
    let mut rest = src;

    if let Some(tail) = rest.strip_prefix('*') {
        rest = tail;
    } else {
        let (ident, tail) = take_ident(rest);
        if !ident.is_empty() {
            compound.tag = Some(ident.to_ascii_lowercase());
            rest = tail;
        }
    }

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('#') {
            let (ident, tail) = take_ident(tail);
            if ident.is_empty() {
                return Err("expected identifier after '#'");
            }
            compound.id = Some(ident.to_string());
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('.') {
            let (ident, tail) = take_ident(tail);
            if ident.is_empty() {
                return Err("expected identifier after '.'");
            }
            compound.classes.push(ident.to_string());
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('[') {
            let end = find_closing(tail, ']')?;
            compound.attrs.push(parse_attr_condition(&tail[..end])?);
            rest = &tail[end + 1..];
        } else if let Some(tail) = rest.strip_prefix(":not(") {
            let end = find_closing(tail, ')')?;
            let inner = tail[..end].trim();
            if inner.is_empty() {
                return Err("empty :not()");
            }
            compound.negations.push(parse_compound(inner)?);
            rest = &tail[end + 1..];
        } else {
            return Err("unsupported selector syntax");
        }
    }
    Ok(compound)
}

fn take_ident(src: &str) -> (&str, &str) {
    let end = src
        .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(src.len());
    src.split_at(end)
}

/// Byte offset of the matching `close`, skipping quoted and nested parts
fn find_closing(src: &str, close: char) -> Result<usize, &'static str> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in src.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '(' => depth += 1,
            c if c == close && depth == 0 => return Ok(i),
            ']' | ')' => depth -= 1,
            _ => {}
        }
    }
    Err("unterminated bracket")
}

fn parse_attr_condition(inner: &str) -> Result<AttrCondition, &'static str> {
    let inner = inner.trim();
    let Some(eq) = inner.find('=') else {
        let (name, rest) = take_ident(inner);
        if name.is_empty() || !rest.trim().is_empty() {
            return Err("invalid attribute name");
        }
        return Ok(AttrCondition { name: name.to_ascii_lowercase(), op: AttrOp::Exists, value: String::new() });
    };

    let (mut name_part, value_part) = (&inner[..eq], &inner[eq + 1..]);
    let op = match name_part.chars().last() {
        Some('~') => AttrOp::Includes,
        Some('|') => AttrOp::DashMatch,
        Some('^') => AttrOp::Prefix,
        Some('$') => AttrOp::Suffix,
        Some('*') => AttrOp::Substring,
        _ => AttrOp::Equals,
    };
    if op != AttrOp::Equals {
        name_part = &name_part[..name_part.len() - 1];
    }
    let name = name_part.trim();
    if name.is_empty() || !take_ident(name).1.is_empty() {
        return Err("invalid attribute name");
    }

    let value = value_part.trim();
    let value = match value.chars().next() {
        Some(q @ ('"' | '\'')) => {
            if value.len() < 2 || !value.ends_with(q) {
                return Err("unterminated attribute value");
            }
            &value[1..value.len() - 1]
        }
        _ => value,
    };
    Ok(AttrCondition { name: name.to_ascii_lowercase(), op, value: value.to_string() })
}

// === Queries ===

impl Document {
    /// All matching descendants of `scope` in document order
    pub fn select_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&n| selector.matches(self, n))
            .collect()
    }

    /// First matching descendant of `scope`
    pub fn select_first(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&n| selector.matches(self, n))
    }

    /// Closest inclusive ancestor matching `selector`
    pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if selector.matches(self, current) {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }

    /// Query single element by selector string
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        Ok(self.select_first(scope, &Selector::parse(selector)?))
    }

    /// Query all elements by selector string
    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        Ok(self.select_all(scope, &Selector::parse(selector)?))
    }
}
