//! SVG text optimizer.
//!
//! Works on the SVG as markup text: header stripping, comment/metadata
//! removal, adjacent-path merging (via a quick-xml tree rebuild), numeric
//! precision rounding, and whitespace normalization. Stage order matters:
//! merging runs before rounding because it depends on exact attribute-string
//! equality, and rounding runs before the final whitespace pass.
//!
//! This never fails: the one stage that parses markup (path merging) falls
//! back to its input when it hits something it cannot parse.

use crate::settings::{OptimizeLevel, OptimizerSettings};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use std::io::Cursor;

/// Optimize SVG text according to the settings snapshot.
pub fn optimize(svg: &str, settings: &OptimizerSettings) -> String {
    let aggressive = settings.level != OptimizeLevel::Low;

    let mut out = strip_header(svg);
    if settings.remove_comments || aggressive {
        out = strip_comments(&out);
    }
    if settings.remove_metadata || aggressive {
        out = strip_metadata(&out);
    }
    if settings.merge_paths {
        out = merge_adjacent_paths(&out).unwrap_or(out);
    }
    out = round_numeric_tokens(&out, settings.precision);
    normalize_whitespace(&out, settings.level)
}

/// Strip the XML declaration and DOCTYPE header unconditionally.
fn strip_header(svg: &str) -> String {
    let decl = Regex::new(r"(?s)<\?xml.*?\?>").unwrap();
    let doctype = Regex::new(r"(?s)<!DOCTYPE[^>]*>").unwrap();
    let out = decl.replace_all(svg, "");
    doctype.replace_all(&out, "").into_owned()
}

fn strip_comments(svg: &str) -> String {
    Regex::new(r"(?s)<!--.*?-->")
        .unwrap()
        .replace_all(svg, "")
        .into_owned()
}

/// Strip `<metadata>` blocks plus authoring-tool namespace declarations and
/// attributes (Inkscape, Sodipodi, Dublin Core, RDF).
fn strip_metadata(svg: &str) -> String {
    let blocks = Regex::new(r"(?s)<metadata[^>]*>.*?</metadata>|<metadata[^>]*/>").unwrap();
    let ns_decls = Regex::new(r#"\s+xmlns:(?:inkscape|sodipodi|dc|cc|rdf)="[^"]*""#).unwrap();
    let ns_attrs = Regex::new(r#"\s+(?:inkscape|sodipodi):[\w.-]+="[^"]*""#).unwrap();
    let ns_elems =
        Regex::new(r"(?s)<(sodipodi|inkscape):[\w.-]+[^>]*/>|<(sodipodi|inkscape):([\w.-]+)[^>]*>.*?</(sodipodi|inkscape):[\w.-]+>")
            .unwrap();

    let out = blocks.replace_all(svg, "");
    let out = ns_elems.replace_all(&out, "");
    let out = ns_decls.replace_all(&out, "");
    ns_attrs.replace_all(&out, "").into_owned()
}

/// Round every decimal token to `precision` places, re-serialized without
/// trailing zeros. Integer tokens are left alone.
fn round_numeric_tokens(svg: &str, precision: u32) -> String {
    let float = Regex::new(r"-?\d+\.\d+").unwrap();
    float
        .replace_all(svg, |caps: &regex::Captures| {
            let tok = &caps[0];
            match tok.parse::<f64>() {
                Ok(v) => round_value(v, precision),
                Err(_) => tok.to_string(),
            }
        })
        .into_owned()
}

fn round_value(v: f64, precision: u32) -> String {
    if precision == 0 {
        return format!("{}", v.round() as i64);
    }
    // Scale-round-divide so halves round away from zero; `{:.p$}` alone
    // rounds half-to-even.
    let factor = 10f64.powi(precision as i32);
    let rounded = (v * factor).round() / factor;
    let s = format!("{:.*}", precision as usize, rounded);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

fn normalize_whitespace(svg: &str, level: OptimizeLevel) -> String {
    match level {
        OptimizeLevel::Low => svg.trim().to_string(),
        OptimizeLevel::Medium => collapse(svg),
        OptimizeLevel::High => {
            let out = collapse(svg);
            let eq = Regex::new(r"\s*=\s*").unwrap();
            let close = Regex::new(r"\s+/>").unwrap();
            let out = eq.replace_all(&out, "=");
            close.replace_all(&out, "/>").into_owned()
        }
    }
}

fn collapse(svg: &str) -> String {
    let runs = Regex::new(r"\s+").unwrap();
    let between_tags = Regex::new(r">\s+<").unwrap();
    let out = runs.replace_all(svg, " ");
    between_tags.replace_all(&out, "><").trim().to_string()
}

// --- adjacent path merging -------------------------------------------------

/// Container elements whose direct children are scanned for mergeable
/// adjacent paths.
const CONTAINERS: [&str; 7] = ["svg", "g", "defs", "symbol", "marker", "mask", "pattern"];

struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    CData(String),
}

/// Merge strictly adjacent sibling `<path>` elements whose attributes are
/// identical except for `d`, concatenating their `d` values space-joined.
/// Non-adjacent duplicates are deliberately not merged.
///
/// Returns `None` when the markup cannot be parsed or re-serialized; the
/// caller keeps the input unchanged in that case.
fn merge_adjacent_paths(svg: &str) -> Option<String> {
    let mut roots = parse_tree(svg)?;
    for node in roots.iter_mut() {
        if let Node::Element(el) = node {
            merge_in_element(el);
        }
    }
    serialize_tree(&roots)
}

fn parse_tree(svg: &str) -> Option<Vec<Node>> {
    let mut reader = Reader::from_str(svg);
    let mut stack: Vec<Element> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();

    fn attach(stack: &mut Vec<Element>, roots: &mut Vec<Node>, node: Node) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => stack.push(element_from(&e)?),
            Event::Empty(e) => {
                let el = element_from(&e)?;
                attach(&mut stack, &mut roots, Node::Element(el));
            }
            Event::End(_) => {
                let el = stack.pop()?;
                attach(&mut stack, &mut roots, Node::Element(el));
            }
            Event::Text(t) => {
                // Text arrives already unescaped; entity references surface
                // as separate GeneralRef events.
                let text = t.decode().ok()?.into_owned();
                attach(&mut stack, &mut roots, Node::Text(text));
            }
            Event::Comment(t) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                attach(&mut stack, &mut roots, Node::Comment(text));
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                attach(&mut stack, &mut roots, Node::CData(text));
            }
            // Headers are stripped before this stage runs.
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            // Entity references would not survive the rebuild; let the
            // caller keep the input unchanged.
            Event::GeneralRef(_) => return None,
            Event::Eof => break,
        }
    }

    if stack.is_empty() {
        Some(roots)
    } else {
        None
    }
}

fn element_from(e: &BytesStart) -> Option<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.ok()?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().ok()?.into_owned();
        attrs.push((key, value));
    }
    Some(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn merge_in_element(el: &mut Element) {
    if CONTAINERS.contains(&el.name.as_str()) {
        merge_children(&mut el.children);
    }
    for child in el.children.iter_mut() {
        if let Node::Element(c) = child {
            merge_in_element(c);
        }
    }
}

fn merge_children(children: &mut Vec<Node>) {
    let mut i = 0;
    while i < children.len() {
        let Some(j) = adjacent_element_after(children, i) else {
            i += 1;
            continue;
        };
        if paths_mergeable(&children[i], &children[j]) {
            let second_d = path_d(&children[j]);
            if let Node::Element(first) = &mut children[i] {
                join_d(first, second_d);
            }
            children.remove(j);
            // The merged path may chain with the next sibling; stay at i.
        } else {
            i += 1;
        }
    }
}

/// Index of the next element sibling after `i`, treating whitespace-only
/// text and comments as transparent (element adjacency, DOM-style).
fn adjacent_element_after(children: &[Node], i: usize) -> Option<usize> {
    if !matches!(children.get(i), Some(Node::Element(_))) {
        return None;
    }
    let mut j = i + 1;
    while j < children.len() {
        match &children[j] {
            Node::Text(t) if t.trim().is_empty() => j += 1,
            Node::Comment(_) => j += 1,
            Node::Element(_) => return Some(j),
            _ => return None,
        }
    }
    None
}

fn paths_mergeable(a: &Node, b: &Node) -> bool {
    let (Node::Element(a), Node::Element(b)) = (a, b) else {
        return false;
    };
    if a.name != "path" || b.name != "path" || !a.children.is_empty() || !b.children.is_empty() {
        return false;
    }
    attrs_except_d(a) == attrs_except_d(b)
}

fn attrs_except_d(el: &Element) -> Vec<(&str, &str)> {
    let mut attrs: Vec<(&str, &str)> = el
        .attrs
        .iter()
        .filter(|(k, _)| k != "d")
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    attrs.sort_unstable();
    attrs
}

fn path_d(node: &Node) -> String {
    match node {
        Node::Element(el) => el
            .attrs
            .iter()
            .find(|(k, _)| k == "d")
            .map(|(_, v)| v.clone())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn join_d(first: &mut Element, second_d: String) {
    if second_d.is_empty() {
        return;
    }
    match first.attrs.iter_mut().find(|(k, _)| k == "d") {
        Some((_, d)) if !d.is_empty() => {
            d.push(' ');
            d.push_str(&second_d);
        }
        Some((_, d)) => *d = second_d,
        None => first.attrs.push(("d".to_string(), second_d)),
    }
}

fn serialize_tree(roots: &[Node]) -> Option<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    for node in roots {
        write_node(&mut writer, node).ok()?;
    }
    String::from_utf8(writer.into_inner().into_inner()).ok()
}

fn write_node(writer: &mut Writer<Cursor<Vec<u8>>>, node: &Node) -> std::io::Result<()> {
    match node {
        Node::Element(el) => {
            let mut start = BytesStart::new(el.name.as_str());
            for (k, v) in &el.attrs {
                start.push_attribute((k.as_str(), v.as_str()));
            }
            if el.children.is_empty() {
                writer.write_event(Event::Empty(start))?;
            } else {
                writer.write_event(Event::Start(start))?;
                for child in &el.children {
                    write_node(writer, child)?;
                }
                writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
            }
        }
        Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        Node::Comment(t) => writer.write_event(Event::Comment(BytesText::from_escaped(t.as_str())))?,
        Node::CData(t) => writer.write_event(Event::CData(BytesCData::new(t.as_str())))?,
    }
    Ok(())
}
