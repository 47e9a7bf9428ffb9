use scraper::{Html, Selector};
use serde_json::Value;

/// Every JSON-LD object on the page, with `@graph` members flattened in.
fn objects(document: &Html) -> Vec<Value> {
    let mut out = Vec::new();
    let Ok(script_selector) = Selector::parse("script[type='application/ld+json']") else {
        return out;
    };
    for script in document.select(&script_selector) {
        let raw = script.text().collect::<String>();
        let Ok(json) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        flatten_into(json, &mut out);
    }
    out
}

fn flatten_into(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_into(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_into(graph, out);
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

/// Author names from JSON-LD metadata.
pub fn extract_authors(document: &Html) -> Vec<String> {
    let mut authors = Vec::new();
    for json in objects(document) {
        match json.get("author") {
            Some(Value::Array(arr)) => {
                for author in arr {
                    push_name(author, &mut authors);
                }
            }
            Some(author) => push_name(author, &mut authors),
            None => {}
        }
    }
    authors
}

fn push_name(author: &Value, authors: &mut Vec<String>) {
    let name = match author {
        Value::Object(obj) => obj.get("name").and_then(Value::as_str),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    };
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        if !authors.iter().any(|a| a == name) {
            authors.push(name.to_string());
        }
    }
}

/// First `datePublished` found in JSON-LD metadata.
pub fn date_published(document: &Html) -> Option<String> {
    objects(document)
        .iter()
        .find_map(|json| json.get("datePublished").and_then(Value::as_str).map(str::to_string))
}

/// `content` attribute of the first `<meta>` matching `selector`.
pub fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}
