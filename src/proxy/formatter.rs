use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::Response;
use crate::config::Backend;

/// Pure projector shaping a decoded response object: target extraction,
/// then whitelist or blacklist, then grouping, then field renames.
/// `is_complete` passes through untouched.
#[derive(Debug, Clone, Default)]
pub struct EntityFormatter {
    target: Option<String>,
    filter: PropertyFilter,
    group: Option<String>,
    mapping: HashMap<String, String>,
}

/// Whitelist wins when both lists are configured. Paths are dot-separated
/// with a supported depth of two; an empty child set keeps the whole value.
#[derive(Debug, Clone, Default)]
enum PropertyFilter {
    #[default]
    None,
    Whitelist(HashMap<String, HashSet<String>>),
    Blacklist(HashMap<String, HashSet<String>>),
}

impl EntityFormatter {
    pub fn new(backend: &Backend) -> Self {
        let filter = if !backend.whitelist.is_empty() {
            PropertyFilter::Whitelist(compile_paths(&backend.whitelist))
        } else if !backend.blacklist.is_empty() {
            PropertyFilter::Blacklist(compile_paths(&backend.blacklist))
        } else {
            PropertyFilter::None
        };
        Self {
            target: backend.target.clone().filter(|t| !t.is_empty()),
            filter,
            group: backend.group.clone().filter(|g| !g.is_empty()),
            mapping: backend.mapping.clone(),
        }
    }

    pub fn format(&self, response: Response) -> Response {
        let mut data = response.data;

        if let Some(target) = &self.target {
            data = match data.remove(target) {
                Some(Value::Object(inner)) => inner,
                _ => Map::new(),
            };
        }

        match &self.filter {
            PropertyFilter::None => {}
            PropertyFilter::Whitelist(allowed) => data = whitelist(data, allowed),
            PropertyFilter::Blacklist(denied) => blacklist(&mut data, denied),
        }

        if let Some(group) = &self.group {
            let mut wrapped = Map::new();
            wrapped.insert(group.clone(), Value::Object(data));
            data = wrapped;
        }

        for (source, renamed) in &self.mapping {
            if let Some(value) = data.remove(source) {
                data.insert(renamed.clone(), value);
            }
        }

        Response {
            data,
            is_complete: response.is_complete,
        }
    }
}

fn compile_paths(paths: &[String]) -> HashMap<String, HashSet<String>> {
    let mut compiled: HashMap<String, HashSet<String>> = HashMap::new();
    for path in paths {
        match path.split_once('.') {
            Some((parent, child)) => {
                compiled
                    .entry(parent.to_string())
                    .or_default()
                    .insert(child.to_string());
            }
            None => {
                compiled.entry(path.to_string()).or_default();
            }
        }
    }
    compiled
}

fn whitelist(data: Map<String, Value>, allowed: &HashMap<String, HashSet<String>>) -> Map<String, Value> {
    let mut accumulator = Map::new();
    for (key, value) in data {
        let children = match allowed.get(&key) {
            Some(children) => children,
            None => continue,
        };
        if children.is_empty() {
            accumulator.insert(key, value);
            continue;
        }
        if let Value::Object(inner) = value {
            let kept: Map<String, Value> = inner
                .into_iter()
                .filter(|(child, _)| children.contains(child))
                .collect();
            if !kept.is_empty() {
                accumulator.insert(key, Value::Object(kept));
            }
        }
    }
    accumulator
}

fn blacklist(data: &mut Map<String, Value>, denied: &HashMap<String, HashSet<String>>) {
    for (key, children) in denied {
        if children.is_empty() {
            data.remove(key);
        } else if let Some(Value::Object(inner)) = data.get_mut(key) {
            for child in children {
                inner.remove(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> Response {
        match value {
            Value::Object(data) => Response {
                data,
                is_complete: true,
            },
            _ => unreachable!(),
        }
    }

    fn formatter(mutator: impl FnOnce(&mut Backend)) -> EntityFormatter {
        let mut backend = Backend::default();
        mutator(&mut backend);
        EntityFormatter::new(&backend)
    }

    #[test]
    fn test_noop_passthrough() {
        let f = formatter(|_| {});
        let out = f.format(response(json!({"supu": 42, "tupu": false})));
        assert_eq!(Value::Object(out.data), json!({"supu": 42, "tupu": false}));
        assert!(out.is_complete);
    }

    #[test]
    fn test_target_extracts_nested_object() {
        let f = formatter(|b| b.target = Some("data".to_string()));
        let out = f.format(response(json!({"data": {"id": 7}, "meta": 1})));
        assert_eq!(Value::Object(out.data), json!({"id": 7}));
    }

    #[test]
    fn test_target_missing_or_scalar_yields_empty() {
        let f = formatter(|b| b.target = Some("data".to_string()));
        assert!(f.format(response(json!({"meta": 1}))).data.is_empty());
        assert!(f.format(response(json!({"data": 3}))).data.is_empty());
    }

    #[test]
    fn test_whitelist_deep_path() {
        let f = formatter(|b| b.whitelist = vec!["a.x".to_string()]);
        let out = f.format(response(json!({"a": {"x": 1, "y": 2}, "b": 3})));
        assert_eq!(Value::Object(out.data), json!({"a": {"x": 1}}));
    }

    #[test]
    fn test_whitelist_top_level_keeps_whole_value() {
        let f = formatter(|b| b.whitelist = vec!["a".to_string(), "c".to_string()]);
        let out = f.format(response(json!({"a": {"x": 1}, "b": 2, "c": 3})));
        assert_eq!(Value::Object(out.data), json!({"a": {"x": 1}, "c": 3}));
    }

    #[test]
    fn test_whitelist_soundness() {
        let f = formatter(|b| b.whitelist = vec!["a".to_string(), "b.x".to_string()]);
        let out = f.format(response(json!({"a": 1, "b": {"x": 2, "y": 3}, "c": 4})));
        for key in out.data.keys() {
            assert!(key == "a" || key == "b");
        }
    }

    #[test]
    fn test_whitelist_wins_over_blacklist() {
        let f = formatter(|b| {
            b.whitelist = vec!["a".to_string()];
            b.blacklist = vec!["a".to_string()];
        });
        let out = f.format(response(json!({"a": 1, "b": 2})));
        assert_eq!(Value::Object(out.data), json!({"a": 1}));
    }

    #[test]
    fn test_blacklist_removes_paths() {
        let f = formatter(|b| b.blacklist = vec!["b".to_string(), "a.y".to_string()]);
        let out = f.format(response(json!({"a": {"x": 1, "y": 2}, "b": 3, "c": 4})));
        assert_eq!(Value::Object(out.data), json!({"a": {"x": 1}, "c": 4}));
    }

    #[test]
    fn test_group_wraps_object() {
        let f = formatter(|b| b.group = Some("data".to_string()));
        let out = f.format(response(json!({"id": 7})));
        assert_eq!(Value::Object(out.data), json!({"data": {"id": 7}}));
    }

    #[test]
    fn test_group_then_mapping() {
        let f = formatter(|b| {
            b.group = Some("data".to_string());
            b.mapping = HashMap::from([("data".to_string(), "payload".to_string())]);
        });
        let out = f.format(response(json!({"id": 7})));
        assert_eq!(Value::Object(out.data), json!({"payload": {"id": 7}}));
    }

    #[test]
    fn test_incomplete_flag_is_preserved() {
        let f = formatter(|b| b.group = Some("data".to_string()));
        let mut input = response(json!({"id": 7}));
        input.is_complete = false;
        assert!(!f.format(input).is_complete);
    }
}
