//! Dotted-path helpers over the expansion document.

use crate::models::{Ambiance, StepCategory};
use serde_json::{Map, Value};

/// Path of the ambiance's current node inside the expansion document.
///
/// Levels flagged `skip_expression_chain` are left out, except strategy levels, which
/// stay addressable so iteration values can be resolved.
pub fn expansion_path(ambiance: &Ambiance) -> String {
    ambiance
        .levels
        .iter()
        .filter(|l| !l.skip_expression_chain || l.category() == StepCategory::Strategy)
        .map(|l| l.identifier.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

pub fn join(base: &str, suffix: &str) -> String {
    if base.is_empty() {
        suffix.to_string()
    } else {
        format!("{base}.{suffix}")
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Write `value` at `path`, creating intermediate objects and replacing scalars in the way
pub fn set_at_path(document: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *document = value;
        return;
    };

    let mut current = document;
    for part in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

pub fn get_at_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(document, |current, part| current.get(part))
}

/// Copy only the requested paths out of `document`, keeping their nesting. Paths that
/// do not exist are omitted.
pub fn project_paths(document: &Value, paths: &[String]) -> Value {
    let mut projected = Value::Object(Map::new());
    for path in paths {
        if let Some(value) = get_at_path(document, path) {
            set_at_path(&mut projected, path, value.clone());
        }
    }
    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Level, StepType};
    use serde_json::json;

    fn level(identifier: &str, category: StepCategory, skip: bool) -> Level {
        Level::new("", "", identifier, StepType::new("", category)).with_skip_expression_chain(skip)
    }

    #[test]
    fn test_expansion_path_keeps_strategy_levels() {
        let ambiance = Ambiance::default().with_levels(vec![
            level("pipeline", StepCategory::Pipeline, false),
            level("stages", StepCategory::Stages, true),
            level("stage1", StepCategory::Strategy, true),
            level("stage1_0", StepCategory::Stage, false),
            level("spec", StepCategory::Unknown, true),
            level("step1", StepCategory::Step, false),
        ]);
        assert_eq!(expansion_path(&ambiance), "pipeline.stage1.stage1_0.step1");
    }

    #[test]
    fn test_set_creates_and_overwrites() {
        let mut doc = json!({"pipeline": {"status": "RUNNING"}});
        set_at_path(&mut doc, "pipeline.stage1.outcome.out", json!({"a": 1}));
        set_at_path(&mut doc, "pipeline.status", json!("SUCCEEDED"));
        assert_eq!(
            doc,
            json!({"pipeline": {"status": "SUCCEEDED", "stage1": {"outcome": {"out": {"a": 1}}}}})
        );

        set_at_path(&mut doc, "pipeline.status.nested", json!(true));
        assert_eq!(doc["pipeline"]["status"], json!({"nested": true}));
    }

    #[test]
    fn test_project_keeps_nesting_and_skips_missing() {
        let doc = json!({
            "pipeline": {
                "stage1": {"status": "SUCCEEDED", "stepInputs": {"url": "x"}},
                "stage2": {"status": "FAILED"}
            }
        });
        let projected = project_paths(
            &doc,
            &["pipeline.stage1.status".into(), "pipeline.missing".into()],
        );
        assert_eq!(projected, json!({"pipeline": {"stage1": {"status": "SUCCEEDED"}}}));
    }
}
