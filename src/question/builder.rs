use serde_json::Value;

use super::unit::QuestionUnit;

/// Accepted id field names, highest priority first
pub const ID_ALIASES: &[&str] = &["id", "questionUuid", "uuid"];

/// Accepted text field names, highest priority first
pub const TEXT_ALIASES: &[&str] = &["question", "title", "content"];

/// Accepted follow-up array field names, highest priority first
pub const FOLLOW_UP_ALIASES: &[&str] = &["followUps", "followUpQuestions"];

/// Flatten raw server questions into main → follow-up order.
///
/// Never fails: non-object entries and missing fields degrade to an empty
/// text and no id. Running it twice over the same input yields the same list.
pub fn build_units(raw: &[Value]) -> Vec<QuestionUnit> {
    raw.iter().flat_map(expand_one).collect()
}

fn expand_one(raw: &Value) -> Vec<QuestionUnit> {
    let id = first_id(raw);
    let mut units = vec![QuestionUnit::main(id.clone(), first_text(raw))];

    if let Some(follow_ups) = first_array(raw) {
        units.extend(follow_ups.iter().enumerate().map(|(idx, f)| {
            QuestionUnit::follow(first_id(f), first_text(f), id.clone(), idx + 1)
        }));
    }

    units
}

/// Ids may be strings or numbers on the wire; empty strings count as absent
fn first_id(raw: &Value) -> Option<String> {
    ID_ALIASES.iter().find_map(|key| match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_text(raw: &Value) -> String {
    TEXT_ALIASES
        .iter()
        .find_map(|key| raw.get(key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn first_array(raw: &Value) -> Option<&Vec<Value>> {
    FOLLOW_UP_ALIASES
        .iter()
        .find_map(|key| raw.get(key).and_then(Value::as_array))
}
