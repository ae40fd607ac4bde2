use super::ProjectPlan;
use serde_json::Value;

/// Sentinel tags bracketing the JSON plan payload in assistant output.
/// Case-sensitive, matched verbatim.
pub const PLAN_OPEN_TAG: &str = "<project_plan>";
pub const PLAN_CLOSE_TAG: &str = "</project_plan>";

/// Three-way split of one assistant message, produced fresh on every render.
/// `before_text` carries the whole message when no valid plan block exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub before_text: String,
    pub plan: Option<ProjectPlan>,
    pub after_text: String,
}

impl ParsedMessage {
    fn plain(content: &str, plan: Option<ProjectPlan>) -> Self {
        Self {
            before_text: content.to_string(),
            plan,
            after_text: String::new(),
        }
    }
}

/// Split `content` around the first `<project_plan>`/`</project_plan>` pair
/// and validate the payload between them.
///
/// Fail-closed: malformed JSON or an invalid shape discards the split and
/// returns the whole original message (tags included) as `before_text`, so
/// the user always sees exactly what the model produced. The `side_channel`
/// value (the server's best-effort pre-parse) is consulted only when tag
/// scanning finds nothing at all.
///
/// Total function: every input resolves to a value, never an error. Pure and
/// idempotent, so it is safe to call on every UI re-render.
pub fn extract(content: &str, side_channel: Option<&Value>) -> ParsedMessage {
    let pair = match (content.find(PLAN_OPEN_TAG), content.find(PLAN_CLOSE_TAG)) {
        (Some(open), Some(close)) if close > open => Some((open, close)),
        _ => None,
    };

    let Some((open, close)) = pair else {
        let plan = side_channel.and_then(ProjectPlan::from_value);
        return ParsedMessage::plain(content, plan);
    };

    let payload = content[open + PLAN_OPEN_TAG.len()..close].trim();
    let decoded: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return ParsedMessage::plain(content, None),
    };

    match ProjectPlan::from_value(&decoded) {
        Some(plan) => ParsedMessage {
            before_text: content[..open].to_string(),
            plan: Some(plan),
            after_text: content[close + PLAN_CLOSE_TAG.len()..].to_string(),
        },
        None => ParsedMessage::plain(content, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VALID_PAYLOAD: &str = r#"{"workstreams":[{"title":"Build","description":"Core work","deliverables":[{"title":"MVP","description":"First cut"}]}]}"#;

    fn wrap(before: &str, payload: &str, after: &str) -> String {
        format!("{before}{PLAN_OPEN_TAG}{payload}{PLAN_CLOSE_TAG}{after}")
    }

    #[test]
    fn no_tags_identity() {
        let content = "just a normal reply, nothing structured";
        let parsed = extract(content, None);
        assert_eq!(parsed.before_text, content);
        assert_eq!(parsed.after_text, "");
        assert!(parsed.plan.is_none());
    }

    #[test]
    fn totality_on_degenerate_inputs() {
        for content in [
            "",
            "<project_plan>",
            "</project_plan>",
            "</project_plan>text<project_plan>",
            "<project_plan></project_plan>",
            "\u{0}\u{1}binary\u{ff}garbage",
        ] {
            let parsed = extract(content, None);
            assert!(parsed.plan.is_none());
            assert_eq!(parsed.before_text, content);
            assert_eq!(parsed.after_text, "");
        }
    }

    #[test]
    fn valid_round_trip() {
        let content = wrap("Here is the plan:\n", VALID_PAYLOAD, "\nLet me know.");
        let parsed = extract(&content, None);
        let plan = parsed.plan.expect("plan extracted");
        assert_eq!(parsed.before_text, "Here is the plan:\n");
        assert_eq!(parsed.after_text, "\nLet me know.");
        assert_eq!(plan.workstreams.len(), 1);
        assert_eq!(plan.workstreams[0].title, "Build");
        assert_eq!(plan.workstreams[0].deliverables[0].description, "First cut");
    }

    #[test]
    fn round_trip_zero_workstreams() {
        let content = wrap("", r#"{"workstreams":[]}"#, "");
        let parsed = extract(&content, None);
        let plan = parsed.plan.expect("plan extracted");
        assert!(plan.workstreams.is_empty());
        assert_eq!(parsed.before_text, "");
        assert_eq!(parsed.after_text, "");
    }

    #[test]
    fn payload_whitespace_is_tolerated() {
        let content = wrap("a", &format!("\n  {VALID_PAYLOAD}\n  "), "b");
        let parsed = extract(&content, None);
        assert!(parsed.plan.is_some());
        assert_eq!(parsed.before_text, "a");
        assert_eq!(parsed.after_text, "b");
    }

    #[test]
    fn fail_closed_on_bad_json() {
        let content = wrap("X", "{not json", "Y");
        let parsed = extract(&content, None);
        assert!(parsed.plan.is_none());
        // The whole original string, tags and all, never a partial split.
        assert_eq!(parsed.before_text, content);
        assert_eq!(parsed.after_text, "");
    }

    #[test]
    fn fail_closed_on_bad_shape() {
        let content = wrap("X", r#"{"workstreams":[{"title":"t"}]}"#, "Y");
        let parsed = extract(&content, None);
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.before_text, content);
    }

    #[test]
    fn fail_closed_on_trailing_junk_inside_tags() {
        let content = wrap("", &format!("{VALID_PAYLOAD} trailing prose"), "");
        let parsed = extract(&content, None);
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.before_text, content);
    }

    #[test]
    fn first_pair_wins_second_is_plain_text() {
        let second = wrap(" and again ", VALID_PAYLOAD, " done");
        let content = wrap("intro ", VALID_PAYLOAD, &second);
        let parsed = extract(&content, None);
        assert!(parsed.plan.is_some());
        assert_eq!(parsed.before_text, "intro ");
        // The second pair survives verbatim inside after_text.
        assert_eq!(parsed.after_text, second);
    }

    #[test]
    fn close_before_open_is_no_block() {
        let content = format!("{PLAN_CLOSE_TAG}{VALID_PAYLOAD}{PLAN_OPEN_TAG}");
        let parsed = extract(&content, None);
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.before_text, content);
    }

    #[test]
    fn side_channel_used_only_without_tags() {
        let side = json!({ "workstreams": [
            { "title": "From server", "description": "pre-parsed", "deliverables": [] }
        ]});

        // No tags: valid side channel is accepted, rendered after all text.
        let parsed = extract("plain prose", Some(&side));
        let plan = parsed.plan.expect("side channel accepted");
        assert_eq!(plan.workstreams[0].title, "From server");
        assert_eq!(parsed.before_text, "plain prose");
        assert_eq!(parsed.after_text, "");

        // Tags present: the re-parsed block wins, side channel is ignored.
        let content = wrap("", VALID_PAYLOAD, "");
        let parsed = extract(&content, Some(&side));
        assert_eq!(parsed.plan.expect("tag block wins").workstreams[0].title, "Build");
    }

    #[test]
    fn side_channel_not_consulted_when_tagged_payload_is_broken() {
        let side = json!({ "workstreams": [] });
        let content = wrap("X", "{broken", "Y");
        let parsed = extract(&content, Some(&side));
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.before_text, content);
    }

    #[test]
    fn invalid_side_channel_is_silently_ignored() {
        let side = json!({ "workstreams": [{ "title": "" }] });
        let parsed = extract("hello", Some(&side));
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.before_text, "hello");
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let content = wrap("a", VALID_PAYLOAD, "b");
        assert_eq!(extract(&content, None), extract(&content, None));
    }
}
