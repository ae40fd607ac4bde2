use super::{extract, ProjectPlan};
use serde_json::Value;

/// One contiguous renderable unit of an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Text(String),
    Plan(ProjectPlan),
}

/// Decompose a message into ordered renderable regions: leading text, the
/// plan panel, trailing text. Text regions that are empty after trimming are
/// suppressed entirely rather than emitted as empty containers.
pub fn message_regions(content: &str, side_channel: Option<&Value>) -> Vec<Region> {
    let parsed = extract(content, side_channel);
    let mut regions = Vec::with_capacity(3);
    if !parsed.before_text.trim().is_empty() {
        regions.push(Region::Text(parsed.before_text));
    }
    if let Some(plan) = parsed.plan {
        regions.push(Region::Plan(plan));
    }
    if !parsed.after_text.trim().is_empty() {
        regions.push(Region::Text(parsed.after_text));
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PLAN_CLOSE_TAG, PLAN_OPEN_TAG};
    use serde_json::json;

    const PAYLOAD: &str =
        r#"{"workstreams":[{"title":"W","description":"D","deliverables":[]}]}"#;

    #[test]
    fn plan_only_message_renders_exactly_one_region() {
        let content = format!("{PLAN_OPEN_TAG}{PAYLOAD}{PLAN_CLOSE_TAG}");
        let regions = message_regions(&content, None);
        assert_eq!(regions.len(), 1);
        assert!(matches!(regions[0], Region::Plan(_)));
    }

    #[test]
    fn whitespace_only_text_is_suppressed() {
        let content = format!("  \n {PLAN_OPEN_TAG}{PAYLOAD}{PLAN_CLOSE_TAG}\n\t");
        let regions = message_regions(&content, None);
        assert_eq!(regions.len(), 1);
        assert!(matches!(regions[0], Region::Plan(_)));
    }

    #[test]
    fn text_plan_text_in_order() {
        let content = format!("before{PLAN_OPEN_TAG}{PAYLOAD}{PLAN_CLOSE_TAG}after");
        let regions = message_regions(&content, None);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0], Region::Text("before".to_string()));
        assert!(matches!(regions[1], Region::Plan(_)));
        assert_eq!(regions[2], Region::Text("after".to_string()));
    }

    #[test]
    fn plain_message_is_one_text_region() {
        let regions = message_regions("hello there", None);
        assert_eq!(regions, vec![Region::Text("hello there".to_string())]);
    }

    #[test]
    fn side_channel_plan_lands_after_the_text() {
        let side = json!({ "workstreams": [] });
        let regions = message_regions("prose only", Some(&side));
        assert_eq!(regions.len(), 2);
        assert!(matches!(regions[0], Region::Text(_)));
        assert!(matches!(regions[1], Region::Plan(_)));
    }

    #[test]
    fn broken_block_falls_back_to_single_text_region() {
        let content = format!("X{PLAN_OPEN_TAG}{{oops{PLAN_CLOSE_TAG}Y");
        let regions = message_regions(&content, None);
        assert_eq!(regions, vec![Region::Text(content)]);
    }
}
