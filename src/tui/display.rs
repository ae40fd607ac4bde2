//! Display block types for the transcript area.
//!
//! Each block is one visual section: a user message, a run of assistant
//! prose, an inline plan panel, or a system note. Assistant messages are
//! split into regions so a plan panel can sit between prose runs.

use crate::plan::{self, ProjectPlan, Region};
use crate::store::StoredMessage;

#[derive(Debug, Clone)]
pub enum DisplayBlock {
    UserMessage {
        text: String,
        timestamp: u64,
    },
    AssistantText {
        text: String,
    },
    PlanPanel {
        /// Index of the owning message in the transcript; fold state is
        /// keyed by (message index, workstream index).
        message_index: usize,
        plan: ProjectPlan,
    },
    SystemNote {
        text: String,
    },
}

/// Build transcript blocks for one stored message. Re-parses the content on
/// every call: extraction is pure and cheap, and the message content is the
/// single source of truth.
pub fn blocks_for_message(index: usize, msg: &StoredMessage) -> Vec<DisplayBlock> {
    if msg.role != "assistant" {
        return vec![DisplayBlock::UserMessage {
            text: msg.content.clone(),
            timestamp: msg.created_at,
        }];
    }
    plan::message_regions(&msg.content, msg.project_plan.as_ref())
        .into_iter()
        .map(|region| match region {
            Region::Text(text) => DisplayBlock::AssistantText { text },
            Region::Plan(plan) => DisplayBlock::PlanPanel {
                message_index: index,
                plan,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PLAN_CLOSE_TAG, PLAN_OPEN_TAG};

    fn message(role: &str, content: &str) -> StoredMessage {
        StoredMessage {
            id: "m".into(),
            role: role.into(),
            content: content.into(),
            project_plan: None,
            created_at: 0,
        }
    }

    #[test]
    fn user_message_is_one_block() {
        let blocks = blocks_for_message(0, &message("user", "hi"));
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], DisplayBlock::UserMessage { .. }));
    }

    #[test]
    fn assistant_plan_message_splits_into_blocks() {
        let content = format!(
            "Sure.{PLAN_OPEN_TAG}{{\"workstreams\":[]}}{PLAN_CLOSE_TAG}Anything else?"
        );
        let blocks = blocks_for_message(3, &message("assistant", &content));
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], DisplayBlock::AssistantText { .. }));
        match &blocks[1] {
            DisplayBlock::PlanPanel { message_index, .. } => assert_eq!(*message_index, 3),
            other => panic!("expected plan panel, got {other:?}"),
        }
        assert!(matches!(blocks[2], DisplayBlock::AssistantText { .. }));
    }

    #[test]
    fn plan_only_assistant_message_is_one_panel() {
        let content = format!("{PLAN_OPEN_TAG}{{\"workstreams\":[]}}{PLAN_CLOSE_TAG}");
        let blocks = blocks_for_message(0, &message("assistant", &content));
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], DisplayBlock::PlanPanel { .. }));
    }
}
