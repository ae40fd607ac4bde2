//! Project-plan data model and structural validation.
//!
//! Assistant replies may embed a machine-readable project plan between
//! sentinel tags (see [`extract`]). The types here mirror that JSON payload,
//! and [`ProjectPlan::from_value`] is the single type-guard that both the
//! tag-scanning path and the side-channel fallback go through.

mod detect;
mod extract;
mod regions;

pub use detect::is_plan_request;
pub use extract::{extract, ParsedMessage, PLAN_CLOSE_TAG, PLAN_OPEN_TAG};
pub use regions::{message_regions, Region};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPlan {
    pub workstreams: Vec<Workstream>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workstream {
    pub title: String,
    pub description: String,
    pub deliverables: Vec<Deliverable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    pub title: String,
    pub description: String,
}

impl ProjectPlan {
    /// Structural type-guard over a decoded JSON value.
    ///
    /// All-or-nothing: a missing field, wrong type, or empty-after-trim
    /// string anywhere in the tree rejects the whole value. Accepted strings
    /// keep their original text; trimming is applied only for the check.
    pub fn from_value(value: &Value) -> Option<ProjectPlan> {
        let workstreams = value
            .as_object()?
            .get("workstreams")?
            .as_array()?
            .iter()
            .map(workstream_from_value)
            .collect::<Option<Vec<_>>>()?;
        Some(ProjectPlan { workstreams })
    }
}

fn workstream_from_value(value: &Value) -> Option<Workstream> {
    let obj = value.as_object()?;
    let deliverables = obj
        .get("deliverables")?
        .as_array()?
        .iter()
        .map(deliverable_from_value)
        .collect::<Option<Vec<_>>>()?;
    Some(Workstream {
        title: non_empty_string(obj.get("title")?)?,
        description: non_empty_string(obj.get("description")?)?,
        deliverables,
    })
}

fn deliverable_from_value(value: &Value) -> Option<Deliverable> {
    let obj = value.as_object()?;
    Some(Deliverable {
        title: non_empty_string(obj.get("title")?)?,
        description: non_empty_string(obj.get("description")?)?,
    })
}

fn non_empty_string(value: &Value) -> Option<String> {
    let s = value.as_str()?;
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
